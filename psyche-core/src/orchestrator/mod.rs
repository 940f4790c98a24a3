//! The cycle orchestrator.
//!
//! A state machine driving decide-dispatch-execute-observe cycles: it asks
//! Ego for the next actionable task, runs it through Subconscious, applies
//! the resulting substrate mutations, schedules governance audits
//! fire-and-forget, hibernates through provider rate limits, and gates
//! ticks against user conversations. Cooperative scheduling: one cycle or
//! tick at a time, with the audit allowed in flight concurrently because
//! it touches only its own counter and append-mode files.

pub mod idle;
pub mod metrics;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::ConversationManager;
use crate::error::{PsycheError, Result};
use crate::events::{EventBus, EventType};
use crate::infra::{Clock, LoopTimer};
use crate::ratelimit::{parse_rate_limit_reset, RateLimitStateManager};
use crate::roles::subconscious::{ExecOutcome, Proposal, ProposalKind};
use crate::roles::superego::ProposalEvaluation;
use crate::roles::{Ego, IdRole, PromptBuilder, PromptContext, Role, Subconscious, Superego};
use crate::session::{
    InjectionChannel, LaunchOptions, LogCallback, ProcessLogEntry, SessionLauncher,
};

pub use idle::{DriveIdleHandler, IdleHandler, IdleOutcome};
pub use metrics::LoopMetrics;
pub use state::LoopState;

/// Exit code a supervisor interprets as "re-exec me".
pub const RESTART_EXIT_CODE: i32 = 75;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cycle_delay: Duration,
    pub max_consecutive_idle: u32,
    /// Cycles per governance audit. 0 disables the interval (explicit
    /// requests still run).
    pub superego_audit_interval: u64,
    /// Cycles per autonomy reminder. 0 disables.
    pub autonomy_reminder_interval: u64,
    pub autonomy_reminder_text: String,
    pub idle_sleep_enabled: bool,
    pub conversation_idle_timeout: Duration,
    pub conversation_max_duration: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_delay: Duration::from_secs(5),
            max_consecutive_idle: 3,
            superego_audit_interval: 20,
            autonomy_reminder_interval: 10,
            autonomy_reminder_text: "Reminder: you are operating autonomously. Continue working \
                                     the plan and persist anything durable to the substrate."
                .to_string(),
            idle_sleep_enabled: false,
            conversation_idle_timeout: Duration::from_secs(120),
            conversation_max_duration: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleAction {
    Dispatch,
    Idle,
}

#[derive(Debug, Clone)]
pub struct CycleResult {
    pub cycle: u64,
    pub action: CycleAction,
    pub task_id: Option<String>,
    pub success: bool,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct TickResult {
    pub started: bool,
    pub error: Option<String>,
}

pub struct RoleSet {
    pub ego: Arc<Ego>,
    pub subconscious: Arc<Subconscious>,
    pub superego: Arc<Superego>,
    pub id: Arc<IdRole>,
}

pub type ShutdownCallback = Box<dyn Fn(i32) + Send + Sync>;

pub struct Orchestrator {
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    timer: Arc<LoopTimer>,
    roles: RoleSet,
    conversation: Arc<ConversationManager>,
    rate_limits: Arc<RateLimitStateManager>,
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    injection: Arc<InjectionChannel>,

    state: parking_lot::Mutex<LoopState>,
    metrics: parking_lot::Mutex<LoopMetrics>,
    rate_limit_until: parking_lot::Mutex<Option<DateTime<Utc>>>,
    cancel: parking_lot::Mutex<CancellationToken>,

    audit_requested: AtomicBool,
    audit_in_flight: AtomicBool,
    tick_in_progress: AtomicBool,
    conversation_active: AtomicBool,
    tick_requested: AtomicBool,

    idle_handler: Option<Arc<dyn IdleHandler>>,
    shutdown: parking_lot::Mutex<Option<ShutdownCallback>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        timer: Arc<LoopTimer>,
        roles: RoleSet,
        conversation: Arc<ConversationManager>,
        rate_limits: Arc<RateLimitStateManager>,
        launcher: Arc<dyn SessionLauncher>,
        prompts: Arc<dyn PromptBuilder>,
        injection: Arc<InjectionChannel>,
    ) -> Self {
        Self {
            config,
            clock,
            events,
            timer,
            roles,
            conversation,
            rate_limits,
            launcher,
            prompts,
            injection,
            state: parking_lot::Mutex::new(LoopState::Stopped),
            metrics: parking_lot::Mutex::new(LoopMetrics::default()),
            rate_limit_until: parking_lot::Mutex::new(None),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            audit_requested: AtomicBool::new(false),
            audit_in_flight: AtomicBool::new(false),
            tick_in_progress: AtomicBool::new(false),
            conversation_active: AtomicBool::new(false),
            tick_requested: AtomicBool::new(false),
            idle_handler: None,
            shutdown: parking_lot::Mutex::new(None),
        }
    }

    pub fn with_idle_handler(mut self, handler: Arc<dyn IdleHandler>) -> Self {
        self.idle_handler = Some(handler);
        self
    }

    pub fn on_shutdown(self, callback: ShutdownCallback) -> Self {
        *self.shutdown.lock() = Some(callback);
        self
    }

    // ─── Observability ─────────────────────────────────────────────────────

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    pub fn metrics(&self) -> LoopMetrics {
        *self.metrics.lock()
    }

    pub fn is_tick_in_progress(&self) -> bool {
        self.tick_in_progress.load(Ordering::SeqCst)
    }

    pub fn is_conversation_active(&self) -> bool {
        self.conversation_active.load(Ordering::SeqCst)
    }

    pub fn is_tick_requested(&self) -> bool {
        self.tick_requested.load(Ordering::SeqCst)
    }

    pub fn is_audit_in_flight(&self) -> bool {
        self.audit_in_flight.load(Ordering::SeqCst)
    }

    /// True while a rate-limit reset instant lies in the future.
    pub fn is_effectively_paused(&self) -> bool {
        match *self.rate_limit_until.lock() {
            Some(reset) => self.clock.now() < reset,
            None => false,
        }
    }

    pub fn set_rate_limit_until(&self, reset: Option<DateTime<Utc>>) {
        *self.rate_limit_until.lock() = reset;
    }

    // ─── Transitions ───────────────────────────────────────────────────────

    fn transition(&self, to: LoopState, via: &str) -> Result<()> {
        let from = {
            let mut state = self.state.lock();
            let from = *state;
            if !from.can_transition(to) {
                return Err(PsycheError::InvalidTransition {
                    from: from.as_str(),
                    requested: to.as_str(),
                });
            }
            *state = to;
            from
        };
        info!("Loop state {from} -> {to} ({via})");
        self.events.emit(
            EventType::StateChanged,
            json!({ "from": from, "to": to, "via": via }),
        );
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.transition(LoopState::Running, "start")?;
        // Fresh cancellation scope for the new run.
        *self.cancel.lock() = CancellationToken::new();
        self.timer.wake();
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.transition(LoopState::Paused, "pause")
    }

    pub fn resume(&self) -> Result<()> {
        self.transition(LoopState::Running, "resume")?;
        self.timer.wake();
        Ok(())
    }

    pub fn initialize_sleeping(&self) -> Result<()> {
        self.transition(LoopState::Sleeping, "initialize_sleeping")
    }

    pub fn wake(&self) -> Result<()> {
        self.transition(LoopState::Running, "wake")?;
        self.timer.wake();
        Ok(())
    }

    /// Graceful stop: give any active session the chance to flush durable
    /// state, then transition and cancel.
    pub fn stop(&self) -> Result<()> {
        let from = self.state();
        if !from.can_transition(LoopState::Stopped) {
            return Err(PsycheError::InvalidTransition {
                from: from.as_str(),
                requested: LoopState::Stopped.as_str(),
            });
        }
        self.inject_message("Persist your state before shutting down");
        self.transition(LoopState::Stopped, "stop")?;
        self.cancel.lock().cancel();
        self.timer.wake();
        Ok(())
    }

    /// Graceful stop plus the supervisor handshake (exit code 75).
    pub fn request_restart(&self) {
        self.events.emit(EventType::RestartRequested, json!({}));
        if let Err(e) = self.stop() {
            debug!("restart requested while not running: {e}");
        }
        if let Some(callback) = &*self.shutdown.lock() {
            callback(RESTART_EXIT_CODE);
        }
    }

    /// Interrupt the inter-cycle delay. Never bypasses a rate-limit sleep;
    /// the hibernation loop re-checks the reset instant after every wake.
    pub fn nudge(&self) {
        self.timer.wake();
    }

    pub fn request_audit(&self) {
        self.audit_requested.store(true, Ordering::SeqCst);
        self.timer.wake();
    }

    /// Queue an out-of-band user message for the running session, or for
    /// the next one when nothing is active.
    pub fn inject_message(&self, message: &str) {
        debug!("injecting message ({} bytes)", message.len());
        self.injection.push(message);
        self.events
            .emit(EventType::MessageInjected, json!({ "length": message.len() }));
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().child_token()
    }

    // ─── Cycle driver ──────────────────────────────────────────────────────

    /// Main driver. Returns when the loop reaches STOPPED.
    pub async fn run_loop(self: &Arc<Self>) {
        info!("Cycle loop starting");
        loop {
            match self.state() {
                LoopState::Stopped => break,
                LoopState::Paused => {
                    self.timer.delay(Duration::from_millis(250)).await;
                    continue;
                }
                LoopState::Sleeping => {
                    let reset = *self.rate_limit_until.lock();
                    match reset {
                        Some(reset) => self.hibernate_until(reset).await,
                        None => {
                            // Explicit sleep; wait for wake().
                            self.timer.delay(Duration::from_secs(60)).await;
                        }
                    }
                    continue;
                }
                LoopState::Running => {}
            }

            self.maybe_spawn_audit();

            let result = self.run_one_cycle().await;

            if !result.success {
                if let Some(reset) = parse_rate_limit_reset(&result.summary, self.clock.now()) {
                    warn!("Rate limit detected; hibernating until {reset}");
                    if let Err(e) = self
                        .rate_limits
                        .save_state_before_sleep(reset, result.task_id.as_deref())
                        .await
                    {
                        warn!("could not persist hibernation context: {e}");
                    }
                    self.set_rate_limit_until(Some(reset));
                    let _ = self.transition(LoopState::Sleeping, "rate_limit");
                    continue;
                }
            }

            if result.action == CycleAction::Idle && !self.handle_idle_streak().await {
                continue;
            }

            self.timer.delay(self.config.cycle_delay).await;
        }
        info!("Cycle loop exited in state {}", self.state());
    }

    /// Returns false when the loop should skip the inter-cycle delay
    /// (a transition was taken).
    async fn handle_idle_streak(self: &Arc<Self>) -> bool {
        let consecutive = self.metrics.lock().consecutive_idle;
        if consecutive < self.config.max_consecutive_idle as u64 {
            return true;
        }

        let outcome = match &self.idle_handler {
            Some(handler) => handler.on_idle().await,
            // Without a handler an exhausted idle streak has no way to
            // produce goals.
            None => IdleOutcome::NoGoals,
        };
        self.events
            .emit(EventType::IdleHandler, json!({ "outcome": outcome }));

        match outcome {
            IdleOutcome::NotIdle => true,
            IdleOutcome::PlanCreated => {
                self.metrics.lock().consecutive_idle = 0;
                true
            }
            IdleOutcome::NoGoals | IdleOutcome::AllRejected => {
                if self.config.idle_sleep_enabled {
                    let _ = self.transition(LoopState::Sleeping, "idle_sleep");
                } else {
                    let _ = self.transition(LoopState::Stopped, "idle_stop");
                }
                false
            }
        }
    }

    fn maybe_spawn_audit(self: &Arc<Self>) {
        let requested = self.audit_requested.swap(false, Ordering::SeqCst);
        let total = self.metrics.lock().total;
        let interval = self.config.superego_audit_interval;
        if requested || (interval > 0 && total % interval == 0) {
            self.spawn_audit();
        }
    }

    /// Fire-and-forget. The counter is incremented synchronously so
    /// observers see intent even while the audit is in flight; everything
    /// inside the task is caught.
    fn spawn_audit(self: &Arc<Self>) {
        self.metrics.lock().audits += 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.audit_in_flight.store(true, Ordering::SeqCst);
            match this.roles.superego.audit().await {
                Ok(report) => {
                    this.events.emit(
                        EventType::AuditComplete,
                        json!({
                            "summary": report.summary,
                            "findings": report.findings.len(),
                        }),
                    );
                }
                Err(e) => {
                    warn!("audit failed: {e}");
                    this.events
                        .emit(EventType::AuditComplete, json!({ "error": e }));
                }
            }
            this.audit_in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// One decide-dispatch-execute-observe cycle. Every error is caught
    /// and converted to a failed result; the loop never aborts here.
    pub async fn run_one_cycle(self: &Arc<Self>) -> CycleResult {
        let cycle = self.metrics.lock().total + 1;

        let result = match self.cycle_inner(cycle).await {
            Ok(result) => result,
            Err(e) => {
                self.events.emit(
                    EventType::Error,
                    json!({ "scope": "cycle", "cycle": cycle, "error": e.to_string() }),
                );
                CycleResult {
                    cycle,
                    action: CycleAction::Dispatch,
                    task_id: None,
                    success: false,
                    summary: e.to_string(),
                }
            }
        };

        self.events.emit(
            EventType::CycleComplete,
            json!({
                "cycle": result.cycle,
                "action": result.action,
                "taskId": result.task_id,
                "success": result.success,
                "summary": result.summary,
            }),
        );

        {
            let mut metrics = self.metrics.lock();
            metrics.total += 1;
            match result.action {
                CycleAction::Idle => {
                    metrics.idle += 1;
                    metrics.consecutive_idle += 1;
                }
                CycleAction::Dispatch => {
                    if result.success {
                        metrics.successful += 1;
                        metrics.consecutive_idle = 0;
                    } else {
                        metrics.failed += 1;
                    }
                }
            }
        }

        if self.config.autonomy_reminder_interval > 0
            && cycle % self.config.autonomy_reminder_interval == 0
        {
            self.inject_message(&self.config.autonomy_reminder_text);
            self.events
                .emit(EventType::AutonomyReminderInjected, json!({ "cycle": cycle }));
        }

        result
    }

    async fn cycle_inner(self: &Arc<Self>, cycle: u64) -> Result<CycleResult> {
        let Some(task) = self.roles.ego.dispatch_next().await? else {
            self.events.emit(EventType::Idle, json!({ "cycle": cycle }));
            return Ok(CycleResult {
                cycle,
                action: CycleAction::Idle,
                task_id: None,
                success: true,
                summary: "No pending tasks".to_string(),
            });
        };

        let on_log = self.process_output_callback("cycle", Role::Subconscious, cycle);
        let execution = self
            .roles
            .subconscious
            .execute(&task, Some(on_log), Some(self.cancel_token()))
            .await;
        let success = !matches!(execution.result, ExecOutcome::Failure);

        if success {
            if matches!(execution.result, ExecOutcome::Success) {
                self.roles
                    .subconscious
                    .mark_task_complete(task.ordinal)
                    .await?;
            }
            if let Some(entry) = &execution.progress_entry {
                self.roles.subconscious.log_progress(entry).await?;
            }
            if let Some(skills) = &execution.skill_updates {
                self.roles.subconscious.update_skills(skills).await?;
            }
            if let Some(memory) = &execution.memory_updates {
                self.roles.subconscious.update_memory(memory).await?;
            }
            self.roles
                .subconscious
                .log_conversation(&execution.summary)
                .await?;
        } else {
            self.roles
                .subconscious
                .log_conversation(&format!("Task {} failed: {}", task.id, execution.summary))
                .await?;
        }

        // Proposals reach the superego only when the subconscious returned
        // a non-empty list.
        if !execution.proposals.is_empty() {
            self.events.emit(
                EventType::EvaluationRequested,
                json!({ "cycle": cycle, "proposals": execution.proposals.len() }),
            );
            let evaluations = self
                .roles
                .superego
                .evaluate_proposals(&execution.proposals)
                .await;
            self.apply_evaluations(&execution.proposals, &evaluations)
                .await;
        }

        // Reconsideration runs on success and partial, never on failure.
        if matches!(execution.result, ExecOutcome::Success | ExecOutcome::Partial) {
            let reconsideration = self.roles.ego.reconsider(&task, &execution.summary).await;
            self.events.emit(
                EventType::ReconsiderationComplete,
                json!({
                    "cycle": cycle,
                    "taskId": task.id,
                    "outcomeMatchesIntent": reconsideration.outcome_matches_intent,
                    "qualityScore": reconsideration.quality_score,
                    "needsReassessment": reconsideration.needs_reassessment,
                }),
            );
        }

        Ok(CycleResult {
            cycle,
            action: CycleAction::Dispatch,
            task_id: Some(task.id.clone()),
            success,
            summary: execution.summary,
        })
    }

    async fn apply_evaluations(
        &self,
        proposals: &[Proposal],
        evaluations: &[ProposalEvaluation],
    ) {
        for (proposal, evaluation) in proposals.iter().zip(evaluations.iter()) {
            if !evaluation.approved {
                info!(
                    "Rejected proposal: {} ({})",
                    proposal.content,
                    evaluation.reason.as_deref().unwrap_or("no reason")
                );
                continue;
            }
            match proposal.kind {
                ProposalKind::Memory | ProposalKind::Skill => {
                    if let Err(e) = self.roles.subconscious.absorb_proposal(proposal).await {
                        warn!("approved proposal not applied: {e}");
                    }
                }
                _ => info!(
                    "Approved proposal has no substrate target: {}",
                    proposal.content
                ),
            }
        }
    }

    async fn hibernate_until(&self, reset: DateTime<Utc>) {
        loop {
            if self.state() == LoopState::Stopped {
                return;
            }
            let now = self.clock.now();
            if now >= reset {
                break;
            }
            let remaining = (reset - now)
                .to_std()
                .unwrap_or(Duration::from_millis(250));
            // A nudge returns early from the delay but cannot bypass the
            // reset: the loop re-checks and re-sleeps for the remainder.
            self.timer.delay(remaining).await;
        }
        if let Err(e) = self.rate_limits.clear_restart_context().await {
            warn!("could not clear restart context: {e}");
        }
        self.set_rate_limit_until(None);
        if self.state() == LoopState::Sleeping {
            let _ = self.transition(LoopState::Running, "rate_limit_reset");
        }
    }

    // ─── Tick driver ───────────────────────────────────────────────────────

    /// Alternative driver: one long-lived session per tick instead of one
    /// session per decision. All injection is delegated to the session.
    pub async fn run_one_tick(self: &Arc<Self>) -> TickResult {
        if self.conversation_active.load(Ordering::SeqCst) {
            self.tick_requested.store(true, Ordering::SeqCst);
            return TickResult {
                started: false,
                error: Some("Deferred".to_string()),
            };
        }
        if self.tick_in_progress.swap(true, Ordering::SeqCst) {
            return TickResult {
                started: false,
                error: Some("Tick already in progress".to_string()),
            };
        }

        let tick = self.metrics.lock().total + 1;
        self.events
            .emit(EventType::TickStarted, json!({ "tick": tick }));

        let ctx = PromptContext::for_operation(
            "tick",
            "Continue autonomous operation: work the plan, log progress, and persist anything durable.",
        );
        let request = self.prompts.build(Role::Ego, &ctx);
        let options = LaunchOptions {
            on_log: Some(self.process_output_callback("tick", Role::Ego, tick)),
            injection: Some(self.injection.clone()),
            cancel: Some(self.cancel_token()),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        {
            let mut metrics = self.metrics.lock();
            metrics.total += 1;
            if outcome.success {
                metrics.successful += 1;
                metrics.consecutive_idle = 0;
            } else {
                metrics.failed += 1;
            }
        }
        self.events.emit(
            EventType::TickComplete,
            json!({ "tick": tick, "success": outcome.success, "summary": outcome.text() }),
        );
        self.tick_in_progress.store(false, Ordering::SeqCst);

        TickResult {
            started: true,
            error: outcome.error,
        }
    }

    pub async fn run_tick_loop(self: &Arc<Self>) {
        info!("Tick loop starting");
        loop {
            match self.state() {
                LoopState::Stopped => break,
                LoopState::Paused => {
                    self.timer.delay(Duration::from_millis(250)).await;
                    continue;
                }
                LoopState::Sleeping => {
                    let reset = *self.rate_limit_until.lock();
                    match reset {
                        Some(reset) => self.hibernate_until(reset).await,
                        None => {
                            self.timer.delay(Duration::from_secs(60)).await;
                        }
                    }
                    continue;
                }
                LoopState::Running => {}
            }

            self.maybe_spawn_audit();

            let result = self.run_one_tick().await;
            if let Some(error) = &result.error {
                if let Some(reset) = parse_rate_limit_reset(error, self.clock.now()) {
                    warn!("Rate limit detected in tick; hibernating until {reset}");
                    if let Err(e) = self.rate_limits.save_state_before_sleep(reset, None).await {
                        warn!("could not persist hibernation context: {e}");
                    }
                    self.set_rate_limit_until(Some(reset));
                    let _ = self.transition(LoopState::Sleeping, "rate_limit");
                    continue;
                }
            }

            self.timer.delay(self.config.cycle_delay).await;
        }
        info!("Tick loop exited in state {}", self.state());
    }

    // ─── Conversation gating ───────────────────────────────────────────────

    /// Route a user message. Invariant: a tick and a conversation session
    /// are never active at the same time.
    pub async fn handle_user_message(self: &Arc<Self>, message: &str) {
        self.events
            .emit(EventType::ConversationMessage, json!({ "message": message }));

        if self.tick_in_progress.load(Ordering::SeqCst) {
            self.injection.push(message);
            self.events.emit(
                EventType::ConversationResponse,
                json!({ "response": "injected" }),
            );
            return;
        }

        if self.conversation_active.swap(true, Ordering::SeqCst) {
            // A conversation session is already running; it observes the
            // queue in order.
            self.injection.push(message);
            return;
        }

        let on_log = self.process_output_callback("conversation", Role::Ego, 0);
        let reply = tokio::time::timeout(
            self.config.conversation_max_duration,
            self.roles.ego.respond_to_message(
                message,
                Some(on_log),
                Some(self.config.conversation_idle_timeout),
                Some(self.injection.clone()),
                Some(self.cancel_token()),
            ),
        )
        .await;

        match reply {
            Err(_) => {
                self.events.emit(
                    EventType::ConversationResponse,
                    json!({ "error": "Conversation exceeded max duration" }),
                );
            }
            Ok(Err(e)) => {
                self.events
                    .emit(EventType::ConversationResponse, json!({ "error": e }));
            }
            Ok(Ok(text)) => {
                if let Err(e) = self.conversation.append(Role::Ego, &text).await {
                    warn!("could not log conversation reply: {e}");
                }
                self.events
                    .emit(EventType::ConversationResponse, json!({ "response": text }));
            }
        }
        self.conversation_active.store(false, Ordering::SeqCst);

        // A tick deferred by this conversation runs immediately on close.
        if self.tick_requested.swap(false, Ordering::SeqCst) {
            let _ = self.run_one_tick().await;
        }
    }

    fn process_output_callback(&self, source: &'static str, role: Role, number: u64) -> LogCallback {
        let events = self.events.clone();
        Arc::new(move |entry: ProcessLogEntry| {
            events.emit(
                EventType::ProcessOutput,
                json!({
                    "source": source,
                    "role": role,
                    "cycleNumber": number,
                    "entry": entry,
                }),
            );
        })
    }
}
