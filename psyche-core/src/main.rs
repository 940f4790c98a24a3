//! Psyche Server - the autonomous agent runtime daemon.
//!
//! Wires the substrate I/O stack, the role shims, the orchestrator, the
//! supporting schedulers, and the HTTP/WebSocket edge, then supervises the
//! chosen driver loop until shutdown.
//!
//! Usage: psyche-server [config.json]
//!
//! Exit codes: 0 clean shutdown, 75 restart requested (supervisor
//! re-exec), 1 fatal initialization error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use psyche_core::config::{DriverMode, PsycheConfig};
use psyche_core::conversation::{
    ArchivePolicy, ConversationArchiver, ConversationCompactor, ConversationManager,
};
use psyche_core::events::EventBus;
use psyche_core::infra::{Clock, FileLockRegistry, FileSystem, LoopTimer, SystemClock, TokioFs};
use psyche_core::orchestrator::{
    DriveIdleHandler, LoopState, Orchestrator, OrchestratorConfig, RoleSet,
};
use psyche_core::ratelimit::RateLimitStateManager;
use psyche_core::reports::ReportStore;
use psyche_core::roles::{
    Ego, IdRole, PromptBuilder, StaticPromptBuilder, Subconscious, Superego, TaskClassifier,
};
use psyche_core::schedulers::{
    spawn_scheduler_ticks, BackupScheduler, EmailScheduler, HealthMonitor, LogEmailTransport,
    MaintenanceScheduler,
};
use psyche_core::server::{self, ApiContext};
use psyche_core::session::{
    InjectionChannel, ProcessLauncher, ProcessLauncherConfig, ProcessTracker, SessionLauncher,
};
use psyche_core::substrate::{
    self, SubstrateAppender, SubstrateLayout, SubstrateReader, SubstrateWriter,
};

const DEFAULT_LAUNCHER_COMMAND: &str = "psyche-agent";

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match PsycheConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Could not load configuration: {e}");
            return 1;
        }
    };

    info!("🧠 Psyche server starting");
    info!("   Substrate: {}", config.substrate_root().display());
    info!("   Mode: {:?}, port {}", config.mode, config.port);

    // ── Infrastructure ────────────────────────────────────────────────────
    let fs: Arc<dyn FileSystem> = Arc::new(TokioFs::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let layout = SubstrateLayout::new(config.substrate_root());

    let first_run = match substrate::bootstrap(fs.as_ref(), &layout).await {
        Ok(first_run) => first_run,
        Err(e) => {
            error!("❌ Could not prepare the substrate: {e}");
            return 1;
        }
    };
    if first_run {
        info!("   First run: substrate seeded");
    }

    let events = Arc::new(EventBus::new(clock.clone()));
    let locks = Arc::new(FileLockRegistry::new());
    let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
    let writer = Arc::new(
        SubstrateWriter::new(fs.clone(), layout.clone(), locks.clone(), reader.clone())
            .with_events(events.clone()),
    );
    let appender = Arc::new(
        SubstrateAppender::new(
            fs.clone(),
            layout.clone(),
            locks.clone(),
            reader.clone(),
            clock.clone(),
        )
        .with_events(events.clone()),
    );

    // ── Sessions & roles ──────────────────────────────────────────────────
    let tracker = Arc::new(ProcessTracker::new());
    let mut launcher_config = ProcessLauncherConfig::new(
        config
            .launcher_command
            .clone()
            .unwrap_or_else(|| DEFAULT_LAUNCHER_COMMAND.to_string()),
    );
    launcher_config.args = config.launcher_args.clone();
    launcher_config.default_model = config.model.clone();
    let launcher: Arc<dyn SessionLauncher> =
        Arc::new(ProcessLauncher::new(launcher_config, tracker.clone()));

    let prompts: Arc<dyn PromptBuilder> = Arc::new(StaticPromptBuilder);
    let classifier = TaskClassifier::new(
        config.strategic_model.clone().or_else(|| config.model.clone()),
        config.tactical_model.clone().or_else(|| config.model.clone()),
    );

    let compactor = ConversationCompactor::new(
        launcher.clone(),
        prompts.clone(),
        config.tactical_model.clone().or_else(|| config.model.clone()),
    );
    let archiver = ConversationArchiver::new(
        fs.clone(),
        layout.clone(),
        ArchivePolicy {
            enabled: config.conversation_archive.enabled,
            lines_to_keep: config.conversation_archive.lines_to_keep,
            size_threshold: config.conversation_archive.size_threshold,
            time_threshold: chrono::Duration::days(config.conversation_archive.time_threshold_days),
        },
    );
    let conversation = Arc::new(ConversationManager::new(
        fs.clone(),
        layout.clone(),
        locks.clone(),
        reader.clone(),
        appender.clone(),
        clock.clone(),
        compactor,
        Some(archiver),
    ));

    let reports = Arc::new(ReportStore::new(fs.clone(), layout.clone(), clock.clone()));
    let ego = Arc::new(Ego::new(
        launcher.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
    ));
    let subconscious = Arc::new(Subconscious::new(
        launcher.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
        writer.clone(),
        appender.clone(),
        conversation.clone(),
    ));
    let superego = Arc::new(Superego::new(
        launcher.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
        reports.clone(),
    ));
    let id = Arc::new(IdRole::new(
        launcher.clone(),
        prompts.clone(),
        classifier,
        reader.clone(),
    ));

    let rate_limits = Arc::new(RateLimitStateManager::new(
        reader.clone(),
        writer.clone(),
        appender.clone(),
        clock.clone(),
    ));

    // ── Orchestrator ──────────────────────────────────────────────────────
    let (exit_tx, mut exit_rx) = tokio::sync::mpsc::unbounded_channel::<i32>();
    let restart_tx = exit_tx.clone();

    let orchestrator_config = OrchestratorConfig {
        superego_audit_interval: config.superego_audit_interval,
        autonomy_reminder_interval: config.autonomy_reminder_interval,
        ..Default::default()
    };
    let idle_handler = Arc::new(DriveIdleHandler::new(
        id.clone(),
        superego.clone(),
        writer.clone(),
        clock.clone(),
    ));
    let injection = Arc::new(InjectionChannel::new());
    let timer = Arc::new(LoopTimer::new());
    let orchestrator = Arc::new(
        Orchestrator::new(
            orchestrator_config,
            clock.clone(),
            events.clone(),
            timer,
            RoleSet {
                ego,
                subconscious,
                superego,
                id,
            },
            conversation,
            rate_limits.clone(),
            launcher,
            prompts,
            injection,
        )
        .with_idle_handler(idle_handler)
        .on_shutdown(Box::new(move |code| {
            let _ = restart_tx.send(code);
        })),
    );

    // ── Schedulers ────────────────────────────────────────────────────────
    let health = Arc::new(HealthMonitor::new(
        fs.clone(),
        layout.clone(),
        orchestrator.clone(),
        events.clone(),
    ));
    let mut schedulers: Vec<Arc<dyn MaintenanceScheduler>> = vec![
        Arc::new(BackupScheduler::new(
            fs.clone(),
            layout.clone(),
            config.backup_root(),
            config.backup_retention_count,
            chrono::Duration::hours(24),
            events.clone(),
        )),
        health.clone(),
    ];
    if config.email.enabled {
        schedulers.push(Arc::new(EmailScheduler::new(
            fs.clone(),
            layout.clone(),
            Arc::new(LogEmailTransport),
            config
                .email
                .recipient
                .clone()
                .unwrap_or_else(|| "operator@localhost".to_string()),
            chrono::Duration::hours(config.email.interval_hours as i64),
            events.clone(),
        )));
    }
    let _scheduler_handle =
        spawn_scheduler_ticks(schedulers, clock.clone(), Duration::from_secs(60));

    // ── Startup recovery ──────────────────────────────────────────────────
    match rate_limits.pending_hibernation().await {
        Ok(Some(reset)) if reset <= clock.now() => {
            info!("Stale hibernation context (reset {reset} has passed), clearing");
            if let Err(e) = rate_limits.clear_restart_context().await {
                warn!("could not clear restart context: {e}");
            }
        }
        Ok(Some(reset)) => {
            info!("Resuming hibernation until {reset}");
            orchestrator.set_rate_limit_until(Some(reset));
            if let Err(e) = orchestrator.initialize_sleeping() {
                warn!("could not enter hibernation: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => warn!("could not inspect restart context: {e}"),
    }

    if orchestrator.state() == LoopState::Stopped {
        let autostart = if first_run {
            config.auto_start_on_first_run
        } else {
            config.auto_start_after_restart
        };
        if autostart {
            if let Err(e) = orchestrator.start() {
                warn!("autostart failed: {e}");
            }
        }
    }

    // ── Driver supervision ────────────────────────────────────────────────
    // The driver returns when the loop stops; the supervisor re-enters it
    // once a later start() transition lands.
    let driver = orchestrator.clone();
    let mode = config.mode;
    tokio::spawn(async move {
        loop {
            if driver.state() == LoopState::Stopped {
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }
            match mode {
                DriverMode::Cycle => driver.run_loop().await,
                DriverMode::Tick => driver.run_tick_loop().await,
            }
        }
    });

    // ── HTTP edge ─────────────────────────────────────────────────────────
    let ctx = Arc::new(ApiContext {
        orchestrator: orchestrator.clone(),
        reader,
        reports,
        health,
        events,
        clock,
        auth_token: config.api_token.clone(),
    });
    let http_exit = exit_tx.clone();
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(server::router(ctx), port).await {
            error!("❌ HTTP edge failed: {e}");
            let _ = http_exit.send(1);
        }
    });

    info!("✅ Psyche server ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            let _ = orchestrator.stop();
            0
        }
        code = exit_rx.recv() => code.unwrap_or(0),
    }
}
