//! Psyche - an autonomous agent runtime over a Markdown substrate.
//!
//! Design principles:
//! - The substrate (PLAN, MEMORY, SKILLS, ...) is the only durable state;
//!   every mutation goes through mode-checked, lock-serialized writers
//! - LLM sessions are launched per cycle and never outlive the call;
//!   the launcher contract is the only provider seam
//! - The orchestrator is single-threaded cooperative: one cycle or tick
//!   at a time, audits fire-and-forget
//! - Everything observable flows through one event bus and out the
//!   WebSocket edge

pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod infra;
pub mod orchestrator;
pub mod ratelimit;
pub mod reports;
pub mod roles;
pub mod schedulers;
pub mod server;
pub mod session;
pub mod substrate;

pub use config::{DriverMode, PsycheConfig};
pub use error::{PsycheError, Result};
pub use events::{EventBus, EventType, RuntimeEvent};
pub use orchestrator::{
    CycleAction, CycleResult, LoopMetrics, LoopState, Orchestrator, OrchestratorConfig, RoleSet,
};
pub use session::{ScriptedLauncher, SessionLauncher};
pub use substrate::{SubstrateFile, SubstrateLayout};
