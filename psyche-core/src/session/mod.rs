//! LLM session layer: launcher contract, typed message stream, in-flight
//! message injection, and process tracking.

pub mod injection;
pub mod launcher;
pub mod scripted;
pub mod tracker;
pub mod types;

pub use injection::InjectionChannel;
pub use launcher::{
    LaunchOptions, LogCallback, ProcessLauncher, ProcessLauncherConfig, SessionLauncher,
    SessionOutcome, SessionRequest, DEFAULT_SESSION_TIMEOUT,
};
pub use scripted::{ScriptedLauncher, ScriptedSession};
pub use tracker::ProcessTracker;
pub use types::{ContentBlock, LogEntryKind, ProcessLogEntry, SessionMessage};
