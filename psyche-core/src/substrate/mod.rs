//! The substrate: the on-disk set of Markdown artifacts that constitute the
//! agent's persistent state.
//!
//! Each identifier maps to one `<NAME>.md` under the substrate root and
//! carries a statically declared write mode. Using the wrong writer for a
//! file's mode is a contract violation and fails loudly.

pub mod appender;
pub mod plan;
pub mod reader;
pub mod redact;
pub mod validate;
pub mod writer;

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::infra::FileSystem;

pub use appender::{SubstrateAppender, DEFAULT_ROTATION_THRESHOLD};
pub use reader::{CacheMetrics, Snapshot, SubstrateReader};
pub use writer::SubstrateWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubstrateFile {
    Plan,
    Memory,
    Skills,
    Habits,
    Values,
    Id,
    Security,
    Charter,
    Superego,
    Progress,
    Conversation,
    RestartContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    AppendOnly,
}

impl SubstrateFile {
    pub const ALL: [SubstrateFile; 12] = [
        SubstrateFile::Plan,
        SubstrateFile::Memory,
        SubstrateFile::Skills,
        SubstrateFile::Habits,
        SubstrateFile::Values,
        SubstrateFile::Id,
        SubstrateFile::Security,
        SubstrateFile::Charter,
        SubstrateFile::Superego,
        SubstrateFile::Progress,
        SubstrateFile::Conversation,
        SubstrateFile::RestartContext,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubstrateFile::Plan => "PLAN",
            SubstrateFile::Memory => "MEMORY",
            SubstrateFile::Skills => "SKILLS",
            SubstrateFile::Habits => "HABITS",
            SubstrateFile::Values => "VALUES",
            SubstrateFile::Id => "ID",
            SubstrateFile::Security => "SECURITY",
            SubstrateFile::Charter => "CHARTER",
            SubstrateFile::Superego => "SUPEREGO",
            SubstrateFile::Progress => "PROGRESS",
            SubstrateFile::Conversation => "CONVERSATION",
            SubstrateFile::RestartContext => "RESTART_CONTEXT",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.md", self.name())
    }

    /// Declared statically; the writers enforce it.
    pub fn write_mode(self) -> WriteMode {
        match self {
            SubstrateFile::Progress | SubstrateFile::Conversation => WriteMode::AppendOnly,
            _ => WriteMode::Overwrite,
        }
    }

    pub fn from_name(name: &str) -> Option<SubstrateFile> {
        let upper = name.trim().to_ascii_uppercase();
        SubstrateFile::ALL
            .into_iter()
            .find(|f| f.name() == upper)
    }
}

impl std::fmt::Display for SubstrateFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves identifiers to paths under a configurable root, plus the
/// archive and report subdirectories.
#[derive(Debug, Clone)]
pub struct SubstrateLayout {
    root: PathBuf,
}

impl SubstrateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn path_for(&self, file: SubstrateFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    /// Rotated PROGRESS archives.
    pub fn progress_archive_dir(&self) -> PathBuf {
        self.root.join("progress")
    }

    /// Date-stamped CONVERSATION archives.
    pub fn conversation_archive_dir(&self) -> PathBuf {
        self.root.join("archive").join("conversation")
    }

    /// Governance audit reports.
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Non-substrate persisted state (backup marker, email scheduler state).
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }
}

/// Metadata returned alongside every read. The hash is a digest of the raw
/// bytes, used for cache revalidation and integrity reporting only.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file: SubstrateFile,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub content_hash: String,
}

/// Create the substrate directories and seed any missing files with a
/// minimal valid document. Returns true when nothing existed yet (first
/// run). Existing files are never touched.
pub async fn bootstrap(fs: &dyn FileSystem, layout: &SubstrateLayout) -> Result<bool> {
    let first_run = !fs.exists(layout.root()).await;
    fs.create_dir_all(layout.root()).await?;
    fs.create_dir_all(&layout.progress_archive_dir()).await?;
    fs.create_dir_all(&layout.conversation_archive_dir()).await?;
    fs.create_dir_all(&layout.reports_dir()).await?;
    fs.create_dir_all(&layout.config_dir()).await?;

    for file in SubstrateFile::ALL {
        let path = layout.path_for(file);
        if fs.exists(&path).await {
            continue;
        }
        let seed = match file {
            SubstrateFile::Plan => "# Plan\n\n## Tasks\n\n".to_string(),
            SubstrateFile::RestartContext => {
                "# Restart Context\n\nNo hibernation in progress.\n".to_string()
            }
            other => format!("# {}\n\n", title_case(other.name())),
        };
        fs.write(&path, &seed).await?;
    }
    Ok(first_run)
}

fn title_case(name: &str) -> String {
    let lower = name.to_ascii_lowercase().replace('_', " ");
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}
