//! Overwrite-mode writer.
//!
//! Refuses append-only identifiers, validates content, redacts secrets,
//! then writes under the per-file lock and invalidates the reader cache.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use super::{redact, validate, SubstrateFile, SubstrateLayout, WriteMode};
use crate::error::{PsycheError, Result};
use crate::events::{EventBus, EventType};
use crate::infra::{FileLockRegistry, FileSystem};
use crate::substrate::SubstrateReader;

pub struct SubstrateWriter {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    locks: Arc<FileLockRegistry>,
    reader: Arc<SubstrateReader>,
    events: Option<Arc<EventBus>>,
}

impl SubstrateWriter {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        locks: Arc<FileLockRegistry>,
        reader: Arc<SubstrateReader>,
    ) -> Self {
        Self {
            fs,
            layout,
            locks,
            reader,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn write(&self, file: SubstrateFile, content: &str) -> Result<()> {
        if file.write_mode() != WriteMode::Overwrite {
            return Err(PsycheError::ContractViolation(format!(
                "{file} is append-only; use the appender"
            )));
        }

        validate::validate(file, content).map_err(|reason| PsycheError::InvalidContent {
            file: file.name(),
            reason,
        })?;

        let (content, redacted) = redact::redact_secrets(content);
        if redacted > 0 {
            warn!("Redacted {redacted} secret(s) while writing {file}");
        }

        let path = self.layout.path_for(file);
        let _guard = self.locks.acquire(file).await;
        self.fs.write(&path, &content).await?;
        self.reader.invalidate(&path);

        if let Some(events) = &self.events {
            events.emit(
                EventType::FileChanged,
                json!({ "file": file.name(), "path": path.display().to_string() }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::TokioFs;

    fn stack(dir: &tempfile::TempDir) -> (Arc<TokioFs>, SubstrateLayout, SubstrateWriter) {
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        let locks = Arc::new(FileLockRegistry::new());
        let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
        let writer = SubstrateWriter::new(fs.clone(), layout.clone(), locks, reader);
        (fs, layout, writer)
    }

    #[tokio::test]
    async fn test_rejects_append_only_files() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, layout, writer) = stack(&dir);

        let err = writer
            .write(SubstrateFile::Progress, "# Progress\n")
            .await
            .unwrap_err();
        assert!(matches!(err, PsycheError::ContractViolation(_)));
        // No file change observed.
        assert!(!fs.exists(&layout.path_for(SubstrateFile::Progress)).await);
    }

    #[tokio::test]
    async fn test_invalid_content_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, layout, writer) = stack(&dir);

        let err = writer
            .write(SubstrateFile::Plan, "# Plan without tasks\n")
            .await
            .unwrap_err();
        assert!(matches!(err, PsycheError::InvalidContent { .. }));
        assert!(!fs.exists(&layout.path_for(SubstrateFile::Plan)).await);
    }

    #[tokio::test]
    async fn test_write_redacts_and_lands() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, layout, writer) = stack(&dir);

        writer
            .write(SubstrateFile::Skills, "# Skills\n\nkey sk-abcdefghijklmnop1234\n")
            .await
            .unwrap();
        let content = fs
            .read_to_string(&layout.path_for(SubstrateFile::Skills))
            .await
            .unwrap();
        assert!(content.contains("[REDACTED]"));
        assert!(!content.contains("sk-abcdefghijklmnop1234"));
    }

    #[tokio::test]
    async fn test_rewrite_of_read_content_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        let locks = Arc::new(FileLockRegistry::new());
        let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
        let writer = SubstrateWriter::new(fs, layout, locks, reader.clone());

        writer
            .write(SubstrateFile::Memory, "# Memory\n\n- stable fact\n")
            .await
            .unwrap();
        let before = reader.read(SubstrateFile::Memory).await.unwrap().markdown;
        writer.write(SubstrateFile::Memory, &before).await.unwrap();
        let after = reader.read(SubstrateFile::Memory).await.unwrap().markdown;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_write_invalidates_reader_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        let locks = Arc::new(FileLockRegistry::new());
        let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
        let writer = SubstrateWriter::new(fs.clone(), layout.clone(), locks, reader.clone());

        writer.write(SubstrateFile::Memory, "# Memory\n\nv1\n").await.unwrap();
        reader.read(SubstrateFile::Memory).await.unwrap();
        writer.write(SubstrateFile::Memory, "# Memory\n\nv2\n").await.unwrap();

        let snap = reader.read(SubstrateFile::Memory).await.unwrap();
        assert!(snap.markdown.contains("v2"));
    }
}
