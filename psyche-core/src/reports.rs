//! Governance report persistence under `reports/`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::infra::{iso_millis, Clock, FileSystem};
use crate::roles::superego::AuditReport;
use crate::substrate::SubstrateLayout;

pub struct ReportStore {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    clock: Arc<dyn Clock>,
}

impl ReportStore {
    pub fn new(fs: Arc<dyn FileSystem>, layout: SubstrateLayout, clock: Arc<dyn Clock>) -> Self {
        Self { fs, layout, clock }
    }

    /// Persist one audit report as a date-stamped markdown file and return
    /// its path.
    pub async fn store(&self, report: &AuditReport) -> Result<PathBuf> {
        let dir = self.layout.reports_dir();
        self.fs.create_dir_all(&dir).await?;

        let now = self.clock.now();
        let name = format!("audit-{}Z.md", now.format("%Y%m%dT%H%M%S%.3f"));
        let path = dir.join(&name);

        let mut doc = format!(
            "# Superego Audit\n\nRun at {}.\n\n## Summary\n\n{}\n",
            iso_millis(now),
            report.summary.trim()
        );
        if !report.findings.is_empty() {
            doc.push_str("\n## Findings\n\n");
            for finding in &report.findings {
                doc.push_str(&format!("- {finding}\n"));
            }
        }
        if !report.proposal_evaluations.is_empty() {
            doc.push_str("\n## Proposal Evaluations\n\n");
            for eval in &report.proposal_evaluations {
                let verdict = if eval.approved { "approved" } else { "rejected" };
                let reason = eval.reason.as_deref().unwrap_or("no reason given");
                doc.push_str(&format!("- [{verdict}] {}: {reason}\n", eval.proposal));
            }
        }

        self.fs.write(&path, &doc).await?;
        Ok(path)
    }

    /// Report file names, oldest first. Missing directory means no reports.
    pub async fn list(&self) -> Result<Vec<String>> {
        let dir = self.layout.reports_dir();
        let mut names = match self.fs.read_dir(&dir).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        names.retain(|n| n.ends_with(".md"));
        // Date-stamped names sort chronologically.
        names.sort();
        Ok(names)
    }

    pub async fn latest(&self) -> Result<Option<(String, String)>> {
        let names = self.list().await?;
        let Some(name) = names.last() else {
            return Ok(None);
        };
        let content = self
            .fs
            .read_to_string(&self.layout.reports_dir().join(name))
            .await?;
        Ok(Some((name.clone(), content)))
    }
}
