//! File output handler.
//!
//! Writes each report to `<dir>/phase-oracle-<period>.json`. Writes go to a
//! temporary file first and are renamed into place, so a reader never sees a
//! half-written report.

use super::OutputHandler;
use crate::analyzer::PeriodReport;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Handler that writes one JSON file per period.
pub struct FileHandler {
    /// Directory receiving the reports
    dir: PathBuf,
}

impl FileHandler {
    /// Create a handler writing into `dir`, creating it if needed.
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of the report for a period label.
    pub fn report_path(&self, period: &str) -> PathBuf {
        self.dir.join(format!("phase-oracle-{}.json", period))
    }
}

#[async_trait]
impl OutputHandler for FileHandler {
    async fn handle(&self, report: &PeriodReport) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(report)?;
        let path = self.report_path(&report.period);

        // Write to temp file first
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;

        // Atomic rename
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::info!("Wrote report for {} to {:?}", report.period, path);
        Ok(())
    }
}
