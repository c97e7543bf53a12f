//! Output handlers for period reports.
//!
//! This module provides different ways to output reports:
//! - Stdout (JSON)
//! - File (one JSON document per period, written atomically)

mod file;
mod stdout;

pub use file::FileHandler;
pub use stdout::StdoutHandler;

use crate::{analyzer::PeriodReport, config::OutputMode};
use async_trait::async_trait;
use std::path::Path;

/// Trait for report output handlers.
#[async_trait]
pub trait OutputHandler: Send + Sync {
    /// Handle a finished period report.
    async fn handle(&self, report: &PeriodReport) -> anyhow::Result<()>;

    /// Handle several reports.
    async fn handle_batch(&self, reports: &[PeriodReport]) -> anyhow::Result<()> {
        for report in reports {
            self.handle(report).await?;
        }
        Ok(())
    }

    /// Flush any buffered output.
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Create an output handler based on configuration.
pub fn create_handler(
    output_mode: &OutputMode,
    output_path: Option<&Path>,
) -> anyhow::Result<Box<dyn OutputHandler>> {
    match output_mode {
        OutputMode::Stdout => Ok(Box::new(StdoutHandler::new())),
        OutputMode::File => {
            let path = output_path
                .ok_or_else(|| anyhow::anyhow!("output_path required for file output mode"))?;
            Ok(Box::new(FileHandler::new(path)?))
        }
    }
}
