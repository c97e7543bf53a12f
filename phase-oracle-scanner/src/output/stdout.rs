//! Stdout output handler.
//!
//! One JSON document per report. Compact mode keeps each report on a single
//! line so the output can be piped through line-oriented tools.

use super::OutputHandler;
use crate::analyzer::PeriodReport;
use async_trait::async_trait;
use std::io::Write;

/// Writes reports to stdout.
#[derive(Debug, Default)]
pub struct StdoutHandler {
    pretty: bool,
}

impl StdoutHandler {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Multi-line, indented JSON.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    fn render(&self, report: &PeriodReport) -> anyhow::Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        })
    }
}

#[async_trait]
impl OutputHandler for StdoutHandler {
    async fn handle(&self, report: &PeriodReport) -> anyhow::Result<()> {
        let output = self.render(report)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", output)?;
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}
