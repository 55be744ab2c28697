//! Error-tracking sink for spawn attempts and failures.

use std::path::PathBuf;

use serde::Serialize;

use crate::pty::SpawnMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStage {
    Attempt,
    Failed,
    FallbackAttempt,
    FallbackFailed,
}

/// Context recorded for one spawn attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnReport {
    pub stage: SpawnStage,
    pub mode: SpawnMode,
    pub pty_id: String,
    pub program: String,
    pub cwd: Option<PathBuf>,
    pub args: Vec<String>,
    pub provider: Option<String>,
    pub error: Option<String>,
}

/// Receives spawn reports. Reporting never affects the spawn itself.
pub trait ErrorReporter: Send + Sync {
    fn report_spawn(&self, report: &SpawnReport);
}

/// Writes reports to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_spawn(&self, report: &SpawnReport) {
        let cwd = report.cwd.as_ref().map(|p| p.display().to_string());
        match report.stage {
            SpawnStage::Attempt | SpawnStage::FallbackAttempt => {
                tracing::debug!(
                    stage = ?report.stage,
                    mode = %report.mode,
                    pty_id = %report.pty_id,
                    program = %report.program,
                    cwd = ?cwd,
                    args = ?report.args,
                    provider = ?report.provider,
                    "Spawning PTY"
                );
            }
            SpawnStage::Failed | SpawnStage::FallbackFailed => {
                tracing::error!(
                    stage = ?report.stage,
                    mode = %report.mode,
                    pty_id = %report.pty_id,
                    program = %report.program,
                    cwd = ?cwd,
                    args = ?report.args,
                    provider = ?report.provider,
                    error = ?report.error,
                    "PTY spawn failed"
                );
            }
        }
    }
}
