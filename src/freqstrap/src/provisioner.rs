//! Progress reporting and error types for provisioning operations.

use crate::progress::StepProgress;

/// Progress reporter for provisioning operations.
pub trait ProgressReporter: Send + Sync + 'static {
    fn emit(&self, percentage: u32, message: String);

    /// Emit progress with step metadata.
    fn emit_detailed(
        &self,
        percentage: u32,
        message: String,
        _profile: Option<String>,
        _step_name: Option<String>,
    ) {
        self.emit(percentage, message);
    }
}

/// Reporter that forwards progress into the tracing log (and therefore the run log file).
pub struct LogProgressReporter {
    profile: Option<String>,
}

impl LogProgressReporter {
    pub fn new() -> Self {
        Self { profile: None }
    }

    pub fn with_profile(profile: impl Into<String>) -> Self {
        Self {
            profile: Some(profile.into()),
        }
    }
}

impl Default for LogProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for LogProgressReporter {
    fn emit(&self, percentage: u32, message: String) {
        self.emit_detailed(percentage, message, None, None);
    }

    fn emit_detailed(
        &self,
        percentage: u32,
        message: String,
        profile: Option<String>,
        step_name: Option<String>,
    ) {
        let mut progress = StepProgress::new(percentage, message);
        progress.profile = profile.or_else(|| self.profile.clone());
        progress.step_name = step_name;
        tracing::info!("{}", progress);
    }
}

/// Error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command `{command}` failed (exit {exit_code}): {detail}")]
    Command {
        command: String,
        exit_code: i32,
        detail: String,
    },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Interrupted during {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Precondition failures abort before any mutation and are never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ProvisionError::Precondition(_))
    }
}
