//! Progress records emitted while a pipeline runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of a provisioning run.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct StepProgress {
    pub percentage: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
}

impl StepProgress {
    pub fn new(percentage: u32, message: String) -> Self {
        Self {
            percentage,
            message,
            profile: None,
            step_name: None,
        }
    }
}

impl fmt::Display for StepProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>3}%]", self.percentage.min(100))?;
        if let Some(profile) = &self.profile {
            write!(f, " ({})", profile)?;
        }
        write!(f, " {}", self.message)
    }
}
