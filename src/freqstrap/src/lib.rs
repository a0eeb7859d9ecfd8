//! freqstrap
//!
//! Idempotent provisioning of an Ubuntu host for the Freqtrade trading bot.
//! It combines bootstrap (profiles, steps, templates), host (command and file
//! access, privilege crossing) and logging modules.

pub mod logging;
pub mod progress;
pub mod provisioner;

pub use progress::StepProgress;
pub use provisioner::{LogProgressReporter, ProgressReporter, ProvisionError};

// Host access
pub mod host;
pub use host::{Host, Invocation, RunAs, SystemHost};

// Bootstrap (profiles, steps and workflow)
pub mod bootstrap;
pub use bootstrap::{
    run_menu, HostProvisioner, MenuChoice, Profile, ProvisionConfig, ProvisionStep, RunSummary,
    TemplateRenderer, VerificationReport,
};
