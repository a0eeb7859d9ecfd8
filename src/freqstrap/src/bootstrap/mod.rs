/// Host bootstrap: profiles, steps, templates, artifacts and verification.
pub mod artifacts;
pub mod config;
pub mod context;
pub mod embedded_templates;
pub mod layout;
pub mod menu;
pub mod profile;
pub mod provisioner;
pub mod retry;
pub mod tasks;
pub mod template_renderer;
pub mod verify;
pub mod workflow;
pub mod workflows;

pub use config::ProvisionConfig;
pub use menu::{run_menu, MenuChoice};
pub use profile::{Profile, ProfileSettings};
pub use provisioner::HostProvisioner;
pub use retry::{retry, RetryPolicy};
pub use tasks::ProvisionStep;
pub use template_renderer::TemplateRenderer;
pub use verify::{CheckItem, CheckStatus, VerificationReport};
pub use workflow::{run_steps, RunSummary, StepExecutor, StepOutcome};
