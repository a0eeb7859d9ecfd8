/// Host provisioner - entry point tying config, host, templates and steps together
use crate::bootstrap::config::ProvisionConfig;
use crate::bootstrap::profile::{Profile, ProfileSettings};
use crate::bootstrap::retry::RetryPolicy;
use crate::bootstrap::tasks::ProvisionStep;
use crate::bootstrap::template_renderer::TemplateRenderer;
use crate::bootstrap::verify::{verify_installation, VerificationReport};
use crate::bootstrap::workflow::{self, ProvisionContext, RunSummary, StepExecutor};
use crate::bootstrap::workflows;
use crate::host::Host;
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::sync::Arc;

pub struct HostProvisioner {
    config: ProvisionConfig,
    host: Arc<dyn Host>,
    template_renderer: TemplateRenderer,
    retry: RetryPolicy,
}

impl HostProvisioner {
    /// Create a provisioner. Loads template overrides when `templates_dir` is configured.
    pub fn new(config: ProvisionConfig, host: Arc<dyn Host>) -> Result<Self, ProvisionError> {
        tracing::info!("[HostProvisioner] Initializing...");
        tracing::info!(
            "[HostProvisioner] Service account: {} (home under {})",
            config.account.name,
            config.account.home_root.display()
        );

        let template_renderer = match &config.templates_dir {
            Some(dir) => TemplateRenderer::with_overrides(dir.clone())?,
            None => TemplateRenderer::from_embedded()?,
        };
        tracing::info!(
            "[HostProvisioner] {} templates ({})",
            template_renderer.list_templates().len(),
            template_renderer
                .templates_dir()
                .map(|d| format!("overrides from {}", d.display()))
                .unwrap_or_else(|| "embedded".to_string())
        );

        Ok(Self {
            retry: RetryPolicy::from_config(&config.retry),
            config,
            host,
            template_renderer,
        })
    }

    /// Replace the retry policy from the config.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn settings(&self, profile: Profile) -> ProfileSettings {
        ProfileSettings::resolve(profile, &self.config)
    }

    /// Steps `profile` would run, in order.
    pub fn plan(&self, profile: Profile) -> Vec<ProvisionStep> {
        workflows::plan(&self.settings(profile))
    }

    /// Run the whole pipeline for `profile`.
    pub async fn run(
        &self,
        profile: Profile,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunSummary, ProvisionError> {
        let steps = self.plan(profile);
        self.run_steps(profile, &steps, reporter).await
    }

    /// Run an explicit list of steps with `profile`'s settings.
    pub async fn run_steps(
        &self,
        profile: Profile,
        steps: &[ProvisionStep],
        reporter: &dyn ProgressReporter,
    ) -> Result<RunSummary, ProvisionError> {
        let settings = self.settings(profile);
        let ctx = ProvisionContext::new(
            &self.config,
            &settings,
            self.host.as_ref(),
            &self.template_renderer,
        )
        .with_retry(self.retry);
        let executor = StepExecutor::new(ctx);

        tracing::info!(
            "[HostProvisioner] Running {} steps with profile {}",
            steps.len(),
            profile
        );
        let start = std::time::Instant::now();
        let summary = workflow::run_steps(steps, &executor, |percentage, message| {
            reporter.emit_detailed(
                percentage,
                message.to_string(),
                Some(profile.name().to_string()),
                None,
            )
        })
        .await?;

        tracing::info!(
            "[TIMING] Profile {} finished in {}ms: {} changes, {} warnings",
            profile,
            start.elapsed().as_millis(),
            summary.changes().len(),
            summary.warnings().len()
        );
        Ok(summary)
    }

    /// Read-only checklist. Follows whatever is installed, like repair does.
    pub async fn verify(&self) -> VerificationReport {
        let settings = self.settings(Profile::Repair);
        let ctx = ProvisionContext::new(
            &self.config,
            &settings,
            self.host.as_ref(),
            &self.template_renderer,
        );
        verify_installation(&ctx).await
    }
}
