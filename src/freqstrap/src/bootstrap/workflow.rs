/// Generic workflow executor for provisioning steps.
///
/// Runs an ordered list of ProvisionSteps against a host with progress reporting.
/// Fail-fast: the first failing step aborts the run, earlier steps stay applied.
use crate::bootstrap::artifacts::ArtifactWriter;
use crate::bootstrap::config::ProvisionConfig;
use crate::bootstrap::context::build_template_context;
use crate::bootstrap::layout::Layout;
use crate::bootstrap::profile::ProfileSettings;
use crate::bootstrap::retry::RetryPolicy;
use crate::bootstrap::tasks::ProvisionStep;
use crate::bootstrap::template_renderer::TemplateRenderer;
use crate::bootstrap::verify::{verify_installation, VerificationReport};
use crate::bootstrap::workflows::{account, app, runtime, system};
use crate::host::{Host, Ownership};
use crate::provisioner::ProvisionError;
use std::time::{Duration, Instant};

/// What a step did.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Actions taken. Empty when the host already matched.
    pub changes: Vec<String>,
    /// Drift noticed but left alone
    pub warnings: Vec<String>,
    pub report: Option<VerificationReport>,
}

impl StepOutcome {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn changed(change: impl Into<String>) -> Self {
        Self {
            changes: vec![change.into()],
            ..Self::default()
        }
    }

    pub fn change(&mut self, change: impl Into<String>) {
        self.changes.push(change.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Everything a step needs. Built once per run and never mutated.
pub struct ProvisionContext<'a> {
    pub config: &'a ProvisionConfig,
    pub settings: &'a ProfileSettings,
    pub layout: Layout,
    pub host: &'a dyn Host,
    pub renderer: &'a TemplateRenderer,
    pub retry: RetryPolicy,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        settings: &'a ProfileSettings,
        host: &'a dyn Host,
        renderer: &'a TemplateRenderer,
    ) -> Self {
        Self {
            layout: Layout::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
            config,
            settings,
            host,
            renderer,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn account(&self) -> &str {
        &self.config.account.name
    }

    pub fn ownership(&self) -> Ownership {
        Ownership::account(self.account())
    }

    pub fn artifact_writer(&self) -> ArtifactWriter<'_> {
        ArtifactWriter::new(
            self.host,
            self.renderer,
            self.ownership(),
            self.settings.repair,
        )
    }

    pub fn template_context(&self) -> tera::Context {
        build_template_context(self.config, &self.layout, self.settings)
    }
}

/// Dispatches steps to their workflow functions.
pub struct StepExecutor<'a> {
    ctx: ProvisionContext<'a>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(ctx: ProvisionContext<'a>) -> Self {
        Self { ctx }
    }

    /// Execute a single step
    pub async fn execute(&self, step: &ProvisionStep) -> Result<StepOutcome, ProvisionError> {
        tracing::info!(
            "[StepExecutor] Executing step '{}' ({})",
            step.display_name(),
            step.task_id()
        );
        let ctx = &self.ctx;
        let outcome = match step {
            ProvisionStep::Preflight => system::preflight(ctx).await?,
            ProvisionStep::KeyboardLayout => system::keyboard_layout(ctx).await?,
            ProvisionStep::RefreshPackageIndex => system::refresh_package_index(ctx).await?,
            ProvisionStep::UpgradePackages => system::upgrade_packages(ctx).await?,
            ProvisionStep::PackageGroup(group) => system::install_package_group(ctx, *group).await?,
            ProvisionStep::ServiceAccount => account::service_account(ctx).await?,
            ProvisionStep::DirectoryTree => account::directory_tree(ctx).await?,
            ProvisionStep::PythonRuntime => runtime::python_runtime(ctx).await?,
            ProvisionStep::VirtualEnv => runtime::virtual_env(ctx).await?,
            ProvisionStep::FreqtradeInstall => runtime::freqtrade_install(ctx).await?,
            ProvisionStep::Configuration => app::configuration(ctx).await?,
            ProvisionStep::Strategy => app::strategy(ctx).await?,
            ProvisionStep::HelperScripts => app::helper_scripts(ctx).await?,
            ProvisionStep::ServiceUnit => app::service_unit(ctx).await?,
            ProvisionStep::Verify => {
                let report = verify_installation(ctx).await;
                tracing::debug!("{}", report.render());
                StepOutcome {
                    report: Some(report),
                    ..StepOutcome::default()
                }
            }
        };

        for warning in &outcome.warnings {
            tracing::warn!("[StepExecutor] {}: {}", step.display_name(), warning);
        }
        if outcome.is_unchanged() {
            tracing::info!(
                "[StepExecutor] Step '{}' already satisfied",
                step.display_name()
            );
        } else {
            tracing::info!(
                "[StepExecutor] Step '{}' applied {} change(s)",
                step.display_name(),
                outcome.changes.len()
            );
        }
        Ok(outcome)
    }
}

/// A step that ran to completion.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: ProvisionStep,
    pub outcome: StepOutcome,
    pub duration: Duration,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records: Vec<StepRecord>,
}

impl RunSummary {
    /// True when no step changed anything.
    pub fn is_unchanged(&self) -> bool {
        self.records.iter().all(|r| r.outcome.is_unchanged())
    }

    pub fn changes(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|r| r.outcome.changes.iter().cloned())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|r| r.outcome.warnings.iter().cloned())
            .collect()
    }

    /// Report of the last verification step, if one ran.
    pub fn verification(&self) -> Option<&VerificationReport> {
        self.records
            .iter()
            .rev()
            .find_map(|r| r.outcome.report.as_ref())
    }
}

/// Execute a sequence of provisioning steps with progress tracking.
/// Fail-fast: stops on the first step failure.
pub async fn run_steps<F>(
    steps: &[ProvisionStep],
    executor: &StepExecutor<'_>,
    progress_fn: F,
) -> Result<RunSummary, ProvisionError>
where
    F: Fn(u32, &str),
{
    let mut summary = RunSummary::default();
    if steps.is_empty() {
        return Ok(summary);
    }

    let total_steps = steps.len() as u32;

    for (index, step) in steps.iter().enumerate() {
        let progress = 100u32.saturating_mul(index as u32) / total_steps;
        let display_name = step.display_name();

        progress_fn(progress, &format!("Executing {}", display_name));

        let step_start = Instant::now();
        let outcome = match executor.execute(step).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    "[TIMING] Step {} failed after {}ms",
                    display_name,
                    step_start.elapsed().as_millis()
                );
                tracing::error!(
                    "[StepExecutor] Step {}/{} '{}' failed: {}",
                    index + 1,
                    total_steps,
                    display_name,
                    e
                );
                return Err(e);
            }
        };
        let step_duration = step_start.elapsed();

        tracing::info!(
            "[TIMING] Step {} completed in {}ms",
            display_name,
            step_duration.as_millis()
        );

        summary.records.push(StepRecord {
            step: *step,
            outcome,
            duration: step_duration,
        });

        let completion_progress = if index + 1 < steps.len() {
            100u32.saturating_mul((index + 1) as u32) / total_steps
        } else {
            100
        };
        progress_fn(completion_progress, &format!("Completed {}", display_name));
    }

    Ok(summary)
}
