/// Application workflow - config, strategy, helper scripts and the service unit
use crate::bootstrap::artifacts::{ArtifactOutcome, ArtifactSpec, Sensitivity, FREQAI_STRATEGY_NAME};
use crate::bootstrap::context::pip_requirement;
use crate::bootstrap::workflow::{ProvisionContext, StepOutcome};
use crate::host::{run_checked, Invocation};
use crate::provisioner::ProvisionError;
use tera::Context;

/// Helper scripts as (file name, template).
pub const HELPER_SCRIPTS: &[(&str, &str)] = &[
    ("start.sh", "scripts/start.sh.j2"),
    ("backtest.sh", "scripts/backtest.sh.j2"),
    ("hyperopt.sh", "scripts/hyperopt.sh.j2"),
    ("download-data.sh", "scripts/download-data.sh.j2"),
    ("update.sh", "scripts/update.sh.j2"),
];

/// Existing config.json, if present and parseable.
async fn existing_config(ctx: &ProvisionContext<'_>) -> Option<serde_json::Value> {
    if ctx.host.stat(&ctx.layout.config_file).await.ok()??.is_file() {
        let content = ctx.host.read_file(&ctx.layout.config_file).await.ok()?;
        return serde_json::from_str(&content).ok();
    }
    None
}

/// Whether FreqAI is on. Repair never rewrites config, so it trusts the file on disk.
pub async fn configured_freqai(ctx: &ProvisionContext<'_>) -> bool {
    if !ctx.settings.repair {
        return ctx.settings.freqai;
    }
    match existing_config(ctx).await {
        Some(config) => config
            .get("freqai")
            .and_then(|f| f.get("enabled"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        None => ctx.settings.freqai,
    }
}

/// Strategy class the bot starts with.
pub async fn configured_strategy(ctx: &ProvisionContext<'_>) -> String {
    if ctx.settings.repair {
        if let Some(name) = existing_config(ctx)
            .await
            .as_ref()
            .and_then(|c| c.get("strategy"))
            .and_then(serde_json::Value::as_str)
        {
            return name.to_string();
        }
    }
    ctx.settings.active_strategy(ctx.config)
}

/// Template context, with the repair profile following the installed config.
async fn render_context(ctx: &ProvisionContext<'_>) -> Context {
    let mut context = ctx.template_context();
    if ctx.settings.repair {
        let freqai = configured_freqai(ctx).await;
        context.insert("freqai_enabled", &freqai);
        context.insert("active_strategy", &configured_strategy(ctx).await);
        context.insert(
            "pip_requirement",
            &pip_requirement(&ctx.config.freqtrade.package, freqai),
        );
    }
    context
}

async fn materialize_all(
    ctx: &ProvisionContext<'_>,
    specs: &[ArtifactSpec],
) -> Result<StepOutcome, ProvisionError> {
    let writer = ctx.artifact_writer();
    let context = render_context(ctx).await;
    let mut outcome = StepOutcome::unchanged();

    for spec in specs {
        match writer.materialize(spec, &context).await? {
            ArtifactOutcome::Created => {
                outcome.change(format!("wrote {}", spec.destination.display()))
            }
            ArtifactOutcome::Repaired(warning) => {
                outcome.change(format!("repaired {}", spec.destination.display()));
                if let Some(warning) = warning {
                    outcome.warn(warning);
                }
            }
            ArtifactOutcome::Drifted(msg) => outcome.warn(msg),
            ArtifactOutcome::Unchanged => {}
        }
    }
    Ok(outcome)
}

/// config.json and the credentials env file, both secret.
pub fn configuration_artifacts(ctx: &ProvisionContext<'_>) -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new(
            "configuration",
            "config/config.json.j2",
            ctx.layout.config_file.clone(),
            Sensitivity::Secret,
        )
        .validate_json(),
        ArtifactSpec::new(
            "exchange credentials",
            "config/exchange.env.j2",
            ctx.layout.credentials_file.clone(),
            Sensitivity::Secret,
        ),
    ]
}

pub async fn configuration(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    materialize_all(ctx, &configuration_artifacts(ctx)).await
}

/// Starter strategy, plus the FreqAI strategy when FreqAI is on.
pub async fn strategy_artifacts(ctx: &ProvisionContext<'_>) -> Vec<ArtifactSpec> {
    let base = &ctx.config.freqtrade.strategy_name;
    let mut specs = vec![ArtifactSpec::new(
        "strategy",
        "strategies/SampleStrategy.py.j2",
        ctx.layout.strategy_file(base),
        Sensitivity::General,
    )];
    if configured_freqai(ctx).await {
        specs.push(ArtifactSpec::new(
            "FreqAI strategy",
            "strategies/FreqaiStarterStrategy.py.j2",
            ctx.layout.strategy_file(FREQAI_STRATEGY_NAME),
            Sensitivity::General,
        ));
    }
    specs
}

pub async fn strategy(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let specs = strategy_artifacts(ctx).await;
    materialize_all(ctx, &specs).await
}

pub fn script_artifacts(ctx: &ProvisionContext<'_>) -> Vec<ArtifactSpec> {
    HELPER_SCRIPTS
        .iter()
        .map(|(name, template)| {
            ArtifactSpec::new(*name, *template, ctx.layout.script(name), Sensitivity::Script)
        })
        .collect()
}

pub async fn helper_scripts(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    materialize_all(ctx, &script_artifacts(ctx)).await
}

pub fn unit_artifact(ctx: &ProvisionContext<'_>) -> ArtifactSpec {
    ArtifactSpec::new(
        "service unit",
        "systemd/freqtrade.service.j2",
        ctx.layout.unit_path.clone(),
        Sensitivity::General,
    )
    .owned_by_root()
}

/// Write the unit and enable it. The service is not started.
pub async fn service_unit(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let unit = unit_artifact(ctx);
    let mut outcome = materialize_all(ctx, std::slice::from_ref(&unit)).await?;
    let service = ctx.config.system.service_name.as_str();

    if !outcome.is_unchanged() {
        run_checked(
            ctx.host,
            &Invocation::new("systemctl", ["daemon-reload"]).as_root(),
        )
        .await?;
    }

    let enabled = ctx
        .host
        .run(&Invocation::new("systemctl", ["is-enabled", service]))
        .await?;
    if enabled.stdout.trim() != "enabled" {
        run_checked(
            ctx.host,
            &Invocation::new("systemctl", ["enable", service]).as_root(),
        )
        .await?;
        tracing::info!(
            "[Service] Enabled {}; start it with `sudo systemctl start {}` once credentials are set",
            service,
            service
        );
        outcome.change(format!("enabled {}", service));
    }

    Ok(outcome)
}
