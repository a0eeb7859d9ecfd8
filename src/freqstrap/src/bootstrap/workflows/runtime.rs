/// Runtime workflow - Python interpreter, virtualenv and the freqtrade package
use super::app::configured_freqai;
use crate::bootstrap::artifacts::Sensitivity;
use crate::bootstrap::context::pip_requirement;
use crate::bootstrap::profile::RuntimeKind;
use crate::bootstrap::retry::retry;
use crate::bootstrap::workflow::{ProvisionContext, StepOutcome};
use crate::host::{run_checked, Invocation, LONG_COMMAND_TIMEOUT};
use crate::provisioner::ProvisionError;
use std::path::{Path, PathBuf};

/// Make sure the base interpreter for the virtualenv exists.
pub async fn python_runtime(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    match ctx.settings.runtime {
        RuntimeKind::Pyenv => ensure_pyenv_python(ctx).await,
        RuntimeKind::SystemPython => {
            let python = &ctx.config.python.system_python;
            let version = interpreter_version(ctx, python).await?.ok_or_else(|| {
                ProvisionError::Artifact(format!("{} does not run", python.display()))
            })?;
            tracing::info!("[Python] Using system {}", version);
            Ok(StepOutcome::unchanged())
        }
        RuntimeKind::Detect => {
            let python = base_interpreter(ctx).await?;
            match interpreter_version(ctx, &python).await? {
                Some(version) => {
                    tracing::info!("[Python] Detected {} at {}", version, python.display());
                    Ok(StepOutcome::unchanged())
                }
                None => Err(ProvisionError::Artifact(format!(
                    "No working Python interpreter found (tried {}); run `freqstrap install` first",
                    python.display()
                ))),
            }
        }
    }
}

/// Interpreter the virtualenv is built from.
pub async fn base_interpreter(ctx: &ProvisionContext<'_>) -> Result<PathBuf, ProvisionError> {
    let pyenv_python = ctx.layout.pyenv_python(&ctx.config.python.version);
    Ok(match ctx.settings.runtime {
        RuntimeKind::Pyenv => pyenv_python,
        RuntimeKind::SystemPython => ctx.config.python.system_python.clone(),
        RuntimeKind::Detect => {
            if ctx.host.stat(&pyenv_python).await?.is_some() {
                pyenv_python
            } else {
                ctx.config.python.system_python.clone()
            }
        }
    })
}

/// `python --version` as the service account, `None` if it does not run.
async fn interpreter_version(
    ctx: &ProvisionContext<'_>,
    python: &Path,
) -> Result<Option<String>, ProvisionError> {
    let check = Invocation::new(python.display().to_string(), ["--version"]).as_account(ctx.account());
    let output = ctx.host.run(&check).await?;
    if !output.success() {
        return Ok(None);
    }
    // Python 2 printed the version on stderr
    let version = if output.stdout.trim().is_empty() {
        output.stderr.trim()
    } else {
        output.stdout.trim()
    };
    Ok(Some(version.to_string()))
}

async fn ensure_pyenv_python(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let version = &ctx.config.python.version;
    let python = ctx.layout.pyenv_python(version);
    if ctx.host.stat(&python).await?.is_some() {
        tracing::info!("[Python] pyenv Python {} already built", version);
        return Ok(StepOutcome::unchanged());
    }

    let mut outcome = StepOutcome::unchanged();
    let root = &ctx.layout.pyenv_root;

    if ctx.host.stat(&ctx.layout.pyenv_bin()).await?.is_none() {
        let clone = Invocation::new(
            "git",
            [
                "clone".to_string(),
                "--depth".to_string(),
                "1".to_string(),
                ctx.config.python.pyenv_repo.clone(),
                root.display().to_string(),
            ],
        )
        .as_account(ctx.account())
        .with_timeout(LONG_COMMAND_TIMEOUT);
        let clone = &clone;

        retry(&ctx.retry, "pyenv clone", |_| async move {
            // git refuses to clone into a non-empty directory
            if ctx.layout.is_under_home(root) && ctx.host.stat(root).await?.is_some() {
                ctx.host.remove_tree(root).await?;
            }
            run_checked(ctx.host, clone).await
        })
        .await?;
        outcome.change(format!("cloned pyenv into {}", root.display()));
    }

    let build = Invocation::new(
        ctx.layout.pyenv_bin().display().to_string(),
        ["install", "--skip-existing", version.as_str()],
    )
    .as_account(ctx.account())
    .with_env("PYENV_ROOT", root.display().to_string())
    .with_timeout(LONG_COMMAND_TIMEOUT);
    tracing::info!("[Python] Building Python {} with pyenv, this takes a while", version);
    retry(&ctx.retry, &format!("pyenv install {}", version), |_| {
        run_checked(ctx.host, &build)
    })
    .await?;
    outcome.change(format!("built Python {} with pyenv", version));

    Ok(outcome)
}

/// Create the virtualenv; repair recreates one whose interpreter no longer runs.
pub async fn virtual_env(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let venv = &ctx.layout.venv;
    let mut outcome = StepOutcome::unchanged();

    if ctx.host.stat(&ctx.layout.venv_python()).await?.is_some() {
        if !ctx.settings.repair {
            return Ok(outcome);
        }
        if let Some(version) = interpreter_version(ctx, &ctx.layout.venv_python()).await? {
            tracing::info!("[Venv] Virtualenv healthy ({})", version);
            return Ok(outcome);
        }
        tracing::warn!("[Venv] Interpreter in {} is broken, recreating", venv.display());
        ctx.host.remove_tree(venv).await?;
        ctx.host
            .create_dir(venv, &ctx.ownership(), Sensitivity::General.dir_mode())
            .await?;
        outcome.change(format!("removed broken virtualenv {}", venv.display()));
    }

    let base = base_interpreter(ctx).await?;
    let create = Invocation::new(
        base.display().to_string(),
        ["-m".to_string(), "venv".to_string(), venv.display().to_string()],
    )
    .as_account(ctx.account());
    run_checked(ctx.host, &create).await?;
    tracing::info!("[Venv] Created virtualenv {} from {}", venv.display(), base.display());
    outcome.change(format!("created virtualenv {}", venv.display()));
    Ok(outcome)
}

/// pip-install freqtrade into the virtualenv unless its CLI is already there.
pub async fn freqtrade_install(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let freqtrade = ctx.layout.freqtrade_bin();
    if ctx.host.stat(&freqtrade).await?.is_some() {
        if !ctx.settings.repair {
            tracing::info!("[Freqtrade] Already installed at {}", freqtrade.display());
            return Ok(StepOutcome::unchanged());
        }
        let check = Invocation::new(freqtrade.display().to_string(), ["--version"])
            .as_account(ctx.account());
        if ctx.host.run(&check).await?.success() {
            tracing::info!("[Freqtrade] CLI healthy");
            return Ok(StepOutcome::unchanged());
        }
        tracing::warn!("[Freqtrade] CLI broken, reinstalling");
    }

    let pip = ctx.layout.venv_bin("pip").display().to_string();
    let tooling = Invocation::new(
        pip.clone(),
        ["install", "--upgrade", "pip", "wheel", "setuptools"],
    )
    .as_account(ctx.account())
    .with_timeout(LONG_COMMAND_TIMEOUT);
    retry(&ctx.retry, "pip tooling upgrade", |_| {
        run_checked(ctx.host, &tooling)
    })
    .await?;

    let freqai = configured_freqai(ctx).await;
    let requirement = pip_requirement(&ctx.config.freqtrade.package, freqai);
    let install = Invocation::new(pip, ["install", "--upgrade", requirement.as_str()])
        .as_account(ctx.account())
        .with_timeout(LONG_COMMAND_TIMEOUT);
    tracing::info!("[Freqtrade] Installing {}", requirement);
    retry(&ctx.retry, &format!("pip install {}", requirement), |_| {
        run_checked(ctx.host, &install)
    })
    .await?;

    Ok(StepOutcome::changed(format!("installed {}", requirement)))
}
