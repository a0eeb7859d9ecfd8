/// Account workflow - service account and its managed directory tree
use crate::bootstrap::artifacts::describe_drift;
use crate::bootstrap::workflow::{ProvisionContext, StepOutcome};
use crate::host::{run_checked, Invocation};
use crate::provisioner::ProvisionError;

/// Create the service account, or top up its group memberships.
pub async fn service_account(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let name = ctx.account();
    let mut outcome = StepOutcome::unchanged();

    let mut groups = Vec::new();
    for group in ctx.settings.account_groups(ctx.config) {
        if ctx.host.group_exists(&group).await? {
            groups.push(group);
        } else {
            outcome.warn(format!("group '{}' does not exist, not joining it", group));
        }
    }

    let Some(info) = ctx.host.lookup_account(name).await? else {
        let home = ctx.layout.home.display().to_string();
        let mut args = vec![
            "--create-home".to_string(),
            "--home-dir".to_string(),
            home,
            "--shell".to_string(),
            ctx.config.account.shell.clone(),
        ];
        if !groups.is_empty() {
            args.push("--groups".to_string());
            args.push(groups.join(","));
        }
        args.push(name.to_string());

        run_checked(ctx.host, &Invocation::new("useradd", args).as_root()).await?;
        // useradd honours HOME_MODE (often 750); the tree expects 755
        ctx.host
            .set_permissions(&ctx.layout.home, &ctx.ownership(), 0o755)
            .await?;
        tracing::info!("[Account] Created service account {}", name);
        outcome.change(format!("created service account {}", name));
        return Ok(outcome);
    };

    if info.home != ctx.layout.home {
        outcome.warn(format!(
            "account {} has home {} (expected {})",
            name,
            info.home.display(),
            ctx.layout.home.display()
        ));
    }

    let missing: Vec<String> = groups
        .into_iter()
        .filter(|g| !info.groups.contains(g))
        .collect();
    if !missing.is_empty() {
        let joined = missing.join(",");
        run_checked(
            ctx.host,
            &Invocation::new("usermod", ["-aG", joined.as_str(), name]).as_root(),
        )
        .await?;
        tracing::info!("[Account] Added {} to groups {}", name, joined);
        outcome.change(format!("added {} to groups {}", name, joined));
    }

    Ok(outcome)
}

/// Create every managed directory; report or repair owner and mode drift.
pub async fn directory_tree(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let owner = ctx.ownership();
    let mut outcome = StepOutcome::unchanged();

    for dir in ctx.layout.managed_dirs() {
        let mode = dir.sensitivity.dir_mode();
        match ctx.host.stat(&dir.path).await? {
            None => {
                ctx.host.create_dir(&dir.path, &owner, mode).await?;
                tracing::info!(
                    "[Directories] Created {} directory {} ({:o})",
                    dir.label,
                    dir.path.display(),
                    mode
                );
                outcome.change(format!("created {}", dir.path.display()));
            }
            Some(stat) if !stat.is_dir() => {
                return Err(ProvisionError::Artifact(format!(
                    "{} exists but is not a directory",
                    dir.path.display()
                )));
            }
            Some(stat) => {
                let Some(drift) = describe_drift(&stat, &owner, mode) else {
                    continue;
                };
                if ctx.settings.repair {
                    ctx.host.set_permissions(&dir.path, &owner, mode).await?;
                    tracing::info!(
                        "[Directories] Repaired {}: {}",
                        dir.path.display(),
                        drift
                    );
                    outcome.change(format!("repaired {} ({})", dir.path.display(), drift));
                } else {
                    outcome.warn(format!(
                        "{}: {} (run `freqstrap repair` to fix)",
                        dir.path.display(),
                        drift
                    ));
                }
            }
        }
    }

    Ok(outcome)
}
