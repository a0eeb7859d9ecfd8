/// System workflow - preflight checks, keyboard layout and apt packages
use crate::bootstrap::profile::PackageGroup;
use crate::bootstrap::retry::retry;
use crate::bootstrap::workflow::{ProvisionContext, StepOutcome};
use crate::host::{run_checked, Invocation, LONG_COMMAND_TIMEOUT};
use crate::provisioner::ProvisionError;
use std::path::Path;
use std::time::{Duration, SystemTime};

const APT_LISTS_DIR: &str = "/var/lib/apt/lists";
const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Refuse to continue unless the host can be provisioned. Never mutates anything.
pub async fn preflight(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let invoker = ctx.host.invoker();
    if invoker.is_root() {
        return Err(ProvisionError::Precondition(
            "freqstrap must be run as a regular user with sudo rights, not as root".to_string(),
        ));
    }
    tracing::info!("[Preflight] Invoker {} (UID {})", invoker.name, invoker.uid);

    let cached = ctx.host.run(&Invocation::new("sudo", ["-n", "true"])).await?;
    if !cached.success() {
        tracing::info!("[Preflight] sudo needs a password, asking once");
        let prompted = ctx.host.run(&Invocation::new("sudo", ["-v"])).await?;
        if !prompted.success() {
            return Err(ProvisionError::Precondition(format!(
                "{} has no sudo privileges: {}",
                invoker.name,
                prompted.last_line()
            )));
        }
    }

    let req = &ctx.config.requirements;
    let reachable = ctx
        .host
        .probe_tcp(
            &req.network_probe_host,
            req.network_probe_port,
            Duration::from_secs(req.network_probe_timeout_secs),
        )
        .await;
    if !reachable {
        return Err(ProvisionError::Precondition(format!(
            "No network: cannot reach {}:{}",
            req.network_probe_host, req.network_probe_port
        )));
    }

    let disk_root = existing_ancestor(&ctx.config.account.home_root);
    let free = ctx.host.disk_free_bytes(disk_root)?;
    if free < req.min_disk_gb.saturating_mul(GIB) {
        return Err(ProvisionError::Precondition(format!(
            "Not enough disk space on {}: {:.1} GiB free, {} GiB required",
            disk_root.display(),
            free as f64 / GIB as f64,
            req.min_disk_gb
        )));
    }

    let memory = ctx.host.total_memory_bytes()?;
    if memory < req.min_ram_mb.saturating_mul(MIB) {
        return Err(ProvisionError::Precondition(format!(
            "Not enough memory: {} MiB installed, {} MiB required",
            memory / MIB,
            req.min_ram_mb
        )));
    }

    tracing::info!(
        "[Preflight] OK: {:.1} GiB free, {} MiB RAM, {} reachable",
        free as f64 / GIB as f64,
        memory / MIB,
        req.network_probe_host
    );
    Ok(StepOutcome::unchanged())
}

fn existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"))
}

/// Set the console keymap. Hosts without localectl only get a warning.
pub async fn keyboard_layout(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let wanted = &ctx.config.system.keyboard_layout;
    let status = ctx.host.run(&Invocation::new("localectl", ["status"])).await?;
    if !status.success() {
        let mut outcome = StepOutcome::unchanged();
        outcome.warn(format!(
            "localectl unavailable, keyboard layout not set: {}",
            status.last_line()
        ));
        return Ok(outcome);
    }

    let current = status.stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("VC Keymap:")
            .map(|v| v.trim().to_string())
    });
    if current.as_deref() == Some(wanted.as_str()) {
        tracing::debug!("[Keyboard] Keymap already {}", wanted);
        return Ok(StepOutcome::unchanged());
    }

    run_checked(
        ctx.host,
        &Invocation::new("localectl", ["set-keymap", wanted.as_str()]).as_root(),
    )
    .await?;
    Ok(StepOutcome::changed(format!("keyboard layout set to {}", wanted)))
}

/// `apt-get update`, skipped while the package lists are fresh.
pub async fn refresh_package_index(
    ctx: &ProvisionContext<'_>,
) -> Result<StepOutcome, ProvisionError> {
    let max_age = Duration::from_secs(ctx.config.system.package_index_max_age_secs);
    let age = ctx
        .host
        .stat(Path::new(APT_LISTS_DIR))
        .await?
        .and_then(|s| s.modified)
        .and_then(|m| SystemTime::now().duration_since(m).ok());
    if let Some(age) = age {
        if age < max_age {
            tracing::info!(
                "[Packages] Package index refreshed {}s ago, skipping update",
                age.as_secs()
            );
            return Ok(StepOutcome::unchanged());
        }
    }

    let update = Invocation::new("apt-get", ["update"])
        .as_root()
        .with_timeout(LONG_COMMAND_TIMEOUT);
    retry(&ctx.retry, "apt-get update", |_| run_checked(ctx.host, &update)).await?;
    Ok(StepOutcome::changed("package index refreshed"))
}

/// Upgrade installed packages when anything is upgradable.
pub async fn upgrade_packages(ctx: &ProvisionContext<'_>) -> Result<StepOutcome, ProvisionError> {
    let listing = run_checked(ctx.host, &Invocation::new("apt", ["list", "--upgradable"])).await?;
    let pending = count_upgradable(&listing.stdout);
    if pending == 0 {
        tracing::info!("[Packages] No upgradable packages");
        return Ok(StepOutcome::unchanged());
    }

    tracing::info!("[Packages] Upgrading {} packages", pending);
    let upgrade = Invocation::new("apt-get", ["-y", "upgrade"])
        .as_root()
        .with_env("DEBIAN_FRONTEND", "noninteractive")
        .with_timeout(LONG_COMMAND_TIMEOUT);
    retry(&ctx.retry, "apt-get upgrade", |_| run_checked(ctx.host, &upgrade)).await?;
    Ok(StepOutcome::changed(format!("{} packages upgraded", pending)))
}

/// Number of package lines in `apt list --upgradable` output.
pub fn count_upgradable(listing: &str) -> usize {
    listing
        .lines()
        .filter(|l| l.contains('/') && l.contains("upgradable from"))
        .count()
}

/// Install the packages of `group` that are not installed yet.
pub async fn install_package_group(
    ctx: &ProvisionContext<'_>,
    group: PackageGroup,
) -> Result<StepOutcome, ProvisionError> {
    let mut missing = Vec::new();
    for package in group.packages() {
        let query = Invocation::new("dpkg-query", ["-W", "-f=${Status}", *package]);
        let status = ctx.host.run(&query).await?;
        if !(status.success() && status.stdout.contains("install ok installed")) {
            missing.push(*package);
        }
    }

    if missing.is_empty() {
        tracing::info!("[Packages] All {} packages present", group.label());
        return Ok(StepOutcome::unchanged());
    }

    tracing::info!(
        "[Packages] Installing {} {} packages: {}",
        missing.len(),
        group.label(),
        missing.join(" ")
    );
    let mut args = vec!["install", "-y", "--no-install-recommends"];
    args.extend(missing.iter().copied());
    let install = Invocation::new("apt-get", args)
        .as_root()
        .with_env("DEBIAN_FRONTEND", "noninteractive")
        .with_timeout(LONG_COMMAND_TIMEOUT);
    retry(&ctx.retry, &format!("install {} packages", group.label()), |_| {
        run_checked(ctx.host, &install)
    })
    .await?;

    Ok(StepOutcome::changed(format!(
        "installed {}: {}",
        group.label(),
        missing.join(" ")
    )))
}
