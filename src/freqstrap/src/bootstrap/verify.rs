//! Installation verifier
//!
//! Read-only checklist over a provisioned host. It checks:
//! - the service account
//! - every managed directory (owner and mode)
//! - config.json (present, valid JSON, mode 600) and leftover placeholder credentials
//! - strategy files, virtualenv interpreter and the freqtrade CLI
//! - helper scripts and the service unit
//!
//! Nothing here mutates the host, and no check aborts the others.

use super::artifacts::{describe_drift, Sensitivity};
use super::context::CREDENTIAL_PLACEHOLDER;
use super::workflow::ProvisionContext;
use super::workflows::app::{configured_strategy, script_artifacts, strategy_artifacts};
use crate::host::{Invocation, Ownership};
use crate::provisioner::ProvisionError;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Worth attention, not counted as an issue
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        })
    }
}

/// Individual check item
#[derive(Debug, Clone)]
pub struct CheckItem {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub fix_command: Option<String>,
}

impl CheckItem {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            message: message.into(),
            fix_command: None,
        }
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            ..Self::pass(name, message)
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            ..Self::pass(name, message)
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix_command = Some(fix.into());
        self
    }
}

/// Result of a verification run
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub checks: Vec<CheckItem>,
}

impl VerificationReport {
    /// Number of failed checks. Warnings do not count.
    pub fn issue_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warning_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    pub fn passed(&self) -> bool {
        self.issue_count() == 0
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn find(&self, name: &str) -> Option<&CheckItem> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Human-readable checklist with a pass/warn/fail tally.
    pub fn render(&self) -> String {
        let mut msg = String::from(
            "\n╔════════════════════════════════════════════════════════════════╗\n\
             ║  freqstrap - Installation Verification                         ║\n\
             ╚════════════════════════════════════════════════════════════════╝\n\n",
        );

        for check in &self.checks {
            msg.push_str(&format!(
                "  [{}] {} - {}\n",
                check.status, check.name, check.message
            ));
            if check.status != CheckStatus::Pass {
                if let Some(fix) = &check.fix_command {
                    msg.push_str(&format!("         Fix: {}\n", fix));
                }
            }
        }

        msg.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        msg.push_str(&format!(
            "  {} passed, {} warnings, {} issues\n",
            self.count(CheckStatus::Pass),
            self.warning_count(),
            self.issue_count()
        ));
        if !self.passed() {
            msg.push_str("\nMost issues are fixed by running:\n\n  freqstrap repair\n");
        }
        msg.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        msg
    }
}

/// Run every check against the host.
pub async fn verify_installation(ctx: &ProvisionContext<'_>) -> VerificationReport {
    let mut checks = vec![check_account(ctx).await];

    for dir in ctx.layout.managed_dirs() {
        let name = format!("{} directory", dir.label);
        checks.push(
            check_path(ctx, &name, &dir.path, true, dir.sensitivity.dir_mode(), &ctx.ownership()).await,
        );
    }

    checks.extend(check_config(ctx).await);
    checks.push(
        check_path(
            ctx,
            "credentials file",
            &ctx.layout.credentials_file,
            false,
            Sensitivity::Secret.file_mode(),
            &ctx.ownership(),
        )
        .await,
    );

    for spec in strategy_artifacts(ctx).await {
        checks.push(check_present(ctx, &spec.name, &spec.destination).await);
    }
    let active = configured_strategy(ctx).await;
    checks.push(check_present(ctx, "active strategy", &ctx.layout.strategy_file(&active)).await);

    checks.push(
        check_command(
            ctx,
            "virtualenv python",
            &ctx.layout.venv_python(),
            "freqstrap install  (or freqstrap repair to recreate the virtualenv)",
        )
        .await,
    );
    checks.push(
        check_command(
            ctx,
            "freqtrade cli",
            &ctx.layout.freqtrade_bin(),
            "freqstrap repair",
        )
        .await,
    );

    for spec in script_artifacts(ctx) {
        checks.push(check_script(ctx, &spec.name, &spec.destination).await);
    }
    checks.extend(check_unit(ctx).await);

    let report = VerificationReport { checks };
    tracing::info!(
        "[Verify] {} checks, {} warnings, {} issues",
        report.checks.len(),
        report.warning_count(),
        report.issue_count()
    );
    report
}

async fn check_account(ctx: &ProvisionContext<'_>) -> CheckItem {
    let name = ctx.account();
    match ctx.host.lookup_account(name).await {
        Ok(Some(info)) => CheckItem::pass(
            "service account",
            format!("{} (UID {}, home {})", info.name, info.uid, info.home.display()),
        ),
        Ok(None) => CheckItem::fail("service account", format!("{} does not exist", name))
            .with_fix("freqstrap install"),
        Err(e) => lookup_failed("service account", &e),
    }
}

fn lookup_failed(name: &str, e: &ProvisionError) -> CheckItem {
    CheckItem::fail(name, format!("check could not run: {}", e))
}

async fn check_path(
    ctx: &ProvisionContext<'_>,
    name: &str,
    path: &Path,
    directory: bool,
    mode: u32,
    owner: &Ownership,
) -> CheckItem {
    let stat = match ctx.host.stat(path).await {
        Ok(Some(stat)) => stat,
        Ok(None) => {
            return CheckItem::fail(name, format!("{} is missing", path.display()))
                .with_fix("freqstrap install")
        }
        Err(e) => return lookup_failed(name, &e),
    };
    if stat.is_dir() != directory {
        return CheckItem::fail(
            name,
            format!(
                "{} is not a {}",
                path.display(),
                if directory { "directory" } else { "regular file" }
            ),
        );
    }
    match describe_drift(&stat, owner, mode) {
        None => CheckItem::pass(name, format!("{} ({}, {:o})", path.display(), owner.user, mode)),
        Some(drift) => CheckItem::fail(name, format!("{}: {}", path.display(), drift)).with_fix(
            format!("sudo chown {} {} && sudo chmod {:o} {}", owner, path.display(), mode, path.display()),
        ),
    }
}

async fn check_config(ctx: &ProvisionContext<'_>) -> Vec<CheckItem> {
    let path = &ctx.layout.config_file;
    match ctx.host.stat(path).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return vec![CheckItem::fail("config file", format!("{} is missing", path.display()))
                .with_fix("freqstrap install")]
        }
        Err(e) => return vec![lookup_failed("config file", &e)],
    }

    let access = check_path(
        ctx,
        "config file",
        path,
        false,
        Sensitivity::Secret.file_mode(),
        &ctx.ownership(),
    )
    .await;

    let content = match ctx.host.read_file(path).await {
        Ok(content) => content,
        Err(e) => return vec![access, lookup_failed("config json", &e)],
    };
    let config: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            return vec![
                access,
                CheckItem::fail("config json", format!("invalid JSON: {}", e))
                    .with_fix(format!("python3 -m json.tool {}", path.display())),
            ]
        }
    };

    let placeholders: Vec<&str> = [("exchange", "key"), ("exchange", "secret")]
        .iter()
        .filter(|(section, field)| {
            config
                .get(section)
                .and_then(|s| s.get(field))
                .and_then(serde_json::Value::as_str)
                .is_some_and(|v| v == CREDENTIAL_PLACEHOLDER)
        })
        .map(|(_, field)| *field)
        .collect();

    let credentials = if placeholders.is_empty() {
        CheckItem::pass("exchange credentials", "set")
    } else {
        CheckItem::warn(
            "exchange credentials",
            format!(
                "exchange {} still {} (fine for dry-run)",
                placeholders.join(" and "),
                CREDENTIAL_PLACEHOLDER
            ),
        )
        .with_fix(format!(
            "edit {} or {}",
            path.display(),
            ctx.layout.credentials_file.display()
        ))
    };

    vec![access, CheckItem::pass("config json", "valid JSON"), credentials]
}

async fn check_present(ctx: &ProvisionContext<'_>, name: &str, path: &Path) -> CheckItem {
    match ctx.host.stat(path).await {
        Ok(Some(stat)) if stat.is_file() => CheckItem::pass(name, path.display().to_string()),
        Ok(_) => CheckItem::fail(name, format!("{} is missing", path.display()))
            .with_fix("freqstrap install"),
        Err(e) => lookup_failed(name, &e),
    }
}

/// `<binary> --version` as the service account.
async fn check_command(ctx: &ProvisionContext<'_>, name: &str, binary: &Path, fix: &str) -> CheckItem {
    let invocation =
        Invocation::new(binary.display().to_string(), ["--version"]).as_account(ctx.account());
    match ctx.host.run(&invocation).await {
        Ok(output) if output.success() => {
            let version = output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("ok")
                .to_string();
            CheckItem::pass(name, version)
        }
        Ok(output) => CheckItem::fail(
            name,
            format!("{} --version failed: {}", binary.display(), output.last_line()),
        )
        .with_fix(fix),
        Err(e) => lookup_failed(name, &e),
    }
}

async fn check_script(ctx: &ProvisionContext<'_>, name: &str, path: &Path) -> CheckItem {
    match ctx.host.stat(path).await {
        Ok(Some(stat)) if stat.is_file() && stat.is_executable() => {
            CheckItem::pass(name, format!("{} ({:o})", path.display(), stat.mode))
        }
        Ok(Some(stat)) if stat.is_file() => {
            CheckItem::fail(name, format!("{} is not executable", path.display()))
                .with_fix(format!("sudo chmod 755 {}", path.display()))
        }
        Ok(_) => CheckItem::fail(name, format!("{} is missing", path.display()))
            .with_fix("freqstrap install"),
        Err(e) => lookup_failed(name, &e),
    }
}

async fn check_unit(ctx: &ProvisionContext<'_>) -> Vec<CheckItem> {
    let service = &ctx.config.system.service_name;
    let present = check_present(ctx, "service unit", &ctx.layout.unit_path).await;
    if present.status != CheckStatus::Pass {
        return vec![present];
    }

    let enabled = match ctx
        .host
        .run(&Invocation::new("systemctl", ["is-enabled", service.as_str()]))
        .await
    {
        Ok(output) if output.stdout.trim() == "enabled" => {
            CheckItem::pass("service enabled", format!("{} is enabled", service))
        }
        Ok(output) => CheckItem::fail(
            "service enabled",
            format!("{} is {}", service, output.stdout.trim()),
        )
        .with_fix(format!("sudo systemctl enable {}", service)),
        Err(e) => lookup_failed("service enabled", &e),
    };
    vec![present, enabled]
}
