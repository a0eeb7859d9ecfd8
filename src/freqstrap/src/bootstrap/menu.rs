//! Interactive menu over the same steps the pipelines run.

use super::profile::{Profile, ProfileSettings};
use super::provisioner::HostProvisioner;
use super::tasks::ProvisionStep;
use super::workflows;
use crate::provisioner::{ProgressReporter, ProvisionError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    SystemPackages,
    AccountAndDirectories,
    PythonEnvironment,
    InstallFreqtrade,
    ConfigAndStrategy,
    ScriptsAndService,
    Verify,
    RunAll,
    Quit,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 8] = [
        MenuChoice::SystemPackages,
        MenuChoice::AccountAndDirectories,
        MenuChoice::PythonEnvironment,
        MenuChoice::InstallFreqtrade,
        MenuChoice::ConfigAndStrategy,
        MenuChoice::ScriptsAndService,
        MenuChoice::Verify,
        MenuChoice::RunAll,
    ];

    /// `1`-`8` select an action, `0`, `q` or `quit` leave. Anything else is `None`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "1" => Some(MenuChoice::SystemPackages),
            "2" => Some(MenuChoice::AccountAndDirectories),
            "3" => Some(MenuChoice::PythonEnvironment),
            "4" => Some(MenuChoice::InstallFreqtrade),
            "5" => Some(MenuChoice::ConfigAndStrategy),
            "6" => Some(MenuChoice::ScriptsAndService),
            "7" => Some(MenuChoice::Verify),
            "8" => Some(MenuChoice::RunAll),
            "0" | "q" | "quit" => Some(MenuChoice::Quit),
            _ => None,
        }
    }

    pub fn key(&self) -> char {
        match self {
            MenuChoice::SystemPackages => '1',
            MenuChoice::AccountAndDirectories => '2',
            MenuChoice::PythonEnvironment => '3',
            MenuChoice::InstallFreqtrade => '4',
            MenuChoice::ConfigAndStrategy => '5',
            MenuChoice::ScriptsAndService => '6',
            MenuChoice::Verify => '7',
            MenuChoice::RunAll => '8',
            MenuChoice::Quit => '0',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::SystemPackages => "System packages",
            MenuChoice::AccountAndDirectories => "Service account and directories",
            MenuChoice::PythonEnvironment => "Python runtime and virtualenv",
            MenuChoice::InstallFreqtrade => "Install Freqtrade",
            MenuChoice::ConfigAndStrategy => "Configuration and strategy",
            MenuChoice::ScriptsAndService => "Helper scripts and service unit",
            MenuChoice::Verify => "Verify installation",
            MenuChoice::RunAll => "Run all",
            MenuChoice::Quit => "Quit",
        }
    }

    /// Steps for this choice. Mutating choices start with preflight.
    pub fn steps(&self, settings: &ProfileSettings) -> Vec<ProvisionStep> {
        let body = match self {
            MenuChoice::SystemPackages => workflows::system_steps(settings),
            MenuChoice::AccountAndDirectories => {
                vec![ProvisionStep::ServiceAccount, ProvisionStep::DirectoryTree]
            }
            MenuChoice::PythonEnvironment => {
                vec![ProvisionStep::PythonRuntime, ProvisionStep::VirtualEnv]
            }
            MenuChoice::InstallFreqtrade => vec![ProvisionStep::FreqtradeInstall],
            MenuChoice::ConfigAndStrategy => {
                vec![ProvisionStep::Configuration, ProvisionStep::Strategy]
            }
            MenuChoice::ScriptsAndService => {
                vec![ProvisionStep::HelperScripts, ProvisionStep::ServiceUnit]
            }
            MenuChoice::Verify => vec![ProvisionStep::Verify],
            MenuChoice::RunAll => return workflows::plan(settings),
            MenuChoice::Quit => return Vec::new(),
        };

        if body.iter().any(ProvisionStep::is_mutating) {
            let mut steps = vec![ProvisionStep::Preflight];
            steps.extend(body);
            steps
        } else {
            body
        }
    }
}

/// Menu text shown before every prompt.
pub fn render_menu(profile: Profile) -> String {
    let mut text = format!("\nfreqstrap ({} profile)\n\n", profile);
    for choice in MenuChoice::ALL {
        text.push_str(&format!("  {}) {}\n", choice.key(), choice.label()));
    }
    text.push_str("  0) Quit\n\nChoice: ");
    text
}

/// Prompt until the operator quits or input ends.
///
/// A failed step returns to the menu. A precondition failure ends the menu with
/// that error, since no other choice can succeed either.
pub async fn run_menu<R, W>(
    provisioner: &HostProvisioner,
    profile: Profile,
    input: R,
    output: &mut W,
    reporter: &dyn ProgressReporter,
) -> Result<(), ProvisionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let settings = provisioner.settings(profile);
    let mut lines = input.lines();

    loop {
        output.write_all(render_menu(profile).as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            tracing::info!("[Menu] Input closed, leaving menu");
            return Ok(());
        };

        let Some(choice) = MenuChoice::parse(&line) else {
            output
                .write_all(format!("Invalid choice '{}', enter 0-8.\n", line.trim()).as_bytes())
                .await?;
            continue;
        };

        if choice == MenuChoice::Quit {
            tracing::info!("[Menu] Quit");
            return Ok(());
        }

        tracing::info!("[Menu] Selected {}) {}", choice.key(), choice.label());
        let steps = choice.steps(&settings);
        match provisioner.run_steps(profile, &steps, reporter).await {
            Ok(summary) => {
                if let Some(report) = summary.verification() {
                    output.write_all(report.render().as_bytes()).await?;
                }
                let result = if summary.is_unchanged() {
                    "nothing to do".to_string()
                } else {
                    format!("done ({} changes)", summary.changes().len())
                };
                let text = match summary.verification() {
                    Some(report) if !report.passed() => format!(
                        "{}: {}, {} issues found.\n",
                        choice.label(),
                        result,
                        report.issue_count()
                    ),
                    Some(_) if summary.is_unchanged() => {
                        format!("{}: all checks passed.\n", choice.label())
                    }
                    _ => format!("{}: {}.\n", choice.label(), result),
                };
                output.write_all(text.as_bytes()).await?;
                for warning in summary.warnings() {
                    output
                        .write_all(format!("  warning: {}\n", warning).as_bytes())
                        .await?;
                }
            }
            Err(e) if e.is_precondition() => return Err(e),
            Err(e) => {
                output
                    .write_all(format!("{} failed: {}\n", choice.label(), e).as_bytes())
                    .await?;
            }
        }
    }
}
