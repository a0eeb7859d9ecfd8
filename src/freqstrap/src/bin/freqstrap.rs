//! freqstrap binary. Provisions, repairs and verifies a Freqtrade host.

use clap::{Parser, Subcommand};
use freqstrap::bootstrap::{
    run_menu, workflows, HostProvisioner, Profile, ProfileSettings, ProvisionConfig,
};
use freqstrap::logging::init_logging;
use freqstrap::{LogProgressReporter, ProgressReporter, ProvisionError, SystemHost};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "freqstrap",
    version,
    about = "Idempotent provisioning of an Ubuntu host for the Freqtrade trading bot"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ./freqstrap.toml, then the user and system config dirs)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service account name
    #[arg(long, global = true)]
    account: Option<String>,

    /// Directory for the run log
    #[arg(long = "log-dir", global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the host
    Install {
        #[arg(long, value_enum, default_value_t = Profile::Full)]
        profile: Profile,
    },
    /// Re-apply ownership and modes, rebuild a broken virtualenv, then verify
    Repair,
    /// Check the installation without changing anything
    Verify,
    /// Interactive menu
    Menu {
        #[arg(long, value_enum, default_value_t = Profile::Full)]
        profile: Profile,
    },
    /// List the steps a profile would run
    Plan {
        #[arg(long, value_enum, default_value_t = Profile::Full)]
        profile: Profile,
    },
}

impl Command {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Install { .. } | Command::Repair | Command::Menu { .. }
        )
    }

    fn profile(&self) -> Profile {
        match self {
            Command::Install { profile } | Command::Menu { profile } | Command::Plan { profile } => {
                *profile
            }
            Command::Repair | Command::Verify => Profile::Repair,
        }
    }
}

/// Log reporter that remembers the step in progress for the interrupt message.
struct TrackingReporter {
    inner: LogProgressReporter,
    current: Mutex<String>,
}

impl TrackingReporter {
    fn new(profile: Profile) -> Self {
        Self {
            inner: LogProgressReporter::with_profile(profile.name()),
            current: Mutex::new("startup".to_string()),
        }
    }

    fn current(&self) -> String {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|_| "unknown step".to_string())
    }
}

impl ProgressReporter for TrackingReporter {
    fn emit(&self, percentage: u32, message: String) {
        self.emit_detailed(percentage, message, None, None);
    }

    fn emit_detailed(
        &self,
        percentage: u32,
        message: String,
        profile: Option<String>,
        step_name: Option<String>,
    ) {
        if let Ok(mut current) = self.current.lock() {
            current.clone_from(&message);
        }
        self.inner
            .emit_detailed(percentage, message, profile, step_name);
    }
}

fn main() {
    let args = Args::parse();
    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> anyhow::Result<i32> {
    // Refuse root before the log file or anything else is created
    if args.command.mutates() && nix::unistd::Uid::effective().is_root() {
        eprintln!("╔════════════════════════════════════════════════════════════════╗");
        eprintln!("║  freqstrap must not be run as root                             ║");
        eprintln!("╚════════════════════════════════════════════════════════════════╝");
        eprintln!("  Run it as a regular user with sudo rights; it asks for sudo itself.");
        return Ok(1);
    }

    let mut config = ProvisionConfig::load(args.config.as_deref())?;
    if let Some(account) = &args.account {
        config = config.with_account_name(account.clone());
        config.validate()?;
    }
    if let Some(dir) = &args.log_dir {
        config = config.with_log_dir(dir.clone());
    }

    if let Command::Plan { profile } = &args.command {
        print_plan(&config, *profile);
        return Ok(0);
    }

    let log_path = init_logging(&config.logging.dir, config.logging.retention_days)?;

    let host = Arc::new(SystemHost::new()?);
    let provisioner = HostProvisioner::new(config, host)?;
    let reporter = TrackingReporter::new(args.command.profile());

    let rt = build_runtime()?;

    let code = rt.block_on(async {
        tokio::select! {
            code = execute(&args.command, &provisioner, &reporter, &log_path) => code,
            _ = tokio::signal::ctrl_c() => {
                let err = ProvisionError::Interrupted(reporter.current());
                tracing::error!("{}", err);
                eprintln!("\n{}. Log: {}", err, log_path.display());
                1
            }
        }
    });
    shut_down(rt);

    Ok(code)
}

fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// How long blocking-pool work may outlive the command. A `menu` stdin read
/// never returns on its own after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn shut_down(rt: tokio::runtime::Runtime) {
    rt.shutdown_timeout(SHUTDOWN_GRACE);
}

fn print_plan(config: &ProvisionConfig, profile: Profile) {
    let settings = ProfileSettings::resolve(profile, config);
    println!("Profile {}:", profile);
    for (index, step) in workflows::plan(&settings).iter().enumerate() {
        println!("  {:>2}. {:<24} ({})", index + 1, step.display_name(), step.task_id());
    }
}

async fn execute(
    command: &Command,
    provisioner: &HostProvisioner,
    reporter: &TrackingReporter,
    log_path: &Path,
) -> i32 {
    match command {
        Command::Install { .. } | Command::Repair => {
            let profile = command.profile();
            match provisioner.run(profile, reporter).await {
                Ok(summary) => {
                    if let Some(report) = summary.verification() {
                        println!("{}", report.render());
                    }
                    for warning in summary.warnings() {
                        println!("  warning: {}", warning);
                    }
                    println!(
                        "Profile {} complete: {} changes. Log: {}",
                        profile,
                        summary.changes().len(),
                        log_path.display()
                    );
                    0
                }
                Err(e) => {
                    tracing::error!("Provisioning aborted: {}", e);
                    eprintln!("\nProvisioning aborted: {}\nLog: {}", e, log_path.display());
                    1
                }
            }
        }
        Command::Verify => {
            let report = provisioner.verify().await;
            println!("{}", report.render());
            if report.passed() {
                0
            } else {
                1
            }
        }
        Command::Menu { profile } => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            match run_menu(provisioner, *profile, stdin, &mut stdout, reporter).await {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!("Menu aborted: {}", e);
                    eprintln!("\n{}\nLog: {}", e, log_path.display());
                    1
                }
            }
        }
        Command::Plan { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_shutdown_does_not_wait_for_blocked_stdin() {
        let rt = build_runtime().unwrap();
        let code = rt.block_on(async {
            tokio::select! {
                _ = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30))) => 0,
                _ = tokio::time::sleep(Duration::from_millis(10)) => 1,
            }
        });
        assert_eq!(code, 1);

        let start = Instant::now();
        shut_down(rt);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
