//! Host abstraction
//!
//! Provisioning steps never touch the machine directly. Every command, account
//! lookup and file operation goes through [`Host`], so the same step code runs
//! against the real system ([`SystemHost`]) or a simulated one in tests.

pub mod run_as;
pub mod system;

pub use run_as::RunAs;
pub use system::SystemHost;

use crate::provisioner::ProvisionError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default timeout for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for package-manager, pip and pyenv builds.
pub const LONG_COMMAND_TIMEOUT: Duration = Duration::from_secs(1800);

/// Identity a command runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The user who launched freqstrap.
    Invoker,
    /// Superuser, reached through sudo.
    Root,
    /// A named account, reached through `sudo -u`.
    Account(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Invoker => write!(f, "invoker"),
            Identity::Root => write!(f, "root"),
            Identity::Account(name) => write!(f, "{}", name),
        }
    }
}

/// A command to run on the host.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub run_as: Identity,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            run_as: Identity::Invoker,
            env: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn as_root(mut self) -> Self {
        self.run_as = Identity::Root;
        self
    }

    pub fn as_account(mut self, account: impl Into<String>) -> Self {
        self.run_as = Identity::Account(account.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line as it would be typed, without the run-as wrapper.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_line(&self) -> &str {
        fn last(text: &str) -> Option<&str> {
            text.lines().rev().find(|l| !l.trim().is_empty())
        }
        last(&self.stderr)
            .or_else(|| last(&self.stdout))
            .unwrap_or("No output available")
    }
}

/// Owner and group for a managed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    /// User with its primary group of the same name.
    pub fn account(name: &str) -> Self {
        Self::new(name, name)
    }

    pub fn root() -> Self {
        Self::new("root", "root")
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}

/// Operating-system account as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub uid: u32,
    pub home: PathBuf,
    pub groups: Vec<String>,
}

/// User running freqstrap.
#[derive(Debug, Clone)]
pub struct Invoker {
    pub uid: u32,
    pub name: String,
}

impl Invoker {
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
    Other,
}

/// Metadata of an existing path.
#[derive(Debug, Clone)]
pub struct PathStat {
    pub kind: PathKind,
    pub owner: String,
    /// Permission bits only (`0o7777` mask).
    pub mode: u32,
    pub modified: Option<SystemTime>,
}

impl PathStat {
    pub fn is_dir(&self) -> bool {
        self.kind == PathKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == PathKind::File
    }

    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

/// The machine being provisioned.
#[async_trait]
pub trait Host: Send + Sync {
    /// Identity of the user running freqstrap.
    fn invoker(&self) -> Invoker;

    /// Run a command to completion. A non-zero exit is reported in the output, not as an error.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProvisionError>;

    async fn lookup_account(&self, name: &str) -> Result<Option<AccountInfo>, ProvisionError>;

    async fn group_exists(&self, name: &str) -> Result<bool, ProvisionError>;

    async fn stat(&self, path: &Path) -> Result<Option<PathStat>, ProvisionError>;

    async fn read_file(&self, path: &Path) -> Result<String, ProvisionError>;

    /// Write a file with the given owner and mode. The file is never world-readable in between.
    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError>;

    async fn create_dir(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError>;

    async fn set_permissions(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError>;

    async fn remove_tree(&self, path: &Path) -> Result<(), ProvisionError>;

    /// Whether a TCP connection to `host:port` opens within `timeout`.
    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> bool;

    fn disk_free_bytes(&self, path: &Path) -> Result<u64, ProvisionError>;

    fn total_memory_bytes(&self) -> Result<u64, ProvisionError>;
}

/// Run a command and turn a non-zero exit into [`ProvisionError::Command`].
pub async fn run_checked(
    host: &dyn Host,
    invocation: &Invocation,
) -> Result<CommandOutput, ProvisionError> {
    let output = host.run(invocation).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(ProvisionError::Command {
            command: invocation.command_line(),
            exit_code: output.exit_code,
            detail: output.last_line().to_string(),
        })
    }
}
