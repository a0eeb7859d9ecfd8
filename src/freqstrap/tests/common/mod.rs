//! In-memory host for pipeline tests.
//!
//! Simulates just enough of an Ubuntu machine (files with owner and mode,
//! accounts, apt, pyenv, pip, systemctl) for the provisioning steps to run
//! end to end without root or a real filesystem.

#![allow(dead_code)]

use async_trait::async_trait;
use freqstrap::bootstrap::{HostProvisioner, ProvisionConfig, RetryPolicy};
use freqstrap::host::{
    AccountInfo, CommandOutput, Host, Identity, Invocation, Invoker, Ownership, PathKind,
    PathStat,
};
use freqstrap::{ProgressReporter, ProvisionError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FakeEntry {
    pub kind: PathKind,
    pub owner: String,
    pub group: String,
    pub mode: u32,
    pub content: String,
    pub modified: SystemTime,
}

#[derive(Debug)]
pub struct FakeState {
    pub entries: BTreeMap<PathBuf, FakeEntry>,
    pub accounts: BTreeMap<String, AccountInfo>,
    pub groups: BTreeSet<String>,
    pub packages: BTreeSet<String>,
    pub upgradable: usize,
    /// `None` means localectl is not installed
    pub keymap: Option<String>,
    pub enabled_units: BTreeSet<String>,
    /// Binaries whose `--version` fails
    pub broken: BTreeSet<PathBuf>,
    pub commands: Vec<String>,
    pub mutations: Vec<String>,
    failures: Vec<(String, u32)>,
    pub sudo_ok: bool,
    pub network_ok: bool,
    pub disk_free: u64,
    pub memory: u64,
}

pub struct FakeHost {
    invoker: Invoker,
    state: Mutex<FakeState>,
}

impl FakeHost {
    /// Fresh Ubuntu-like host, invoked by a regular sudo user.
    pub fn new() -> Self {
        Self::with_invoker(1000, "admin")
    }

    /// Host invoked by the superuser.
    pub fn as_root() -> Self {
        Self::with_invoker(0, "root")
    }

    fn with_invoker(uid: u32, name: &str) -> Self {
        let long_ago = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
        let mut state = FakeState {
            entries: BTreeMap::new(),
            accounts: BTreeMap::new(),
            groups: ["sudo", "adm", "users"].iter().map(|g| g.to_string()).collect(),
            packages: ["ca-certificates", "curl"].iter().map(|p| p.to_string()).collect(),
            upgradable: 2,
            keymap: Some("gb".to_string()),
            enabled_units: BTreeSet::new(),
            broken: BTreeSet::new(),
            commands: Vec::new(),
            mutations: Vec::new(),
            failures: Vec::new(),
            sudo_ok: true,
            network_ok: true,
            disk_free: 50 * GIB,
            memory: 4 * GIB,
        };
        for dir in ["/", "/home", "/etc", "/etc/systemd", "/etc/systemd/system", "/usr", "/usr/bin", "/var/lib/apt/lists"] {
            state.entries.insert(PathBuf::from(dir), entry(PathKind::Directory, "root", 0o755, long_ago));
        }
        state.entries.insert(
            PathBuf::from("/usr/bin/python3"),
            entry(PathKind::File, "root", 0o755, long_ago),
        );
        Self {
            invoker: Invoker {
                uid,
                name: name.to_string(),
            },
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Make the next `times` commands containing `pattern` exit 1.
    pub fn fail_next(&self, pattern: &str, times: u32) {
        self.state().failures.push((pattern.to_string(), times));
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state().mutations.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.commands.clear();
        state.mutations.clear();
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.commands().iter().any(|c| c.contains(fragment))
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<FakeEntry> {
        self.state().entries.get(path.as_ref()).cloned()
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.entry(path).map(|e| e.mode)
    }

    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.entry(path).map(|e| e.content)
    }

    /// Change a file behind the provisioner's back.
    pub fn set_content(&self, path: impl AsRef<Path>, content: &str) {
        if let Some(e) = self.state().entries.get_mut(path.as_ref()) {
            e.content = content.to_string();
        }
    }

    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) {
        if let Some(e) = self.state().entries.get_mut(path.as_ref()) {
            e.mode = mode;
        }
    }

    pub fn break_binary(&self, path: impl AsRef<Path>) {
        self.state().broken.insert(path.as_ref().to_path_buf());
    }

    pub fn remove_account(&self, name: &str) {
        self.state().accounts.remove(name);
    }
}

fn entry(kind: PathKind, owner: &str, mode: u32, modified: SystemTime) -> FakeEntry {
    FakeEntry {
        kind,
        owner: owner.to_string(),
        group: owner.to_string(),
        mode,
        content: String::new(),
        modified,
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

impl FakeState {
    fn ensure_ancestors(&mut self, path: &Path, owner: &str) {
        let mut missing: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .take_while(|p| !self.entries.contains_key(*p))
            .map(Path::to_path_buf)
            .collect();
        missing.reverse();
        for dir in missing {
            self.entries
                .insert(dir, entry(PathKind::Directory, owner, 0o755, SystemTime::now()));
        }
    }

    fn touch(&mut self, path: &Path, owner: &str, mode: u32) {
        self.ensure_ancestors(path, owner);
        self.entries
            .insert(path.to_path_buf(), entry(PathKind::File, owner, mode, SystemTime::now()));
        self.mutations.push(format!("touch {}", path.display()));
    }

    fn mkdir(&mut self, path: &Path, owner: &str, mode: u32) {
        self.ensure_ancestors(path, owner);
        self.entries
            .insert(path.to_path_buf(), entry(PathKind::Directory, owner, mode, SystemTime::now()));
        self.mutations.push(format!("mkdir {}", path.display()));
    }

    fn is_file(&self, path: &Path) -> bool {
        self.entries
            .get(path)
            .is_some_and(|e| e.kind == PathKind::File)
    }

    fn take_failure(&mut self, command_line: &str) -> bool {
        for (pattern, remaining) in self.failures.iter_mut() {
            if *remaining > 0 && command_line.contains(pattern.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }

    fn exec(&mut self, inv: &Invocation) -> CommandOutput {
        let owner = match &inv.run_as {
            Identity::Account(name) => name.clone(),
            _ => "root".to_string(),
        };
        let args: Vec<&str> = inv.args.iter().map(String::as_str).collect();
        let program = inv.program.as_str();

        match (program, args.as_slice()) {
            ("sudo", _) => {
                if self.sudo_ok {
                    ok("")
                } else {
                    fail(1, "sudo: a password is required")
                }
            }
            ("localectl", ["status"]) => match &self.keymap {
                Some(keymap) => ok(format!(
                    "   System Locale: LANG=C.UTF-8\n       VC Keymap: {}\n      X11 Layout: us\n",
                    keymap
                )),
                None => fail(127, "localectl: command not found"),
            },
            ("localectl", ["set-keymap", keymap]) => {
                self.keymap = Some(keymap.to_string());
                self.mutations.push(format!("keymap {}", keymap));
                ok("")
            }
            ("apt-get", ["update"]) => {
                if let Some(lists) = self.entries.get_mut(Path::new("/var/lib/apt/lists")) {
                    lists.modified = SystemTime::now();
                }
                self.mutations.push("apt-get update".to_string());
                ok("Reading package lists... Done\n")
            }
            ("apt-get", ["-y", "upgrade"]) => {
                self.upgradable = 0;
                self.mutations.push("apt-get upgrade".to_string());
                ok("")
            }
            ("apt-get", ["install", rest @ ..]) => {
                for package in rest.iter().filter(|a| !a.starts_with('-')) {
                    self.packages.insert(package.to_string());
                    if *package == "docker.io" {
                        self.groups.insert("docker".to_string());
                    }
                }
                self.mutations.push(format!("apt-get install {}", rest.join(" ")));
                ok("")
            }
            ("apt", ["list", "--upgradable"]) => {
                let mut out = String::from("Listing... Done\n");
                for i in 0..self.upgradable {
                    out.push_str(&format!(
                        "pkg{}/jammy-updates 1.1 amd64 [upgradable from: 1.0]\n",
                        i
                    ));
                }
                ok(out)
            }
            ("dpkg-query", [.., package]) => {
                if self.packages.contains(*package) {
                    ok("install ok installed")
                } else {
                    fail(1, format!("dpkg-query: no packages found matching {}", package))
                }
            }
            ("useradd", [.., name]) => {
                let home = args
                    .iter()
                    .position(|a| *a == "--home-dir")
                    .and_then(|i| args.get(i + 1))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/home").join(name));
                let groups: Vec<String> = args
                    .iter()
                    .position(|a| *a == "--groups")
                    .and_then(|i| args.get(i + 1))
                    .map(|g| g.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                let uid = 1001 + self.accounts.len() as u32;
                self.accounts.insert(
                    name.to_string(),
                    AccountInfo {
                        name: name.to_string(),
                        uid,
                        home: home.clone(),
                        groups,
                    },
                );
                self.mkdir(&home, name, 0o750);
                self.mutations.push(format!("useradd {}", name));
                ok("")
            }
            ("usermod", ["-aG", groups, name]) => match self.accounts.get_mut(*name) {
                Some(account) => {
                    for group in groups.split(',') {
                        if !account.groups.iter().any(|g| g == group) {
                            account.groups.push(group.to_string());
                        }
                    }
                    self.mutations.push(format!("usermod {} {}", name, groups));
                    ok("")
                }
                None => fail(6, format!("usermod: user '{}' does not exist", name)),
            },
            ("git", ["clone", .., dest]) => {
                let root = PathBuf::from(dest);
                if self.entries.contains_key(&root) {
                    return fail(128, "fatal: destination path already exists");
                }
                self.mkdir(&root, &owner, 0o755);
                self.touch(&root.join("bin").join("pyenv"), &owner, 0o755);
                ok("")
            }
            (p, ["install", "--skip-existing", version]) if p.ends_with("/pyenv") => {
                let root = Path::new(p).parent().and_then(Path::parent);
                match root {
                    Some(root) => {
                        let python = root.join("versions").join(version).join("bin").join("python");
                        self.touch(&python, &owner, 0o755);
                        ok("")
                    }
                    None => fail(1, "pyenv: bad root"),
                }
            }
            (p, ["--version"]) if p.ends_with("/python") || p.ends_with("/python3") => {
                let path = Path::new(p);
                if !self.is_file(path) {
                    fail(127, format!("{}: No such file or directory", p))
                } else if self.broken.contains(path) {
                    fail(1, "error while loading shared libraries: libpython3.11.so")
                } else {
                    ok("Python 3.11.9\n")
                }
            }
            (p, ["-m", "venv", dir]) if p.ends_with("/python") || p.ends_with("/python3") => {
                if !self.is_file(Path::new(p)) {
                    return fail(127, format!("{}: No such file or directory", p));
                }
                let bin = Path::new(dir).join("bin");
                for name in ["python", "pip"] {
                    let path = bin.join(name);
                    self.broken.remove(&path);
                    self.touch(&path, &owner, 0o755);
                }
                ok("")
            }
            (p, ["install", rest @ ..]) if p.ends_with("/pip") => {
                if !self.is_file(Path::new(p)) {
                    return fail(127, format!("{}: No such file or directory", p));
                }
                if rest.iter().any(|a| a.starts_with("freqtrade")) {
                    if let Some(bin) = Path::new(p).parent() {
                        let freqtrade = bin.join("freqtrade");
                        self.broken.remove(&freqtrade);
                        self.touch(&freqtrade, &owner, 0o755);
                    }
                }
                self.mutations.push(format!("pip install {}", rest.join(" ")));
                ok("")
            }
            (p, ["--version"]) if p.ends_with("/freqtrade") => {
                let path = Path::new(p);
                if !self.is_file(path) {
                    fail(127, format!("{}: No such file or directory", p))
                } else if self.broken.contains(path) {
                    fail(1, "ModuleNotFoundError: No module named 'freqtrade'")
                } else {
                    ok("freqtrade 2024.10\n")
                }
            }
            ("systemctl", ["daemon-reload"]) => {
                self.mutations.push("systemctl daemon-reload".to_string());
                ok("")
            }
            ("systemctl", ["is-enabled", unit]) => {
                if self.enabled_units.contains(*unit) {
                    ok("enabled\n")
                } else {
                    CommandOutput {
                        exit_code: 1,
                        stdout: "disabled\n".to_string(),
                        stderr: String::new(),
                    }
                }
            }
            ("systemctl", ["enable", unit]) => {
                self.enabled_units.insert(unit.to_string());
                self.mutations.push(format!("systemctl enable {}", unit));
                ok("")
            }
            _ => fail(127, format!("{}: command not found", program)),
        }
    }
}

#[async_trait]
impl Host for FakeHost {
    fn invoker(&self) -> Invoker {
        self.invoker.clone()
    }

    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProvisionError> {
        let mut state = self.state();
        let line = invocation.command_line();
        state.commands.push(format!("{}: {}", invocation.run_as, line));
        if state.take_failure(&line) {
            return Ok(fail(1, format!("injected failure: {}", line)));
        }
        Ok(state.exec(invocation))
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<AccountInfo>, ProvisionError> {
        Ok(self.state().accounts.get(name).cloned())
    }

    async fn group_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(self.state().groups.contains(name))
    }

    async fn stat(&self, path: &Path) -> Result<Option<PathStat>, ProvisionError> {
        Ok(self.state().entries.get(path).map(|e| PathStat {
            kind: e.kind,
            owner: e.owner.clone(),
            mode: e.mode,
            modified: Some(e.modified),
        }))
    }

    async fn read_file(&self, path: &Path) -> Result<String, ProvisionError> {
        match self.state().entries.get(path) {
            Some(e) if e.kind == PathKind::File => Ok(e.content.clone()),
            _ => Err(ProvisionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
        }
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        let mut state = self.state();
        let parent_is_dir = path
            .parent()
            .and_then(|p| state.entries.get(p))
            .is_some_and(|e| e.kind == PathKind::Directory);
        if !parent_is_dir {
            return Err(ProvisionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("parent of {} missing", path.display()),
            )));
        }
        state.entries.insert(
            path.to_path_buf(),
            FakeEntry {
                kind: PathKind::File,
                owner: owner.user.clone(),
                group: owner.group.clone(),
                mode,
                content: contents.to_string(),
                modified: SystemTime::now(),
            },
        );
        state.mutations.push(format!("write {}", path.display()));
        Ok(())
    }

    async fn create_dir(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        let mut state = self.state();
        state.ensure_ancestors(path, "root");
        state.entries.insert(
            path.to_path_buf(),
            FakeEntry {
                kind: PathKind::Directory,
                owner: owner.user.clone(),
                group: owner.group.clone(),
                mode,
                content: String::new(),
                modified: SystemTime::now(),
            },
        );
        state.mutations.push(format!("mkdir {}", path.display()));
        Ok(())
    }

    async fn set_permissions(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        let mut state = self.state();
        let Some(e) = state.entries.get_mut(path) else {
            return Err(ProvisionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )));
        };
        e.owner = owner.user.clone();
        e.group = owner.group.clone();
        e.mode = mode;
        state
            .mutations
            .push(format!("chmod {:o} {}", mode, path.display()));
        Ok(())
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), ProvisionError> {
        let mut state = self.state();
        state.entries.retain(|p, _| !p.starts_with(path));
        state.mutations.push(format!("rm -rf {}", path.display()));
        Ok(())
    }

    async fn probe_tcp(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.state().network_ok
    }

    fn disk_free_bytes(&self, _path: &Path) -> Result<u64, ProvisionError> {
        Ok(self.state().disk_free)
    }

    fn total_memory_bytes(&self) -> Result<u64, ProvisionError> {
        Ok(self.state().memory)
    }
}

/// Reporter that keeps every progress message.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<(u32, String)>>,
}

impl ProgressReporter for RecordingReporter {
    fn emit(&self, percentage: u32, message: String) {
        self.messages.lock().unwrap().push((percentage, message));
    }
}

/// Provisioner over `host` with default config and no retry delay.
pub fn provisioner(host: &Arc<FakeHost>) -> HostProvisioner {
    provisioner_with(host, ProvisionConfig::default())
}

pub fn provisioner_with(host: &Arc<FakeHost>, config: ProvisionConfig) -> HostProvisioner {
    let host: Arc<dyn Host> = host.clone();
    HostProvisioner::new(config, host)
        .unwrap()
        .with_retry(RetryPolicy::new(3, Duration::ZERO))
}
