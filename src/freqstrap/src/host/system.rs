//! Production host: real processes, real accounts, real filesystem.
//!
//! Reads are attempted directly first and fall back to `sudo` when the invoker
//! lacks permission (e.g. files inside the 700 secrets directory). All writes
//! go through [`RunAs`] as root so ownership and mode are applied atomically by
//! `install(1)`.

use super::{
    AccountInfo, CommandOutput, Host, Invocation, Invoker, Ownership, PathKind, PathStat, RunAs,
};
use crate::provisioner::ProvisionError;
use async_trait::async_trait;
use nix::unistd::{Group, Uid, User};
use std::ffi::CString;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, UNIX_EPOCH};

pub struct SystemHost {
    run_as: RunAs,
    invoker: Invoker,
}

impl SystemHost {
    pub fn new() -> Result<Self, ProvisionError> {
        Self::with_run_as(RunAs::new())
    }

    pub fn with_run_as(run_as: RunAs) -> Result<Self, ProvisionError> {
        let uid = Uid::current();
        let name = User::from_uid(uid)
            .map_err(std::io::Error::from)?
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| uid.to_string());

        tracing::debug!("[SystemHost] Invoker: {} (UID {})", name, uid);

        Ok(Self {
            run_as,
            invoker: Invoker {
                uid: uid.as_raw(),
                name,
            },
        })
    }

    async fn run_root(&self, program: &str, args: Vec<String>) -> Result<(), ProvisionError> {
        let invocation = Invocation::new(program, args).as_root();
        super::run_checked(self, &invocation).await.map(|_| ())
    }

    fn owner_name(uid: u32) -> String {
        User::from_uid(Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_else(|| uid.to_string())
    }

    async fn stat_privileged(&self, path: &Path) -> Result<Option<PathStat>, ProvisionError> {
        let invocation = stat_invocation(path);
        let output = self.run(&invocation).await?;
        if !output.success() {
            if output.stderr.contains("No such file") {
                return Ok(None);
            }
            return Err(ProvisionError::Command {
                command: invocation.command_line(),
                exit_code: output.exit_code,
                detail: output.last_line().to_string(),
            });
        }
        parse_stat_line(output.stdout.trim()).map(Some).ok_or_else(|| {
            ProvisionError::Artifact(format!(
                "Unexpected stat output for {}: {}",
                path.display(),
                output.stdout.trim()
            ))
        })
    }
}

/// `sudo stat` for paths the invoker cannot traverse.
/// Runs in the C locale so a missing path is recognised from its English message.
pub fn stat_invocation(path: &Path) -> Invocation {
    Invocation::new(
        "stat",
        vec![
            "-c".to_string(),
            "%U|%a|%F|%Y".to_string(),
            path.display().to_string(),
        ],
    )
    .as_root()
    .with_env("LC_ALL", "C")
}

#[async_trait]
impl Host for SystemHost {
    fn invoker(&self) -> Invoker {
        self.invoker.clone()
    }

    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProvisionError> {
        let (program, args) = self.run_as.wrap(invocation);
        tracing::debug!("[SystemHost] exec: {} {}", program, args.join(" "));

        let child = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(invocation.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Ok(CommandOutput {
                    exit_code: 127,
                    stdout: String::new(),
                    stderr: format!("{}: command not found", program),
                });
            }
            Ok(Err(e)) => return Err(ProvisionError::Io(e)),
            Err(_) => {
                return Err(ProvisionError::Command {
                    command: invocation.command_line(),
                    exit_code: -1,
                    detail: format!("timed out after {}s", invocation.timeout.as_secs()),
                });
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<AccountInfo>, ProvisionError> {
        let Some(user) = User::from_name(name).map_err(std::io::Error::from)? else {
            return Ok(None);
        };

        let c_name = CString::new(name)
            .map_err(|e| ProvisionError::Config(format!("Invalid account name {:?}: {}", name, e)))?;
        let groups = nix::unistd::getgrouplist(&c_name, user.gid)
            .map_err(std::io::Error::from)?
            .into_iter()
            .filter_map(|gid| Group::from_gid(gid).ok().flatten())
            .map(|g| g.name)
            .collect();

        Ok(Some(AccountInfo {
            name: user.name,
            uid: user.uid.as_raw(),
            home: user.dir,
            groups,
        }))
    }

    async fn group_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(Group::from_name(name)
            .map_err(std::io::Error::from)?
            .is_some())
    }

    async fn stat(&self, path: &Path) -> Result<Option<PathStat>, ProvisionError> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let kind = if meta.is_dir() {
                    PathKind::Directory
                } else if meta.is_file() {
                    PathKind::File
                } else {
                    PathKind::Other
                };
                Ok(Some(PathStat {
                    kind,
                    owner: Self::owner_name(meta.uid()),
                    mode: meta.mode() & 0o7777,
                    modified: meta.modified().ok(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => self.stat_privileged(path).await,
            Err(e) => Err(ProvisionError::Io(e)),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<String, ProvisionError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let invocation =
                    Invocation::new("cat", vec![path.display().to_string()]).as_root();
                super::run_checked(self, &invocation)
                    .await
                    .map(|output| output.stdout)
            }
            Err(e) => Err(ProvisionError::Io(e)),
        }
    }

    async fn write_file(
        &self,
        path: &Path,
        contents: &str,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        // NamedTempFile is created 0600, so the staged copy is private to the invoker.
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(contents.as_bytes())?;
        staged.flush()?;

        self.run_root(
            "install",
            vec![
                "-o".to_string(),
                owner.user.clone(),
                "-g".to_string(),
                owner.group.clone(),
                "-m".to_string(),
                format!("{:04o}", mode),
                staged.path().display().to_string(),
                path.display().to_string(),
            ],
        )
        .await
    }

    async fn create_dir(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        self.run_root(
            "install",
            vec![
                "-d".to_string(),
                "-o".to_string(),
                owner.user.clone(),
                "-g".to_string(),
                owner.group.clone(),
                "-m".to_string(),
                format!("{:04o}", mode),
                path.display().to_string(),
            ],
        )
        .await
    }

    async fn set_permissions(
        &self,
        path: &Path,
        owner: &Ownership,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        let target = path.display().to_string();
        self.run_root("chown", vec![owner.to_string(), target.clone()])
            .await?;
        self.run_root("chmod", vec![format!("{:04o}", mode), target])
            .await
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), ProvisionError> {
        if path.parent().is_none() || path.components().count() < 3 {
            return Err(ProvisionError::Artifact(format!(
                "Refusing to remove shallow path {}",
                path.display()
            )));
        }
        self.run_root(
            "rm",
            vec![
                "-rf".to_string(),
                "--".to_string(),
                path.display().to_string(),
            ],
        )
        .await
    }

    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("[SystemHost] TCP probe {}:{} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                tracing::debug!("[SystemHost] TCP probe {}:{} timed out", host, port);
                false
            }
        }
    }

    fn disk_free_bytes(&self, path: &Path) -> Result<u64, ProvisionError> {
        let stats = nix::sys::statvfs::statvfs(path).map_err(std::io::Error::from)?;
        Ok(stats.blocks_available() as u64 * stats.fragment_size() as u64)
    }

    fn total_memory_bytes(&self) -> Result<u64, ProvisionError> {
        let meminfo = std::fs::read_to_string("/proc/meminfo")?;
        parse_meminfo_total(&meminfo).ok_or_else(|| {
            ProvisionError::Precondition("Cannot read MemTotal from /proc/meminfo".to_string())
        })
    }
}

/// Parse `MemTotal:` from `/proc/meminfo` content, in bytes.
pub fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Parse one line of `stat -c '%U|%a|%F|%Y'`.
pub fn parse_stat_line(line: &str) -> Option<PathStat> {
    let mut fields = line.split('|');
    let owner = fields.next()?.to_string();
    let mode = u32::from_str_radix(fields.next()?, 8).ok()?;
    let kind = match fields.next()? {
        "directory" => PathKind::Directory,
        kind if kind.starts_with("regular") => PathKind::File,
        _ => PathKind::Other,
    };
    let modified = fields
        .next()
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

    Some(PathStat {
        kind,
        owner,
        mode,
        modified,
    })
}
