//! The single place where commands cross a privilege boundary.

use super::{Identity, Invocation};

/// Wraps invocations so they execute under the requested identity.
///
/// `Root` becomes `sudo -- ...`, `Account(name)` becomes `sudo -u name -H -- ...`.
/// Environment variables are passed through `env K=V` after the sudo wrapper so
/// they survive sudo's environment reset.
#[derive(Debug, Clone)]
pub struct RunAs {
    sudo: String,
}

impl RunAs {
    pub fn new() -> Self {
        Self {
            sudo: "sudo".to_string(),
        }
    }

    /// Use a different sudo binary (e.g. an absolute path).
    pub fn with_sudo(sudo: impl Into<String>) -> Self {
        Self { sudo: sudo.into() }
    }

    /// Program and argument vector to spawn for `invocation`.
    pub fn wrap(&self, invocation: &Invocation) -> (String, Vec<String>) {
        let mut inner = Vec::new();
        if !invocation.env.is_empty() {
            inner.push("env".to_string());
            for (key, value) in &invocation.env {
                inner.push(format!("{}={}", key, value));
            }
        }
        inner.push(invocation.program.clone());
        inner.extend(invocation.args.iter().cloned());

        let (program, args) = match &invocation.run_as {
            Identity::Invoker => {
                let program = inner.remove(0);
                (program, inner)
            }
            Identity::Root => {
                let mut args = vec!["--".to_string()];
                args.extend(inner);
                (self.sudo.clone(), args)
            }
            Identity::Account(name) => {
                let mut args = vec![
                    "-u".to_string(),
                    name.clone(),
                    "-H".to_string(),
                    "--".to_string(),
                ];
                args.extend(inner);
                (self.sudo.clone(), args)
            }
        };

        if invocation.run_as != Identity::Invoker {
            tracing::debug!(
                "[RunAs] {}: {}",
                invocation.run_as,
                invocation.command_line()
            );
        }

        (program, args)
    }
}

impl Default for RunAs {
    fn default() -> Self {
        Self::new()
    }
}
