//! Templated artifact writer.
//!
//! An artifact is rendered and written only when its destination is missing.
//! Existing files are never rewritten: a customized config or strategy
//! survives every re-run. Ownership and mode drift on existing files is
//! reported, and fixed only when the writer runs in repair mode.

use super::template_renderer::TemplateRenderer;
use crate::host::{Host, Ownership, PathStat};
use crate::provisioner::ProvisionError;
use std::path::{Path, PathBuf};
use tera::Context;

/// Class name of the FreqAI starter strategy template.
pub const FREQAI_STRATEGY_NAME: &str = "FreqaiStarterStrategy";

/// Sensitivity class deciding file and directory modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Credentials: 600 files, 700 directories
    Secret,
    /// Helper scripts: 755
    Script,
    /// Everything else: 644 files, 755 directories
    General,
}

impl Sensitivity {
    pub fn file_mode(&self) -> u32 {
        match self {
            Sensitivity::Secret => 0o600,
            Sensitivity::Script => 0o755,
            Sensitivity::General => 0o644,
        }
    }

    pub fn dir_mode(&self) -> u32 {
        match self {
            Sensitivity::Secret => 0o700,
            Sensitivity::Script | Sensitivity::General => 0o755,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOwner {
    ServiceAccount,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    None,
    /// Rendered content must parse as JSON before it is written
    Json,
}

/// One file materialized from a template.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub name: String,
    pub template: String,
    pub destination: PathBuf,
    pub sensitivity: Sensitivity,
    pub owner: ArtifactOwner,
    pub validation: Validation,
}

impl ArtifactSpec {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        destination: PathBuf,
        sensitivity: Sensitivity,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            destination,
            sensitivity,
            owner: ArtifactOwner::ServiceAccount,
            validation: Validation::None,
        }
    }

    pub fn owned_by_root(mut self) -> Self {
        self.owner = ArtifactOwner::Root;
        self
    }

    pub fn validate_json(mut self) -> Self {
        self.validation = Validation::Json;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Created,
    Unchanged,
    /// Ownership or mode was corrected; carries any content problem left in place
    Repaired(Option<String>),
    /// Present but not as expected; left alone
    Drifted(String),
}

/// Compare a path's owner and mode against expectations.
/// Returns a description of the difference, or `None` when it matches.
pub fn describe_drift(stat: &PathStat, owner: &Ownership, mode: u32) -> Option<String> {
    let mut problems = Vec::new();
    if stat.owner != owner.user {
        problems.push(format!("owner is {} (expected {})", stat.owner, owner.user));
    }
    if stat.mode != mode {
        problems.push(format!("mode is {:o} (expected {:o})", stat.mode, mode));
    }
    if problems.is_empty() {
        None
    } else {
        Some(problems.join(", "))
    }
}

pub struct ArtifactWriter<'a> {
    host: &'a dyn Host,
    renderer: &'a TemplateRenderer,
    account: Ownership,
    repair: bool,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(
        host: &'a dyn Host,
        renderer: &'a TemplateRenderer,
        account: Ownership,
        repair: bool,
    ) -> Self {
        Self {
            host,
            renderer,
            account,
            repair,
        }
    }

    fn ownership(&self, owner: ArtifactOwner) -> Ownership {
        match owner {
            ArtifactOwner::ServiceAccount => self.account.clone(),
            ArtifactOwner::Root => Ownership::root(),
        }
    }

    /// Render `spec` with `context` and write it if the destination is absent.
    pub async fn materialize(
        &self,
        spec: &ArtifactSpec,
        context: &Context,
    ) -> Result<ArtifactOutcome, ProvisionError> {
        let owner = self.ownership(spec.owner);
        let mode = spec.sensitivity.file_mode();

        if let Some(stat) = self.host.stat(&spec.destination).await? {
            if !stat.is_file() {
                return Err(ProvisionError::Artifact(format!(
                    "{} exists at {} but is not a regular file",
                    spec.name,
                    spec.destination.display()
                )));
            }
            return self.check_existing(spec, &stat, &owner, mode).await;
        }

        let rendered = self.renderer.render_with_context(&spec.template, context)?;
        if spec.validation == Validation::Json {
            serde_json::from_str::<serde_json::Value>(&rendered).map_err(|e| {
                ProvisionError::Template(format!(
                    "{} rendered invalid JSON from {}: {}",
                    spec.name, spec.template, e
                ))
            })?;
        }

        if let Some(parent) = spec.destination.parent() {
            self.ensure_parent(parent, &owner, spec.sensitivity).await?;
        }

        self.host
            .write_file(&spec.destination, &rendered, &owner, mode)
            .await?;
        tracing::info!(
            "[ArtifactWriter] Created {} at {} ({}, mode {:o})",
            spec.name,
            spec.destination.display(),
            owner,
            mode
        );
        Ok(ArtifactOutcome::Created)
    }

    async fn check_existing(
        &self,
        spec: &ArtifactSpec,
        stat: &PathStat,
        owner: &Ownership,
        mode: u32,
    ) -> Result<ArtifactOutcome, ProvisionError> {
        // Content is the operator's; never rewrite it
        let content_warning = if spec.validation == Validation::Json {
            let content = self.host.read_file(&spec.destination).await?;
            serde_json::from_str::<serde_json::Value>(&content)
                .err()
                .map(|e| format!("{} is not valid JSON: {}", spec.destination.display(), e))
        } else {
            None
        };
        if let Some(msg) = &content_warning {
            tracing::warn!("[ArtifactWriter] {}", msg);
        }

        let Some(drift) = describe_drift(stat, owner, mode) else {
            if let Some(msg) = content_warning {
                return Ok(ArtifactOutcome::Drifted(msg));
            }
            tracing::debug!(
                "[ArtifactWriter] {} already present at {}",
                spec.name,
                spec.destination.display()
            );
            return Ok(ArtifactOutcome::Unchanged);
        };

        if self.repair {
            self.host
                .set_permissions(&spec.destination, owner, mode)
                .await?;
            tracing::info!(
                "[ArtifactWriter] Repaired {} at {}: {}",
                spec.name,
                spec.destination.display(),
                drift
            );
            return Ok(ArtifactOutcome::Repaired(content_warning));
        }

        let mut msg = format!("{} at {}: {}", spec.name, spec.destination.display(), drift);
        tracing::warn!("[ArtifactWriter] {} (run `freqstrap repair` to fix)", msg);
        if let Some(content) = content_warning {
            msg.push_str("; ");
            msg.push_str(&content);
        }
        Ok(ArtifactOutcome::Drifted(msg))
    }

    async fn ensure_parent(
        &self,
        parent: &Path,
        owner: &Ownership,
        sensitivity: Sensitivity,
    ) -> Result<(), ProvisionError> {
        match self.host.stat(parent).await? {
            Some(stat) if stat.is_dir() => Ok(()),
            Some(_) => Err(ProvisionError::Artifact(format!(
                "{} exists but is not a directory",
                parent.display()
            ))),
            None => {
                tracing::info!("[ArtifactWriter] Creating parent {}", parent.display());
                self.host
                    .create_dir(parent, owner, sensitivity.dir_mode())
                    .await
            }
        }
    }
}
