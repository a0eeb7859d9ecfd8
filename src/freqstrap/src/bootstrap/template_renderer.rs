/// Template renderer using Tera for Jinja2-style template rendering
/// Embedded templates first, optional on-disk overrides on top.
use super::embedded_templates;
use crate::provisioner::ProvisionError;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

/// Simple recursive directory walker
fn walkdir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                results.extend(walkdir(&path)?);
            } else {
                results.push(path);
            }
        }
    }
    Ok(results)
}

pub struct TemplateRenderer {
    tera: Tera,
    templates_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    /// Create a TemplateRenderer from embedded templates (compiled into the binary).
    pub fn from_embedded() -> Result<Self, ProvisionError> {
        tracing::debug!("[TemplateRenderer] Initializing Tera from embedded templates");

        let mut tera = Tera::default();
        for (name, content) in embedded_templates::ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| {
                ProvisionError::Template(format!("Embedded template {} is invalid: {}", name, e))
            })?;
            tracing::debug!("[TemplateRenderer] Loaded embedded template: {}", name);
        }

        tracing::debug!(
            "[TemplateRenderer] Loaded {} embedded templates",
            embedded_templates::ALL_TEMPLATES.len()
        );

        Ok(Self {
            tera,
            templates_dir: None,
        })
    }

    /// Embedded templates overlaid with every `*.j2` file under `templates_dir`.
    ///
    /// Override names are paths relative to `templates_dir`, so
    /// `<dir>/strategies/SampleStrategy.py.j2` replaces the embedded strategy.
    pub fn with_overrides(templates_dir: PathBuf) -> Result<Self, ProvisionError> {
        let mut renderer = Self::from_embedded()?;
        let mut override_count = 0;

        let files = walkdir(&templates_dir).map_err(|e| {
            ProvisionError::Template(format!(
                "Cannot read templates directory {}: {}",
                templates_dir.display(),
                e
            ))
        })?;

        for path in files {
            let is_template = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".j2"));
            if !is_template {
                continue;
            }
            let Ok(rel_path) = path.strip_prefix(&templates_dir) else {
                continue;
            };
            let template_name = rel_path.to_string_lossy().replace('\\', "/");
            let content = std::fs::read_to_string(&path)?;
            renderer
                .tera
                .add_raw_template(&template_name, &content)
                .map_err(|e| {
                    ProvisionError::Template(format!(
                        "Template override {} is invalid: {}",
                        path.display(),
                        e
                    ))
                })?;
            override_count += 1;
            tracing::info!(
                "[TemplateRenderer] Using override for {} from {}",
                template_name,
                path.display()
            );
        }

        tracing::info!(
            "[TemplateRenderer] Loaded {} template overrides from {}",
            override_count,
            templates_dir.display()
        );

        renderer.templates_dir = Some(templates_dir);
        Ok(renderer)
    }

    /// Render a template with a Tera Context directly
    pub fn render_with_context(
        &self,
        template_name: &str,
        context: &Context,
    ) -> Result<String, ProvisionError> {
        let rendered = self.tera.render(template_name, context).map_err(|e| {
            // Tera hides the useful part of the error in the source chain
            let mut detail = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(inner) = source {
                detail.push_str(": ");
                detail.push_str(&inner.to_string());
                source = inner.source();
            }
            ProvisionError::Template(format!(
                "Failed to render template {}: {}",
                template_name, detail
            ))
        })?;

        tracing::debug!(
            "[TemplateRenderer] Rendered template {} ({} bytes)",
            template_name,
            rendered.len()
        );

        Ok(rendered)
    }

    /// List all loaded template names
    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(String::from).collect();
        names.sort();
        names
    }

    /// Override directory, if one was loaded
    pub fn templates_dir(&self) -> Option<&Path> {
        self.templates_dir.as_deref()
    }
}
