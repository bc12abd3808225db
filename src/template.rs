//! Config template rendering.
//!
//! Templates use minijinja with strict undefined behavior: a reference to
//! a variable absent from the map fails naming that variable, never a
//! silent empty substitution. Undeclared variables are checked up front so
//! the error carries the variable name regardless of where rendering would
//! have stopped.

use std::collections::BTreeSet;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Variable map handed to a template.
pub type TemplateVars = Map<String, Value>;

/// Renders config templates with strict variable resolution.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Create a renderer with strict undefined behavior.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render template `source` under `name` with the given variables.
    pub fn render_str(&self, name: &str, source: &str, vars: &TemplateVars) -> Result<String> {
        let template = self
            .env
            .template_from_named_str(name, source)
            .map_err(|e| Error::TemplateRender {
                template: name.to_string(),
                message: e.to_string(),
            })?;

        // Diff referenced variables against the map before rendering so
        // the error names the missing variable.
        let undeclared: BTreeSet<String> = template
            .undeclared_variables(false)
            .into_iter()
            .filter(|v| !vars.contains_key(v))
            .collect();
        if let Some(variable) = undeclared.into_iter().next() {
            return Err(Error::TemplateUndefined {
                template: name.to_string(),
                variable,
            });
        }

        template.render(vars).map_err(|e| Error::TemplateRender {
            template: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Render a template file from disk.
    pub fn render_file(&self, path: impl AsRef<Path>, vars: &TemplateVars) -> Result<String> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read template '{}': {}", path.display(), e))
        })?;
        self.render_str(&path.display().to_string(), &source, vars)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write rendered content to a staging path, creating parent directories.
pub fn write(content: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
