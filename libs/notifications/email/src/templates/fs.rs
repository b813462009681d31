//! Filesystem template store.
//!
//! Layout: `<template_dir>/<action>.html` and `<config_dir>/<action>.yml`.

use super::{TemplateDescriptor, TemplateStore};
use crate::error::ResolveError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_TEMPLATE_DIR: &str = "src/templates";
pub const DEFAULT_CONFIG_DIR: &str = "src/config";

/// Reads templates and configs from disk on every lookup.
#[derive(Clone, Debug)]
pub struct FsTemplateStore {
    template_dir: PathBuf,
    config_dir: PathBuf,
}

impl Default for FsTemplateStore {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_DIR, DEFAULT_CONFIG_DIR)
    }
}

impl FsTemplateStore {
    pub fn new(template_dir: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            config_dir: config_dir.into(),
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Actions become file names, so only plain names are accepted.
fn is_safe_action(action: &str) -> bool {
    !action.is_empty()
        && !action.starts_with('.')
        && !action.contains("..")
        && action
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Read a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> Result<Option<String>, ResolveError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ResolveError::Io {
            path: path.display().to_string(),
            details: e.to_string(),
        }),
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn resolve(&self, action: &str) -> Result<TemplateDescriptor, ResolveError> {
        if !is_safe_action(action) {
            debug!(action, "Rejecting action that is not a plain template name");
            return Err(ResolveError::TemplateNotFound(action.to_string()));
        }

        let template_path = self.template_dir.join(format!("{}.html", action));
        let config_path = self.config_dir.join(format!("{}.yml", action));

        let body = read_optional(&template_path)
            .await?
            .ok_or_else(|| ResolveError::TemplateNotFound(action.to_string()))?;
        let config = read_optional(&config_path)
            .await?
            .ok_or_else(|| ResolveError::ConfigNotFound(action.to_string()))?;

        TemplateDescriptor::from_yaml(action, body, &config)
    }

    async fn actions(&self) -> Result<Vec<String>, ResolveError> {
        let io_error = |e: std::io::Error| ResolveError::Io {
            path: self.template_dir.display().to_string(),
            details: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&self.template_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(dir = %self.template_dir.display(), "Template directory not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(e)),
        };

        let mut actions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let is_file = entry.file_type().await.map_err(io_error)?.is_file();
            if !is_file || path.extension().and_then(|ext| ext.to_str()) != Some("html") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                actions.push(stem.to_string());
            }
        }

        actions.sort();
        Ok(actions)
    }
}
