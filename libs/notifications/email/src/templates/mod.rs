//! Notification templates
//!
//! This module provides:
//! - `TemplateDescriptor`: template body plus its parameter schema
//! - `TemplateStore` trait, with `FsTemplateStore` and `InMemoryTemplateStore`
//! - `substitute`: `|name|` placeholder replacement
//!
//! A template is an HTML body and a YAML config keyed by the same action:
//!
//! ```yaml
//! params:        # filled from the task fields, missing ones become ""
//!   - name
//!   - pin
//! body:          # fixed substitutions; `title` is the subject
//!   title: Your PIN code
//!   company: Example Corp
//! ```

mod fs;

pub use fs::{FsTemplateStore, DEFAULT_CONFIG_DIR, DEFAULT_TEMPLATE_DIR};

use crate::error::ResolveError;
use crate::task::Task;
use async_trait::async_trait;
use serde_yaml_ng::Value as Yaml;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Template body with its parameter schema, resolved for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDescriptor {
    pub action: String,
    pub body: String,
    /// Placeholders filled from task fields, in declaration order
    pub params: Vec<String>,
    /// Fixed `(key, value)` substitutions, in declaration order
    pub fixed: Vec<(String, String)>,
}

impl TemplateDescriptor {
    pub fn new(action: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            body: body.into(),
            params: Vec::new(),
            fixed: Vec::new(),
        }
    }

    pub fn with_params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fixed(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed.push((key.into(), value.into()));
        self
    }

    /// Build a descriptor from a template body and its YAML config.
    ///
    /// `params` is used only when it is a list and `body` only when it is a
    /// mapping. An empty document is an empty config.
    pub fn from_yaml(
        action: impl Into<String>,
        body: impl Into<String>,
        config: &str,
    ) -> Result<Self, ResolveError> {
        let action = action.into();
        let invalid = |details: String| ResolveError::InvalidConfig {
            action: action.clone(),
            details,
        };

        let document: Yaml =
            serde_yaml_ng::from_str(config).map_err(|e| invalid(e.to_string()))?;

        let mapping = match document {
            Yaml::Null => return Ok(Self::new(action, body)),
            Yaml::Mapping(mapping) => mapping,
            _ => return Err(invalid("expected a mapping at the top level".to_string())),
        };

        let params = match mapping.get("params") {
            Some(Yaml::Sequence(items)) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        };

        let fixed = match mapping.get("body") {
            Some(Yaml::Mapping(entries)) => entries
                .iter()
                .filter_map(|(key, value)| {
                    let key = scalar_text(key)?;
                    let value = match value {
                        Yaml::Null => String::new(),
                        other => scalar_text(other)?,
                    };
                    Some((key, value))
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            action,
            body: body.into(),
            params,
            fixed,
        })
    }

    /// The subject: fixed substitution `title`, or empty.
    pub fn subject(&self) -> &str {
        self.fixed
            .iter()
            .find(|(key, _)| key == "title")
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Render the body for `task`.
    pub fn render(&self, task: &Task) -> String {
        substitute(&self.body, &self.params, task, &self.fixed)
    }
}

fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Replace `|name|` placeholders in `template`.
///
/// Declared params are filled first from the task (missing fields become
/// empty), then the fixed substitutions are applied. Placeholders that are
/// not declared are left untouched.
pub fn substitute(
    template: &str,
    params: &[String],
    task: &Task,
    fixed: &[(String, String)],
) -> String {
    let mut rendered = template.to_string();

    for name in params {
        rendered = rendered.replace(&format!("|{}|", name), &task.field_text(name));
    }

    for (key, value) in fixed {
        rendered = rendered.replace(&format!("|{}|", key), value);
    }

    rendered
}

/// Template lookup by action.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Resolve the template and config for `action`. Never cached.
    async fn resolve(&self, action: &str) -> Result<TemplateDescriptor, ResolveError>;

    /// Actions with a template available.
    async fn actions(&self) -> Result<Vec<String>, ResolveError>;
}

#[async_trait]
impl<S: TemplateStore + ?Sized> TemplateStore for Arc<S> {
    async fn resolve(&self, action: &str) -> Result<TemplateDescriptor, ResolveError> {
        (**self).resolve(action).await
    }

    async fn actions(&self) -> Result<Vec<String>, ResolveError> {
        (**self).actions().await
    }
}

/// In-memory template store for tests and embedding
#[derive(Clone, Default)]
pub struct InMemoryTemplateStore {
    templates: Arc<RwLock<HashMap<String, TemplateDescriptor>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store holding `descriptors`, keyed by action. Later duplicates win.
    pub fn from_templates(descriptors: impl IntoIterator<Item = TemplateDescriptor>) -> Self {
        let templates: HashMap<String, TemplateDescriptor> = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.action.clone(), descriptor))
            .collect();
        Self {
            templates: Arc::new(RwLock::new(templates)),
        }
    }

    pub async fn insert(&self, descriptor: TemplateDescriptor) {
        self.templates
            .write()
            .await
            .insert(descriptor.action.clone(), descriptor);
    }

    pub async fn remove(&self, action: &str) -> Option<TemplateDescriptor> {
        self.templates.write().await.remove(action)
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn resolve(&self, action: &str) -> Result<TemplateDescriptor, ResolveError> {
        self.templates
            .read()
            .await
            .get(action)
            .cloned()
            .ok_or_else(|| ResolveError::TemplateNotFound(action.to_string()))
    }

    async fn actions(&self) -> Result<Vec<String>, ResolveError> {
        let mut actions: Vec<String> = self.templates.read().await.keys().cloned().collect();
        actions.sort();
        Ok(actions)
    }
}
