//! MISP object templates read from a local `misp-objects/objects` checkout.
//!
//! Each template lives in `<objects_dir>/<name>/definition.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

static RE_TEMPLATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());

const DEFINITION_FILE: &str = "definition.json";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template name: {0}")]
    InvalidName(String),

    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse template: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Template names may only contain ASCII letters, digits and dashes.
pub fn is_valid_template_name(name: &str) -> bool {
    RE_TEMPLATE_NAME.is_match(name)
}

/// The parts of a template definition needed to build an object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectTemplate {
    pub name: String,
    pub uuid: String,
    #[serde(rename = "meta-category")]
    pub meta_category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<Value>,
    pub attributes: BTreeMap<String, TemplateAttribute>,
    /// Relations every object must carry.
    #[serde(default)]
    pub required: Vec<String>,
    /// At least one of these relations must be present.
    #[serde(rename = "requiredOneOf", default)]
    pub required_one_of: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateAttribute {
    #[serde(rename = "misp-attribute")]
    pub misp_attribute: String,
    /// The first entry is the category given to built attributes.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl ObjectTemplate {
    pub fn version_string(&self) -> Option<String> {
        match &self.version {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

pub struct TemplateRegistry {
    objects_dir: PathBuf,
    allow_list: Vec<String>,
}

impl TemplateRegistry {
    pub fn new(objects_dir: impl Into<PathBuf>, allow_list: Vec<String>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            allow_list,
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    fn definition_path(&self, name: &str) -> Result<PathBuf, TemplateError> {
        if !is_valid_template_name(name) {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        Ok(self.objects_dir.join(name).join(DEFINITION_FILE))
    }

    /// Names of all templates with a definition file, filtered by the
    /// configured allow-list when it is non-empty. Sorted.
    pub async fn list(&self) -> Result<Vec<String>, TemplateError> {
        let mut entries = tokio::fs::read_dir(&self.objects_dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if tokio::fs::try_exists(entry.path().join(DEFINITION_FILE)).await? {
                names.push(name);
            }
        }
        if !self.allow_list.is_empty() {
            names.retain(|n| self.allow_list.contains(n));
        }
        names.sort();
        Ok(names)
    }

    /// Raw definition document, returned to clients verbatim.
    pub async fn definition(&self, name: &str) -> Result<Value, TemplateError> {
        let bytes = self.read(name).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Typed definition, used to build objects.
    pub async fn load(&self, name: &str) -> Result<ObjectTemplate, TemplateError> {
        let bytes = self.read(name).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, TemplateError> {
        let path = self.definition_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
