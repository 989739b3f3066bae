use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML-backed configuration loaded from disk.
/// Secrets (MISP key, DB URL) stay as env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub misp: MispConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MispConfig {
    pub url: String,
    #[serde(default = "default_verify_cert")]
    pub verify_cert: bool,
}

fn default_verify_cert() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    pub objects_dir: PathBuf,
    /// Templates offered for listing. Empty means all.
    #[serde(default)]
    pub allow_list: Vec<String>,
}

/// `[modules.reporting.<name>]` and `[modules.enhancements.<name>]` tables.
/// Table order in the file is the dispatch order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulesConfig {
    #[serde(default)]
    pub reporting: toml::Table,
    #[serde(default)]
    pub enhancements: toml::Table,
}

impl ModulesConfig {
    pub fn reporting(&self) -> Vec<ModuleConfig> {
        Self::collect(&self.reporting)
    }

    pub fn enhancements(&self) -> Vec<ModuleConfig> {
        Self::collect(&self.enhancements)
    }

    fn collect(section: &toml::Table) -> Vec<ModuleConfig> {
        section
            .iter()
            .map(|(name, value)| ModuleConfig {
                name: name.clone(),
                table: value.as_table().cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Settings for one configured module.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    pub name: String,
    pub table: toml::Table,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, table: toml::Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// An explicit `enabled` key wins. Otherwise a module is enabled only
    /// when both `url` and `auth_key` are non-empty.
    pub fn enabled(&self) -> bool {
        if let Some(flag) = self.table.get("enabled") {
            return match flag {
                toml::Value::Boolean(b) => *b,
                toml::Value::Integer(i) => *i != 0,
                toml::Value::String(s) => matches!(s.trim(), "true" | "1" | "yes"),
                _ => false,
            };
        }
        let present = |key: &str| self.str(key).is_some_and(|v| !v.trim().is_empty());
        present("url") && present("auth_key")
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(toml::Value::as_str)
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.str(key).unwrap_or(default).to_string()
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.table
            .get(key)
            .and_then(toml::Value::as_bool)
            .unwrap_or(default)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.table.get(key) {
            Some(toml::Value::Integer(i)) => u64::try_from(*i).unwrap_or(default),
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 8000
        allowed_origins = ["http://localhost:3000"]

        [misp]
        url = "https://misp.example.org"
        verify_cert = false

        [store]
        backend = "postgres"

        [templates]
        objects_dir = "misp-objects/objects"
        allow_list = ["domain-ip", "email"]

        [modules.reporting.rtir]
        url = "https://rtir.example.org"
        auth_key = "k"
        queue = "Incident Reports"

        [modules.reporting.flowintel]
        url = "https://flowintel.example.org"
        auth_key = ""

        [modules.reporting.custom]
        enabled = true

        [modules.enhancements.ollama]
        enabled = true
        model = "qwen3:30b"
        timeout = 90
    "#;

    #[test]
    fn parses_all_sections() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(!config.misp.verify_cert);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.templates.allow_list, vec!["domain-ip", "email"]);
    }

    #[test]
    fn module_tables_keep_file_order() {
        let config = parse_config(SAMPLE).unwrap();
        let names: Vec<String> = config
            .modules
            .reporting()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["rtir", "flowintel", "custom"]);
    }

    #[test]
    fn enabled_rule() {
        let config = parse_config(SAMPLE).unwrap();
        let reporting = config.modules.reporting();
        assert!(reporting[0].enabled(), "url and auth_key present");
        assert!(!reporting[1].enabled(), "blank auth_key");
        assert!(reporting[2].enabled(), "explicit flag");

        let mut table = toml::Table::new();
        table.insert("url".into(), "https://x".into());
        table.insert("auth_key".into(), "k".into());
        table.insert("enabled".into(), false.into());
        assert!(!ModuleConfig::new("rtir", table).enabled(), "explicit flag wins");
    }

    #[test]
    fn typed_accessors_fall_back_to_defaults() {
        let config = parse_config(SAMPLE).unwrap();
        let ollama = &config.modules.enhancements()[0];
        assert_eq!(ollama.u64_or("timeout", 120), 90);
        assert_eq!(ollama.string_or("url", "http://127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert!(ollama.bool_or("verify_cert", true));
    }

    #[test]
    fn store_defaults_to_memory() {
        let config = parse_config(
            r#"
            [server]
            port = 8000
            [misp]
            url = "https://misp"
            [templates]
            objects_dir = "objects"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.misp.verify_cert);
        assert!(config.modules.reporting().is_empty());
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(parse_config("[server]\nport = 1\n[redis]\nhost = 'x'").is_err());
    }

    #[test]
    fn shipped_config_parses() {
        let config = parse_config(include_str!("../../../config/draugnet.toml")).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.server.port, 8999);
        assert!(config.modules.reporting().iter().all(|m| !m.enabled()));
        assert_eq!(config.modules.enhancements()[0].name, "ollama");
    }
}
