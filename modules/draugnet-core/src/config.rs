use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Contains only secrets; everything else lives in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Repository
    pub misp_key: String,

    // Postgres store
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            misp_key: std::env::var("MISP_KEY").context("MISP_KEY must be set")?,
            database_url: std::env::var("DATABASE_URL").ok(),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  MISP_KEY: {}", preview(&self.misp_key));
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
    }
}

/// First five characters of a secret and its length, for startup logs.
fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{}...({} chars)", head, val.chars().count())
}
