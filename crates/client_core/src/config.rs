use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "journal.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080/api".into(),
            database_url: default_database_url(),
            log_filter: "info".into(),
        }
    }
}

fn default_database_url() -> String {
    match dirs::data_dir() {
        Some(dir) => {
            let path = dir.join("journal").join("client.db");
            format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
        }
        None => "sqlite://./data/client.db".into(),
    }
}

/// Defaults, then `journal.toml` in the working directory, then environment.
pub fn load_settings() -> Result<Settings> {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(SETTINGS_FILE))?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.api_url = normalize_api_url(&settings.api_url)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> Result<()> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Ok(());
    };
    let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;

    if let Some(v) = file_cfg.get("api_url") {
        settings.api_url = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
    Ok(())
}

fn apply_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("JOURNAL_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

pub fn normalize_api_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).with_context(|| format!("invalid api url '{raw}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("api url '{raw}' must use http or https"));
    }
    Ok(trimmed.to_string())
}
