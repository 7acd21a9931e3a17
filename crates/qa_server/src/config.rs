use std::time::Duration;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub log_filter: String,
    pub sweep_interval_secs: u64,
    pub session_retention_hours: i64,
    pub session_counter_baseline: i64,
    pub extra_blocked_terms: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".into(),
            database_url: "sqlite://./data/qa.db".into(),
            log_filter: "info".into(),
            sweep_interval_secs: 3600,
            session_retention_hours: qa_core::SESSION_RETENTION_HOURS,
            session_counter_baseline: 0,
            extra_blocked_terms: Vec::new(),
        }
    }
}

impl Settings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn session_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_retention_hours)
    }
}

/// `server.toml` in the working directory, then `APP__*` variables, then the
/// plain `DATABASE_URL` and `PORT` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = read_settings(File::with_name("server").required(false))?;
    Ok(apply_legacy_env(
        settings,
        std::env::var("DATABASE_URL").ok(),
        std::env::var("PORT").ok(),
    ))
}

#[cfg(test)]
pub fn load_settings_from(path: &std::path::Path) -> anyhow::Result<Settings> {
    read_settings(File::from(path).required(true))
}

fn read_settings<S>(file: S) -> anyhow::Result<Settings>
where
    S: config::Source + Send + Sync + 'static,
{
    let mut settings: Settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("extra_blocked_terms")
                .try_parsing(true),
        )
        .build()
        .context("failed to read settings")?
        .try_deserialize()
        .context("invalid settings")?;
    settings.database_url = normalize_database_url(&settings.database_url);
    Ok(settings)
}

fn apply_legacy_env(
    mut settings: Settings,
    database_url: Option<String>,
    port: Option<String>,
) -> Settings {
    if let Some(database_url) = database_url {
        settings.database_url = normalize_database_url(&database_url);
    }
    if let Some(port) = port.and_then(|port| port.trim().parse::<u16>().ok()) {
        settings.bind_addr = format!("0.0.0.0:{port}");
    }
    settings
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
