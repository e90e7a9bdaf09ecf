use std::{fs, path::Path};

use anyhow::Context;
use shared::domain::ContextKey;

pub const DEFAULT_SETTINGS_FILE: &str = "board.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub context: ContextKey,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            context: ContextKey::from("default"),
            request_timeout_secs: Some(30),
        }
    }
}

/// Defaults, then `board.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let path = Path::new(DEFAULT_SETTINGS_FILE);
    if path.exists() {
        apply_file(&mut settings, path)?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    apply_file(&mut settings, path)?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    apply_toml(settings, &raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))
}

fn apply_toml(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table: toml::Table = toml::from_str(raw)?;

    if let Some(v) = table.get("server_url").and_then(|v| v.as_str()) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = table.get("context").and_then(|v| v.as_str()) {
        settings.context = ContextKey::from(v);
    }
    if let Some(v) = table.get("request_timeout_secs") {
        settings.request_timeout_secs = match v {
            toml::Value::Integer(0) => None,
            toml::Value::Integer(secs) if *secs > 0 => Some(*secs as u64),
            toml::Value::String(secs) => parse_timeout(secs)?,
            other => anyhow::bail!("request_timeout_secs must be a non-negative integer, got {other}"),
        };
    }

    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BOARD_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("BOARD_CONTEXT") {
        settings.context = ContextKey::new(v);
    }
    if let Some(v) = lookup("APP__CONTEXT") {
        settings.context = ContextKey::new(v);
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = parse_timeout(&v) {
            settings.request_timeout_secs = parsed;
        }
    }
}

/// `0` disables the client-side timeout.
fn parse_timeout(raw: &str) -> anyhow::Result<Option<u64>> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid timeout '{raw}'"))?;
    Ok((secs > 0).then_some(secs))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
