use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "bootstrap.toml";
const DEFAULT_REDIRECT_RETURN_URL: &str = "http://localhost:5173/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub greeting_name: String,
    pub add_operands: (i32, i32),
    pub redirect_return_url: Url,
    pub preferences_path: PathBuf,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            greeting_name: "React".into(),
            add_operands: (21, 21),
            redirect_return_url: Url::parse(DEFAULT_REDIRECT_RETURN_URL)
                .expect("default redirect url is valid"),
            preferences_path: PathBuf::from("./data/preferences.toml"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    greeting_name: Option<String>,
    add_operands: Option<(i32, i32)>,
    redirect_return_url: Option<String>,
    preferences_path: Option<PathBuf>,
}

/// Defaults, then `path` if it exists, then `APP__*` environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<BootstrapSettings> {
    let mut settings = BootstrapSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file_settings(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file_settings(settings: &mut BootstrapSettings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.greeting_name {
        settings.greeting_name = v;
    }
    if let Some(v) = file_cfg.add_operands {
        settings.add_operands = v;
    }
    if let Some(v) = file_cfg.redirect_return_url {
        settings.redirect_return_url =
            Url::parse(&v).with_context(|| format!("invalid redirect_return_url '{v}'"))?;
    }
    if let Some(v) = file_cfg.preferences_path {
        settings.preferences_path = v;
    }

    Ok(())
}

pub(crate) fn apply_env_overrides(
    settings: &mut BootstrapSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("APP__GREETING_NAME") {
        settings.greeting_name = v;
    }

    if let Some(v) = lookup("APP__ADD_OPERANDS") {
        match parse_operands(&v) {
            Some(operands) => settings.add_operands = operands,
            None => warn!(value = %v, "config: ignoring APP__ADD_OPERANDS, expected `a,b`"),
        }
    }

    if let Some(v) = lookup("APP__REDIRECT_RETURN_URL") {
        match Url::parse(&v) {
            Ok(url) => settings.redirect_return_url = url,
            Err(err) => warn!(value = %v, error = %err, "config: ignoring APP__REDIRECT_RETURN_URL"),
        }
    }

    if let Some(v) = lookup("APP__PREFERENCES_PATH") {
        settings.preferences_path = PathBuf::from(v);
    }
}

fn parse_operands(raw: &str) -> Option<(i32, i32)> {
    let (a, b) = raw.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
