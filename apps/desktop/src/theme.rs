//! Persisted light/dark theme preference.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_system(prefers_dark: bool) -> Self {
        if prefers_dark {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    theme: Option<Theme>,
}

pub struct ThemePreference {
    path: PathBuf,
    theme: Theme,
}

impl ThemePreference {
    /// A saved theme wins; otherwise the system preference decides.
    pub fn load(path: impl Into<PathBuf>, prefers_dark: bool) -> Self {
        let path = path.into();
        let theme = match read_saved_theme(&path) {
            Ok(Some(theme)) => theme,
            Ok(None) => Theme::from_system(prefers_dark),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "theme: ignoring unreadable preferences"
                );
                Theme::from_system(prefers_dark)
            }
        };
        Self { path, theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Flips the theme and saves it right away.
    pub fn toggle(&mut self) -> anyhow::Result<Theme> {
        let next = self.theme.toggled();
        write_theme(&self.path, next)?;
        self.theme = next;
        info!(theme = next.as_str(), "theme: saved preference");
        Ok(next)
    }
}

fn read_saved_theme(path: &Path) -> anyhow::Result<Option<Theme>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let file: PreferencesFile =
        toml::from_str(&raw).with_context(|| format!("failed to parse '{}'", path.display()))?;
    Ok(file.theme)
}

fn write_theme(path: &Path, theme: Theme) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for preferences",
                parent.display()
            )
        })?;
    }

    let raw = toml::to_string(&PreferencesFile { theme: Some(theme) })?;
    fs::write(path, raw).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/theme_tests.rs"]
mod tests;
