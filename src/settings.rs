//! Typed configuration, loaded once from an optional YAML file and falling
//! back to compiled-in defaults that mirror upstream's stock `settings.ini`.

use std::{path::Path, sync::OnceLock, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Combination {
    pub os_name: String,
    pub target: String,
    pub arch: String,
}

impl Default for Combination {
    fn default() -> Self {
        Self {
            os_name: String::new(),
            target: String::new(),
            arch: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolCombination {
    pub os_name: String,
    pub tool_name: String,
    pub arch: String,
}

impl Default for ToolCombination {
    fn default() -> Self {
        Self {
            os_name: String::new(),
            tool_name: String::new(),
            arch: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub concurrency: usize,
    pub connection_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub max_retries_on_connection: u32,
    pub max_retries_on_checksum_error: u32,
    pub max_retries_for_hash: u32,
    pub base_url: Url,
    pub trusted_mirrors: Vec<Url>,
    pub blacklist: Vec<String>,
    pub fallbacks: Vec<Url>,
    pub min_module_size: u64,
    pub always_keep_archives: bool,
    pub archive_download_location: Option<String>,
    pub print_stacktrace_on_error: bool,
    pub zip_cmd: Option<String>,
    pub qt_combinations: Vec<Combination>,
    pub tools_combinations: Vec<ToolCombination>,
    pub kde_patches: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let base_url = Url::parse("https://download.qt.io/").expect("valid default base url");
        Self {
            concurrency: 4,
            connection_timeout_secs: 5,
            response_timeout_secs: 5,
            max_retries_on_connection: 5,
            max_retries_on_checksum_error: 5,
            max_retries_for_hash: 5,
            trusted_mirrors: vec![base_url.clone()],
            base_url,
            blacklist: Vec::new(),
            fallbacks: Vec::new(),
            min_module_size: 0,
            always_keep_archives: false,
            archive_download_location: None,
            print_stacktrace_on_error: false,
            zip_cmd: None,
            qt_combinations: default_qt_combinations(),
            tools_combinations: Vec::new(),
            kde_patches: Vec::new(),
        }
    }
}

impl Settings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Loads settings from `path` if given, else returns compiled-in
    /// defaults. Fields absent from the YAML document fall back to their
    /// `Default` values via `#[serde(default)]`.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Warns-only sanity check: is `(os, target, arch)` a combination
    /// upstream's catalog is known to publish? Checked before any network
    /// access, purely informational.
    pub fn is_known_qt_combination(&self, os_name: &str, target: &str, arch: &str) -> bool {
        self.qt_combinations
            .iter()
            .any(|c| c.os_name == os_name && c.target == target && c.arch == arch)
    }

    pub fn is_known_tool_combination(&self, os_name: &str, tool_name: &str, arch: &str) -> bool {
        self.tools_combinations
            .iter()
            .any(|c| c.os_name == os_name && c.tool_name == tool_name && c.arch == arch)
    }
}

/// A small, load-bearing slice of upstream's `combinations.json`, enough to
/// give CLI-side sanity warnings for the most common desktop targets.
fn default_qt_combinations() -> Vec<Combination> {
    [
        ("linux", "desktop", "gcc_64"),
        ("mac", "desktop", "clang_64"),
        ("mac", "ios", "ios"),
        ("windows", "desktop", "win64_mingw73"),
        ("windows", "desktop", "win32_mingw73"),
        ("windows", "winrt", "win64_msvc2017_winrt_x64"),
    ]
    .into_iter()
    .map(|(os_name, target, arch)| Combination {
        os_name: os_name.to_owned(),
        target: target.to_owned(),
        arch: arch.to_owned(),
    })
    .collect()
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Initializes the process-wide `Settings` singleton. Must be called
/// exactly once, early in `main`.
pub fn init(settings: Settings) {
    SETTINGS.set(settings).ok();
}

pub fn get() -> &'static Settings {
    SETTINGS.get_or_init(Settings::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream_stock_values() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.connection_timeout_secs, 5);
        assert_eq!(settings.max_retries_on_connection, 5);
    }

    #[test]
    fn known_combination_lookup() {
        let settings = Settings::default();
        assert!(settings.is_known_qt_combination("linux", "desktop", "gcc_64"));
        assert!(!settings.is_known_qt_combination("linux", "desktop", "mingw73"));
    }
}
