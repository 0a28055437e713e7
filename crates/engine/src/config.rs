// Operator settings at `~/.caseclerk/config.toml`.
//
// Missing file or unparsable content falls back to defaults; every field
// carries a serde default so partial files load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use caseclerk_common::types::WatchMode;

/// Root directory for caseclerk state: `~/.caseclerk/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".caseclerk"))
}

/// Path to the settings file: `~/.caseclerk/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Watchlist treatment for one class of touched pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSetting {
    pub mode: WatchMode,
    /// Expiry honored when `mode` is `watch`, e.g. `"1 month"`.
    pub expiry: Option<String>,
}

/// Operator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Operate with clerk conventions (affects offered actions only in
    /// combination with the caller-provided roles).
    pub clerk: bool,
    /// Append every completed action to `log_page`.
    pub log_actions: bool,
    /// Log page title, e.g. `"User:Example/clerk log"`. Newest first.
    pub log_page: Option<String>,
    /// Pre-tick the archive step when closing a case.
    pub archive_on_close: bool,
    /// Enable single-section moves (easy to misuse; off by default).
    pub allow_section_moves: bool,
    /// Skip tagging accounts that exist only globally.
    pub only_tag_attached: bool,
    /// Full-protect tagged user pages (admins only).
    pub protect_tagged: bool,
    pub watch_case: WatchSetting,
    pub watch_archive: WatchSetting,
    pub watch_tagged_user: WatchSetting,
    pub watch_blocked_talk: WatchSetting,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clerk: false,
            log_actions: false,
            log_page: None,
            archive_on_close: true,
            allow_section_moves: false,
            only_tag_attached: false,
            protect_tagged: false,
            watch_case: WatchSetting::default(),
            watch_archive: WatchSetting::default(),
            watch_tagged_user: WatchSetting::default(),
            watch_blocked_talk: WatchSetting::default(),
        }
    }
}

impl Settings {
    /// Load from `~/.caseclerk/config.toml`. Returns defaults if the
    /// file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.caseclerk/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_conservative() {
        let settings = Settings::default();
        assert!(!settings.clerk);
        assert!(!settings.log_actions);
        assert!(settings.archive_on_close);
        assert!(!settings.allow_section_moves);
        assert!(!settings.protect_tagged);
        assert_eq!(settings.watch_case.mode, WatchMode::Preferences);
    }

    #[test]
    fn settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let settings = Settings {
            clerk: true,
            log_actions: true,
            log_page: Some("User:Example/clerk log".into()),
            archive_on_close: false,
            allow_section_moves: true,
            only_tag_attached: true,
            protect_tagged: true,
            watch_case: WatchSetting { mode: WatchMode::Watch, expiry: Some("1 month".into()) },
            watch_archive: WatchSetting { mode: WatchMode::NoChange, expiry: None },
            watch_tagged_user: WatchSetting::default(),
            watch_blocked_talk: WatchSetting { mode: WatchMode::Unwatch, expiry: None },
        };
        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(settings, loaded);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
clerk = true

[watch_case]
mode = "watch"
expiry = "1 week"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(settings.clerk);
        assert_eq!(settings.watch_case.mode, WatchMode::Watch);
        assert_eq!(settings.watch_case.expiry.as_deref(), Some("1 week"));
        assert!(settings.archive_on_close); // default
        assert_eq!(settings.watch_archive, WatchSetting::default());
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_missing_file_errors_load_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("config.toml");
        Settings::default().save_to(&path).unwrap();
        assert!(path.exists());
    }
}
