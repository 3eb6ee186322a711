use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "vaultterm";
const CONFIG_FILE: &str = "config.toml";

/// Settings read from config.toml. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the archive data (attachments, deletion manifests)
    pub data_dir: Option<PathBuf>,
    /// Archive JSON file; defaults to `<data_dir>/archive.json`
    pub archive_path: Option<PathBuf>,
    /// Where exported attachments are written
    pub export_dir: Option<PathBuf>,
    pub fast_debounce_ms: u64,
    pub deep_debounce_ms: u64,
    pub search_page_size: usize,
    pub aggregate_limit: usize,
    pub thread_limit: usize,
    pub flash_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            archive_path: None,
            export_dir: None,
            fast_debounce_ms: 100,
            deep_debounce_ms: 500,
            search_page_size: 100,
            aggregate_limit: 50_000,
            thread_limit: 1_000,
            flash_secs: 4,
        }
    }
}

/// Timing and paging knobs the state machine needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub fast_debounce: Duration,
    pub deep_debounce: Duration,
    pub search_page_size: usize,
    pub aggregate_limit: usize,
    pub thread_limit: usize,
    pub flash_duration: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Config::default().tuning()
    }
}

impl Config {
    pub fn tuning(&self) -> Tuning {
        Tuning {
            fast_debounce: Duration::from_millis(self.fast_debounce_ms),
            deep_debounce: Duration::from_millis(self.deep_debounce_ms),
            search_page_size: self.search_page_size.max(1),
            aggregate_limit: self.aggregate_limit.max(1),
            thread_limit: self.thread_limit.max(1),
            flash_duration: Duration::from_secs(self.flash_secs),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join(APP_NAME))
                .context("Failed to determine data directory"),
        }
    }

    pub fn archive_path(&self) -> Result<PathBuf> {
        match &self.archive_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("archive.json")),
        }
    }

    pub fn export_dir(&self) -> Result<PathBuf> {
        match &self.export_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::download_dir()
                .or_else(dirs::home_dir)
                .map(|p| p.join(format!("{APP_NAME}-exports")))
                .context("Failed to determine export directory"),
        }
    }
}

/// Returns the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .context("Failed to determine config directory")
}

/// Returns the path to the default config file
pub fn config_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Ensures the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir)
}

/// Loads the config file at `path`, falling back to defaults when it is absent
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(config)
}

/// Loads the config from the default location
pub fn load() -> Result<Config> {
    load_from(&config_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_not_empty() {
        let dir = config_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.ends_with(APP_NAME));
    }

    #[test]
    fn test_config_path() {
        let path = config_path().unwrap();
        assert!(path.ends_with(CONFIG_FILE));
    }

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let toml_content = r#"
data_dir = "/srv/mail"
deep_debounce_ms = 800
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/mail")));
        assert_eq!(config.deep_debounce_ms, 800);
        assert_eq!(config.fast_debounce_ms, 100);
        assert_eq!(config.search_page_size, 100);
    }

    #[test]
    fn test_archive_path_defaults_under_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/mail")),
            ..Config::default()
        };
        assert_eq!(
            config.archive_path().unwrap(),
            PathBuf::from("/srv/mail/archive.json")
        );
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "fast_debounce_ms = \"soon\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_tuning_clamps_zero_sizes() {
        let config = Config {
            search_page_size: 0,
            ..Config::default()
        };
        let tuning = config.tuning();
        assert_eq!(tuning.search_page_size, 1);
        assert_eq!(tuning.fast_debounce, Duration::from_millis(100));
        assert_eq!(tuning.flash_duration, Duration::from_secs(4));
    }
}
