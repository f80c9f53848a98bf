// ABOUTME: Configuration management for the pyoperator application
// ABOUTME: Loads isolation and logging settings from YAML files and environment variables

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::isolation::IsolationSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub isolation: IsolationSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.merge_env();
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = [
            PathBuf::from("pyoperator.yaml"),
            PathBuf::from("pyoperator.yml"),
            PathBuf::from(".pyoperator.yaml"),
            PathBuf::from(".pyoperator.yml"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".pyoperator").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        // May not exist
        PathBuf::from("pyoperator.yaml")
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) {
        if let Ok(virtualenv) = std::env::var("PYOPERATOR_VIRTUALENV") {
            self.isolation.virtualenv_bin = virtualenv;
        }
        if let Ok(interpreter) = std::env::var("PYOPERATOR_INTERPRETER") {
            self.isolation.interpreter = Some(interpreter).filter(|i| !i.is_empty());
        }
        if let Ok(version) = std::env::var("PYOPERATOR_HOST_PYTHON_VERSION") {
            self.isolation.host_python_version = version;
        }

        if let Ok(level) = std::env::var("PYOPERATOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PYOPERATOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}
