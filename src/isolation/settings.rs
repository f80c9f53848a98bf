// ABOUTME: Host-level settings for isolated execution
// ABOUTME: Chooses the provisioner, temp directory prefix and the host interpreter version used for validation

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::provision::{
    EnvironmentProvisioner, ExistingInterpreterProvisioner, VirtualenvProvisioner,
};
use super::runner::ProcessRunner;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationSettings {
    /// Executable used to create virtualenvs.
    #[serde(default = "default_virtualenv_bin")]
    pub virtualenv_bin: String,

    /// When set, environments reuse this interpreter instead of building a
    /// virtualenv. Requirements cannot be installed in that mode.
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Interpreter version of the host, compared against requested versions.
    #[serde(default = "default_host_python_version")]
    pub host_python_version: String,

    /// Prefix of the per-invocation temporary directory.
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
}

fn default_virtualenv_bin() -> String {
    "virtualenv".to_string()
}

fn default_host_python_version() -> String {
    "3".to_string()
}

fn default_temp_prefix() -> String {
    "venv".to_string()
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            virtualenv_bin: default_virtualenv_bin(),
            interpreter: None,
            host_python_version: default_host_python_version(),
            temp_prefix: default_temp_prefix(),
        }
    }
}

impl IsolationSettings {
    pub fn host_major_version(&self) -> &str {
        super::provision::major_of(&self.host_python_version)
    }

    pub fn provisioner(&self, runner: Arc<dyn ProcessRunner>) -> Arc<dyn EnvironmentProvisioner> {
        match self.interpreter {
            Some(ref interpreter) => Arc::new(ExistingInterpreterProvisioner::new(interpreter)),
            None => Arc::new(VirtualenvProvisioner::new(&self.virtualenv_bin, runner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let settings: IsolationSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, IsolationSettings::default());
        assert_eq!(settings.host_major_version(), "3");
        assert_eq!(settings.temp_prefix, "venv");
    }

    #[test]
    fn test_host_major_version() {
        let settings = IsolationSettings {
            host_python_version: "2.7.18".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.host_major_version(), "2");
    }
}
