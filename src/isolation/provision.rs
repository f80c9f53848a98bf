// ABOUTME: Isolated environment provisioning for callable execution
// ABOUTME: Defines the provisioner interface plus virtualenv and existing-interpreter implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use super::error::{IsolationError, Result};
use super::runner::ProcessRunner;

/// What the isolated environment must look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Requirement strings as accepted by `pip install`.
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Interpreter version such as `3.11` or `2`. `None` uses the host's.
    #[serde(default)]
    pub python_version: Option<String>,

    /// Whether packages visible to the host interpreter are visible too.
    #[serde(default = "default_system_site_packages")]
    pub system_site_packages: bool,
}

fn default_system_site_packages() -> bool {
    true
}

impl Default for EnvironmentSpec {
    fn default() -> Self {
        Self {
            requirements: Vec::new(),
            python_version: None,
            system_site_packages: default_system_site_packages(),
        }
    }
}

impl EnvironmentSpec {
    /// Interpreter executable to build the environment from, e.g. `python3.11`.
    pub fn python_bin(&self) -> Option<String> {
        self.python_version
            .as_ref()
            .map(|version| format!("python{}", version))
    }

    /// Major component of the requested version.
    pub fn major_version(&self) -> Option<&str> {
        self.python_version.as_deref().map(major_of)
    }
}

pub(crate) fn major_of(version: &str) -> &str {
    version.trim().split('.').next().unwrap_or("")
}

/// Everything a provisioner gets told about one environment.
#[derive(Debug, Clone)]
pub struct ProvisionRequest<'a> {
    pub directory: &'a Path,
    pub python_bin: Option<String>,
    pub system_site_packages: bool,
    pub requirements: &'a [String],
}

impl<'a> ProvisionRequest<'a> {
    pub fn new(directory: &'a Path, spec: &'a EnvironmentSpec) -> Self {
        Self {
            directory,
            python_bin: spec.python_bin(),
            system_site_packages: spec.system_site_packages,
            requirements: &spec.requirements,
        }
    }

    fn error(&self, message: impl Into<String>) -> IsolationError {
        IsolationError::Provisioning {
            directory: self.directory.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Interpreter location every provisioner must produce.
pub fn interpreter_path(directory: &Path) -> PathBuf {
    directory.join("bin").join("python")
}

/// Builds an isolated interpreter installation in a directory.
#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    /// On success `interpreter_path(request.directory)` is executable.
    async fn provision(&self, request: &ProvisionRequest<'_>) -> Result<()>;
}

/// Creates a virtualenv and installs requirements into it with pip.
pub struct VirtualenvProvisioner {
    virtualenv_bin: String,
    runner: Arc<dyn ProcessRunner>,
}

impl VirtualenvProvisioner {
    pub fn new(virtualenv_bin: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            virtualenv_bin: virtualenv_bin.into(),
            runner,
        }
    }

    fn virtualenv_command(&self, request: &ProvisionRequest<'_>) -> Vec<String> {
        let mut command = vec![
            self.virtualenv_bin.clone(),
            request.directory.display().to_string(),
        ];
        if request.system_site_packages {
            command.push("--system-site-packages".to_string());
        }
        if let Some(ref python_bin) = request.python_bin {
            command.push(format!("--python={}", python_bin));
        }
        command
    }

    fn pip_install_command(&self, request: &ProvisionRequest<'_>) -> Vec<String> {
        let pip = request.directory.join("bin").join("pip");
        let mut command = vec![pip.display().to_string(), "install".to_string()];
        command.extend(request.requirements.iter().cloned());
        command
    }
}

#[async_trait]
impl EnvironmentProvisioner for VirtualenvProvisioner {
    async fn provision(&self, request: &ProvisionRequest<'_>) -> Result<()> {
        info!("Creating virtualenv in {}", request.directory.display());
        self.runner
            .run(&self.virtualenv_command(request))
            .await
            .map_err(|e| request.error(format!("virtualenv creation failed: {}", e)))?;

        if !request.requirements.is_empty() {
            info!("Installing requirements: {}", request.requirements.join(", "));
            self.runner
                .run(&self.pip_install_command(request))
                .await
                .map_err(|e| request.error(format!("requirement installation failed: {}", e)))?;
        }

        Ok(())
    }
}

/// Points `bin/python` at an interpreter that already exists on the host.
///
/// Nothing is installed, so requests with requirements are refused.
#[derive(Debug, Clone)]
pub struct ExistingInterpreterProvisioner {
    interpreter: String,
}

impl ExistingInterpreterProvisioner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl EnvironmentProvisioner for ExistingInterpreterProvisioner {
    async fn provision(&self, request: &ProvisionRequest<'_>) -> Result<()> {
        if !request.requirements.is_empty() {
            return Err(request.error(format!(
                "{} cannot install requirements ({})",
                self.interpreter,
                request.requirements.join(", ")
            )));
        }
        if !request.system_site_packages {
            warn!(
                "Using {} as is; host packages remain visible",
                self.interpreter
            );
        }

        let target = request
            .python_bin
            .clone()
            .unwrap_or_else(|| self.interpreter.clone());
        let bin_dir = request.directory.join("bin");
        fs::create_dir_all(&bin_dir).await?;

        let wrapper = interpreter_path(request.directory);
        let contents = format!(
            "#!/bin/sh\nexec '{}' \"$@\"\n",
            target.replace('\'', "'\\''")
        );
        fs::write(&wrapper, contents).await?;

        let mut perms = fs::metadata(&wrapper).await?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&wrapper, perms).await?;

        info!("Using existing interpreter {} via {}", target, wrapper.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingRunner {
        commands: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, command: &[String]) -> Result<()> {
            self.commands.lock().unwrap().push(command.to_vec());
            if self.fail {
                return Err(IsolationError::Subprocess {
                    command: command.to_vec(),
                    exit_code: Some(1),
                    output: "No matching distribution".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_python_bin_and_major_version() {
        let spec = EnvironmentSpec {
            python_version: Some("2.7".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.python_bin().as_deref(), Some("python2.7"));
        assert_eq!(spec.major_version(), Some("2"));

        assert_eq!(EnvironmentSpec::default().python_bin(), None);
        assert!(EnvironmentSpec::default().system_site_packages);
    }

    #[tokio::test]
    async fn test_virtualenv_commands() {
        let runner = Arc::new(RecordingRunner::default());
        let provisioner = VirtualenvProvisioner::new("virtualenv", runner.clone());
        let spec = EnvironmentSpec {
            requirements: vec!["pyyaml".to_string(), "requests==2.31.0".to_string()],
            python_version: Some("3.11".to_string()),
            system_site_packages: false,
        };
        let dir = Path::new("/tmp/venv123");

        provisioner
            .provision(&ProvisionRequest::new(dir, &spec))
            .await
            .unwrap();

        let commands = runner.commands.lock().unwrap().clone();
        assert_eq!(
            commands,
            vec![
                vec!["virtualenv", "/tmp/venv123", "--python=python3.11"],
                vec!["/tmp/venv123/bin/pip", "install", "pyyaml", "requests==2.31.0"],
            ]
        );
    }

    #[tokio::test]
    async fn test_virtualenv_skips_pip_without_requirements() {
        let runner = Arc::new(RecordingRunner::default());
        let provisioner = VirtualenvProvisioner::new("virtualenv", runner.clone());
        let spec = EnvironmentSpec::default();

        provisioner
            .provision(&ProvisionRequest::new(Path::new("/tmp/v"), &spec))
            .await
            .unwrap();

        let commands = runner.commands.lock().unwrap().clone();
        assert_eq!(commands, vec![vec!["virtualenv", "/tmp/v", "--system-site-packages"]]);
    }

    #[tokio::test]
    async fn test_failure_becomes_provisioning_error() {
        let runner = Arc::new(RecordingRunner {
            fail: true,
            ..Default::default()
        });
        let provisioner = VirtualenvProvisioner::new("virtualenv", runner);

        let err = provisioner
            .provision(&ProvisionRequest::new(Path::new("/tmp/v"), &EnvironmentSpec::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::Provisioning { .. }));
    }

    #[tokio::test]
    async fn test_existing_interpreter_wrapper() {
        let dir = tempdir().unwrap();
        let provisioner = ExistingInterpreterProvisioner::new("python3");

        provisioner
            .provision(&ProvisionRequest::new(dir.path(), &EnvironmentSpec::default()))
            .await
            .unwrap();

        let wrapper = interpreter_path(dir.path());
        let contents = std::fs::read_to_string(&wrapper).unwrap();
        assert_eq!(contents, "#!/bin/sh\nexec 'python3' \"$@\"\n");
        let mode = std::fs::metadata(&wrapper).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_existing_interpreter_refuses_requirements() {
        let dir = tempdir().unwrap();
        let provisioner = ExistingInterpreterProvisioner::new("python3");
        let spec = EnvironmentSpec {
            requirements: vec!["pandas".to_string()],
            ..Default::default()
        };

        let err = provisioner
            .provision(&ProvisionRequest::new(dir.path(), &spec))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pandas"));
        assert!(!interpreter_path(dir.path()).exists());
    }
}
