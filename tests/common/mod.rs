// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides fake provisioners and runners, host contexts and task file builders

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

use pyoperator::engine::{ExecutionContext, HostHandle};
use pyoperator::isolation::{
    EnvironmentProvisioner, ExecutionBridge, ExistingInterpreterProvisioner, ProcessRunner,
    ProvisionRequest, Result as IsolationResult, SubprocessRunner,
};

/// Whether a `python3` interpreter is on the PATH. Tests that need to run
/// generated scripts return early without one.
pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Bridge running scripts with the host's `python3`.
pub fn python3_bridge() -> ExecutionBridge {
    ExecutionBridge::new(
        Arc::new(ExistingInterpreterProvisioner::new("python3")),
        Arc::new(SubprocessRunner),
    )
}

/// Bridge running scripts with `runner` in a directory with an empty `bin/python`.
pub fn fake_bridge(runner: Arc<FakeRunner>) -> ExecutionBridge {
    ExecutionBridge::new(Arc::new(FakeProvisioner::default()), runner)
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub provisioned: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl EnvironmentProvisioner for FakeProvisioner {
    async fn provision(&self, request: &ProvisionRequest<'_>) -> IsolationResult<()> {
        let bin = request.directory.join("bin");
        fs::create_dir_all(&bin).await?;
        fs::write(bin.join("python"), b"").await?;
        self.provisioned
            .lock()
            .unwrap()
            .push(request.directory.to_path_buf());
        Ok(())
    }
}

/// What a [`FakeRunner`] saw when it was invoked.
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub command: Vec<String>,
    pub input_existed: bool,
    pub string_args: String,
}

impl FakeCall {
    pub fn working_dir(&self) -> PathBuf {
        Path::new(&self.command[1])
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Runner standing in for the interpreter: records the call, optionally
/// waits, then writes `output` as the result artifact.
#[derive(Default)]
pub struct FakeRunner {
    pub output: Option<Vec<u8>>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<FakeCall>>,
}

impl FakeRunner {
    pub fn returning(output: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            output: Some(output.to_vec()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, command: &[String]) -> IsolationResult<()> {
        let call = FakeCall {
            command: command.to_vec(),
            input_existed: Path::new(&command[2]).exists(),
            string_args: std::fs::read_to_string(&command[4]).unwrap_or_default(),
        };
        self.calls.lock().unwrap().push(call);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref output) = self.output {
            fs::write(&command[3], output).await?;
        }
        Ok(())
    }
}

pub fn context(host: Arc<dyn HostHandle>, task_id: &str) -> ExecutionContext {
    ExecutionContext::new(
        "integration".to_string(),
        task_id.to_string(),
        format!("manual__{}", uuid::Uuid::new_v4()),
        Utc::now(),
        host,
    )
}

/// Writes task files for CLI runs.
pub struct TaskFileBuilder {
    task_id: String,
    source: String,
    op_args: Vec<String>,
    string_args: Vec<String>,
    python_version: Option<String>,
}

impl TaskFileBuilder {
    pub fn new(task_id: &str, source: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            source: source.to_string(),
            op_args: Vec::new(),
            string_args: Vec::new(),
            python_version: None,
        }
    }

    pub fn with_op_arg(mut self, arg: &str) -> Self {
        self.op_args.push(arg.to_string());
        self
    }

    pub fn with_string_arg(mut self, arg: &str) -> Self {
        self.string_args.push(arg.to_string());
        self
    }

    pub fn with_python_version(mut self, version: &str) -> Self {
        self.python_version = Some(version.to_string());
        self
    }

    pub fn generate_yaml(&self) -> String {
        let mut yaml = format!("task_id: {}\ncallable:\n  source: |\n", self.task_id);
        for line in self.source.lines() {
            yaml.push_str(&format!("    {}\n", line));
        }

        if !self.op_args.is_empty() {
            yaml.push_str(&format!("op_args: [{}]\n", self.op_args.join(", ")));
        }
        if !self.string_args.is_empty() {
            yaml.push_str("string_args:\n");
            for arg in &self.string_args {
                yaml.push_str(&format!("  - \"{}\"\n", arg));
            }
        }
        if let Some(ref version) = self.python_version {
            yaml.push_str(&format!("python_version: \"{}\"\n", version));
        }

        yaml
    }
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Config path that does not exist, so defaults and env vars apply.
    pub fn config_file(&self) -> PathBuf {
        self.path().join("pyoperator.yaml")
    }

    pub async fn create_task_file(&self, name: &str, builder: &TaskFileBuilder) -> PathBuf {
        let task_file = self.path().join(format!("{}.yaml", name));
        fs::write(&task_file, builder.generate_yaml())
            .await
            .expect("Failed to write task file");
        task_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_file_builder() {
        let yaml = TaskFileBuilder::new("add", "def add(a, b):\n    return a + b")
            .with_op_arg("2")
            .with_op_arg("3")
            .with_string_arg("alpha")
            .generate_yaml();

        assert!(yaml.contains("task_id: add"));
        assert!(yaml.contains("    def add(a, b):\n        return a + b\n"));
        assert!(yaml.contains("op_args: [2, 3]"));
        assert!(yaml.contains("  - \"alpha\""));
    }

    #[test]
    fn test_environment_setup() {
        let env = TestEnvironment::new();
        assert!(env.path().exists());
        assert!(!env.config_file().exists());
    }
}
