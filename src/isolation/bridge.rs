// ABOUTME: Isolated execution pipeline for a single callable invocation
// ABOUTME: Marshals arguments, writes the driver script, provisions the environment, runs it and reads the result

use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument};

use super::callable::CallableSpec;
use super::codec::Codec;
use super::error::{IsolationError, Result};
use super::marshal::{write_args, write_string_args, ExecutionArtifacts, InvocationArgs};
use super::provision::{interpreter_path, EnvironmentProvisioner, EnvironmentSpec, ProvisionRequest};
use super::runner::{read_result, ProcessRunner, SubprocessRunner};
use super::script::generate_driver_script;
use super::settings::IsolationSettings;
use crate::engine::result::{InvocationState, InvocationTracker};
use crate::value::Value;

/// Everything needed for one isolated call.
#[derive(Debug, Clone)]
pub struct IsolatedCall<'a> {
    pub task_id: &'a str,
    pub callable: &'a CallableSpec,
    pub args: &'a InvocationArgs,
    pub string_args: &'a [String],
    pub environment: &'a EnvironmentSpec,
    pub codec: Codec,
}

/// Runs callables in freshly provisioned environments.
///
/// Each call gets its own temporary directory and interpreter process, so a
/// bridge can be shared between concurrent invocations.
#[derive(Clone)]
pub struct ExecutionBridge {
    provisioner: Arc<dyn EnvironmentProvisioner>,
    runner: Arc<dyn ProcessRunner>,
    temp_prefix: String,
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("temp_prefix", &self.temp_prefix)
            .finish_non_exhaustive()
    }
}

impl ExecutionBridge {
    pub fn new(provisioner: Arc<dyn EnvironmentProvisioner>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            provisioner,
            runner,
            temp_prefix: "venv".to_string(),
        }
    }

    pub fn from_settings(settings: &IsolationSettings) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SubprocessRunner);
        Self::new(settings.provisioner(Arc::clone(&runner)), runner)
            .with_temp_prefix(&settings.temp_prefix)
    }

    pub fn with_temp_prefix(mut self, prefix: &str) -> Self {
        self.temp_prefix = prefix.to_string();
        self
    }

    /// Run `call` and return its result, `None` when it returned nothing.
    ///
    /// The temporary directory is removed when this future completes or is
    /// dropped.
    #[instrument(skip(self, call), fields(task_id = %call.task_id, callable = %call.callable.name()))]
    pub async fn execute(&self, call: &IsolatedCall<'_>) -> Result<Option<Value>> {
        let tmp_dir = tempfile::Builder::new()
            .prefix(&self.temp_prefix)
            .tempdir()?;
        let artifacts = ExecutionArtifacts::in_dir(tmp_dir.path());
        let mut tracker = InvocationTracker::new(call.task_id);

        let pass_args = write_args(&artifacts.input, call.args, call.codec).await?;
        write_string_args(&artifacts.string_args, call.string_args).await?;
        tracker.advance(InvocationState::ArgsMarshalled);

        let script = generate_driver_script(call.callable, call.codec, pass_args);
        debug!("Writing code to file\n{}", script);
        fs::write(&artifacts.script, &script).await?;
        tracker.advance(InvocationState::ScriptGenerated);

        let interpreter = match self.provision(tmp_dir.path(), call.environment).await {
            Ok(interpreter) => interpreter,
            Err(err) => {
                tracker.advance(InvocationState::ProvisioningFailed);
                return Err(err);
            }
        };
        tracker.advance(InvocationState::EnvProvisioned);

        let command = python_command(&interpreter, &artifacts);
        tracker.advance(InvocationState::SubprocessRunning);
        if let Err(err) = self.runner.run(&command).await {
            tracker.advance(InvocationState::SubprocessFailed);
            return Err(err);
        }

        let result = read_result(&artifacts.output, call.codec).await;
        tracker.advance(read_outcome(&result));
        if result.is_ok() {
            info!(
                "Isolated call of {} finished in {:?}",
                call.callable.name(),
                tracker.elapsed()
            );
        }
        result
    }

    async fn provision(&self, directory: &Path, spec: &EnvironmentSpec) -> Result<std::path::PathBuf> {
        self.provisioner
            .provision(&ProvisionRequest::new(directory, spec))
            .await?;

        let interpreter = interpreter_path(directory);
        if fs::metadata(&interpreter).await.is_err() {
            return Err(IsolationError::Provisioning {
                directory: directory.to_path_buf(),
                message: format!("no interpreter found at {}", interpreter.display()),
            });
        }
        Ok(interpreter)
    }
}

/// Final state once the result artifact has been read. Only an undecodable
/// document is a decode failure; an unreadable artifact counts against the run.
fn read_outcome(result: &Result<Option<Value>>) -> InvocationState {
    match result {
        Ok(_) => InvocationState::Success,
        Err(IsolationError::Decode { .. }) => InvocationState::DecodeFailed,
        Err(_) => InvocationState::SubprocessFailed,
    }
}

/// `[interpreter, script, input, output, string_args]`
pub fn python_command(interpreter: &Path, artifacts: &ExecutionArtifacts) -> Vec<String> {
    [
        interpreter,
        artifacts.script.as_path(),
        artifacts.input.as_path(),
        artifacts.output.as_path(),
        artifacts.string_args.as_path(),
    ]
    .iter()
    .map(|path| path.display().to_string())
    .collect()
}
