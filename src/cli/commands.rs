// ABOUTME: Command implementations for the pyoperator CLI
// ABOUTME: Loads task files and handles the run, validate and render commands

use anyhow::{Context as _, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::args::Args;
use super::config::Config;
use crate::engine::binding::Signature;
use crate::engine::{ExecutionContext, LocalHost};
use crate::isolation::{CallableSpec, Codec, EnvironmentSpec};
use crate::operators::{IsolatedOperator, Operator};
use crate::value::{Kwargs, Value};

/// An isolated task as written in a task file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub task_id: String,

    #[serde(default = "default_dag_id")]
    pub dag_id: String,

    pub callable: CallableDefinition,

    #[serde(flatten)]
    pub environment: EnvironmentSpec,

    #[serde(default)]
    pub codec: Codec,

    #[serde(default)]
    pub op_args: Vec<Value>,

    #[serde(default)]
    pub op_kwargs: Kwargs,

    #[serde(default)]
    pub string_args: Vec<String>,

    #[serde(default)]
    pub templates_dict: Option<Kwargs>,
}

fn default_dag_id() -> String {
    "adhoc".to_string()
}

/// Either inline `source` or a `module` + `function` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallableDefinition {
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub function: Option<String>,

    /// Required for module references; overrides the signature read from an
    /// inline `def` header.
    #[serde(default)]
    pub signature: Option<Signature>,
}

impl CallableDefinition {
    pub fn to_spec(&self) -> Result<CallableSpec> {
        let spec = match (&self.source, &self.module, &self.function) {
            (Some(source), None, None) => CallableSpec::from_source(source)?,
            (None, Some(module), Some(function)) => CallableSpec::from_module(module, function)?,
            _ => {
                return Err(anyhow::anyhow!(
                    "callable needs either 'source' or both 'module' and 'function'"
                ))
            }
        };

        Ok(match self.signature {
            Some(ref signature) => spec.with_signature(signature.clone()),
            None => spec,
        })
    }
}

impl TaskFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read task file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse task file {}", path.display()))
    }

    /// Build the operator, appending command-line kwargs and string args.
    pub fn build_operator(
        &self,
        config: &Config,
        extra_kwargs: Kwargs,
        extra_string_args: &[String],
    ) -> Result<IsolatedOperator> {
        let mut op_kwargs = self.op_kwargs.clone();
        op_kwargs.extend(extra_kwargs);

        let mut builder = IsolatedOperator::builder(&self.task_id)
            .callable(self.callable.to_spec()?)
            .environment(self.environment.clone())
            .codec(self.codec)
            .op_args(self.op_args.clone())
            .op_kwargs(op_kwargs)
            .string_args(self.string_args.iter().chain(extra_string_args).cloned())
            .settings(config.isolation.clone());

        if let Some(ref templates_dict) = self.templates_dict {
            builder = builder.templates_dict(templates_dict.clone());
        }

        Ok(builder.build()?)
    }

    /// Context of a one-off run outside any scheduler.
    pub fn standalone_context(&self) -> ExecutionContext {
        ExecutionContext::new(
            self.dag_id.clone(),
            self.task_id.clone(),
            format!("manual__{}", uuid::Uuid::new_v4()),
            Utc::now(),
            Arc::new(LocalHost::new()),
        )
    }
}

/// Execute a task file
pub async fn run_task(
    task_path: PathBuf,
    kwargs: Vec<String>,
    string_args: Vec<String>,
    config: &Config,
) -> Result<()> {
    info!("Starting task execution: {}", task_path.display());

    let task = TaskFile::load(&task_path).await?;
    let extra_kwargs = Args::parse_kwargs(&kwargs)?;
    let operator = task
        .build_operator(config, extra_kwargs, &string_args)
        .map_err(|e| anyhow::anyhow!("Invalid task '{}': {:#}", task.task_id, e))?;

    let context = task.standalone_context();
    info!("Run id: {}", context.run_id);

    let result = operator
        .execute(&context)
        .await
        .map_err(|e| anyhow::anyhow!("Task '{}' failed: {}", task.task_id, e))?;

    match result {
        Some(value) => print!("{}", serde_yaml::to_string(&value)?),
        None => println!("no value"),
    }

    info!("Task execution completed");
    Ok(())
}

/// Validate a task file
pub async fn validate_task(task_path: PathBuf, config: &Config) -> Result<()> {
    info!("Validating task: {}", task_path.display());

    let task = TaskFile::load(&task_path).await?;
    let operator = task
        .build_operator(config, Kwargs::new(), &[])
        .map_err(|e| anyhow::anyhow!("Task validation failed: {:#}", e))?;

    println!("✓ Task '{}' is valid", task.task_id);
    println!("  Callable: {}", operator.callable().name());
    println!("  Codec: {}", operator.codec());
    println!(
        "  Requirements: {}",
        operator.environment().requirements.len()
    );

    info!("Task validation completed successfully");
    Ok(())
}

/// Print the driver script for a task file
pub async fn render_task(task_path: PathBuf, config: &Config) -> Result<()> {
    let task = TaskFile::load(&task_path).await?;
    let operator = task
        .build_operator(config, Kwargs::new(), &[])
        .map_err(|e| anyhow::anyhow!("Invalid task '{}': {:#}", task.task_id, e))?;

    let script = operator.render_script(&task.standalone_context())?;
    print!("{}", script);
    Ok(())
}
