// ABOUTME: Operator running a callable inside a freshly provisioned interpreter environment
// ABOUTME: Validates the definition up front and delegates each invocation to the execution bridge

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use super::python::log_return_value;
use super::{merge_context, Operator};
use crate::engine::binding::{determine_op_kwargs, RESERVED_CONTEXT_KEYS};
use crate::engine::error::{OperatorError, Result};
use crate::engine::ExecutionContext;
use crate::isolation::{
    generate_driver_script, CallableSpec, Codec, EnvironmentSpec, ExecutionBridge, IsolatedCall,
    IsolationSettings, InvocationArgs,
};
use crate::value::{Kwargs, Value};

/// Runs a callable in its own environment, created and destroyed per run.
///
/// Only the callable's text (or import) crosses into the environment, so it
/// must do its own imports and cannot reference variables of the defining
/// scope. `string_args` are readable inside it through the
/// `virtualenv_string_args` global.
#[derive(Debug, Clone)]
pub struct IsolatedOperator {
    task_id: String,
    callable: Arc<CallableSpec>,
    environment: EnvironmentSpec,
    codec: Codec,
    op_args: Vec<Value>,
    op_kwargs: Arc<Kwargs>,
    string_args: Vec<String>,
    templates_dict: Option<Kwargs>,
    bridge: ExecutionBridge,
}

impl IsolatedOperator {
    pub fn builder(task_id: impl Into<String>) -> IsolatedOperatorBuilder {
        IsolatedOperatorBuilder::new(task_id)
    }

    pub fn callable(&self) -> &CallableSpec {
        &self.callable
    }

    pub fn environment(&self) -> &EnvironmentSpec {
        &self.environment
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn string_args(&self) -> &[String] {
        &self.string_args
    }

    /// Positional and keyword arguments the callable receives for `context`.
    pub fn invocation_args(&self, context: &ExecutionContext) -> Result<InvocationArgs> {
        let merged = merge_context(context, &self.op_kwargs, self.templates_dict.as_ref());
        let kwargs = determine_op_kwargs(self.callable.signature(), &merged, self.op_args.len())?;
        Ok(InvocationArgs::new(self.op_args.clone(), kwargs))
    }

    /// Driver script an invocation with `context` would run.
    pub fn render_script(&self, context: &ExecutionContext) -> Result<String> {
        let args = self.invocation_args(context)?;
        Ok(generate_driver_script(
            &self.callable,
            self.codec,
            !args.is_empty(),
        ))
    }
}

#[async_trait]
impl Operator for IsolatedOperator {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn operator_type(&self) -> &'static str {
        "isolated"
    }

    #[instrument(skip(self, context), fields(task_id = %self.task_id))]
    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>> {
        let args = self.invocation_args(context)?;
        info!(
            "Running {} in an isolated environment with {} requirement(s)",
            self.callable.name(),
            self.environment.requirements.len()
        );

        let result = self
            .bridge
            .execute(&IsolatedCall {
                task_id: &self.task_id,
                callable: &self.callable,
                args: &args,
                string_args: &self.string_args,
                environment: &self.environment,
                codec: self.codec,
            })
            .await?;

        log_return_value(&result);
        Ok(result)
    }
}

/// Collects an isolated operator definition; [`build`](Self::build) checks
/// it before anything touches the filesystem.
#[derive(Debug, Default)]
pub struct IsolatedOperatorBuilder {
    task_id: String,
    callable: Option<CallableSpec>,
    environment: EnvironmentSpec,
    codec: Codec,
    op_args: Vec<Value>,
    op_kwargs: Kwargs,
    string_args: Vec<String>,
    templates_dict: Option<Kwargs>,
    settings: IsolationSettings,
    bridge: Option<ExecutionBridge>,
}

impl IsolatedOperatorBuilder {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    pub fn callable(mut self, callable: CallableSpec) -> Self {
        self.callable = Some(callable);
        self
    }

    pub fn environment(mut self, environment: EnvironmentSpec) -> Self {
        self.environment = environment;
        self
    }

    pub fn requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn python_version(mut self, version: impl Into<String>) -> Self {
        self.environment.python_version = Some(version.into());
        self
    }

    pub fn system_site_packages(mut self, enabled: bool) -> Self {
        self.environment.system_site_packages = enabled;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn op_args(mut self, op_args: Vec<Value>) -> Self {
        self.op_args = op_args;
        self
    }

    pub fn op_kwargs(mut self, op_kwargs: Kwargs) -> Self {
        self.op_kwargs = op_kwargs;
        self
    }

    pub fn string_args<I, S>(mut self, string_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.string_args = string_args.into_iter().map(Into::into).collect();
        self
    }

    pub fn templates_dict(mut self, templates_dict: Kwargs) -> Self {
        self.templates_dict = Some(templates_dict);
        self
    }

    pub fn settings(mut self, settings: IsolationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `bridge` instead of one built from the settings.
    pub fn bridge(mut self, bridge: ExecutionBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self) -> Result<IsolatedOperator> {
        let task_id = self.task_id;
        let callable = self
            .callable
            .ok_or_else(|| OperatorError::validation(&task_id, "a callable is required"))?;

        if !callable.has_signature() {
            return Err(OperatorError::validation(
                &task_id,
                format!(
                    "the signature of '{}' is unknown; declare a signature for module callables",
                    callable.name()
                ),
            ));
        }

        if callable.signature().first_param() == Some("self") {
            return Err(OperatorError::validation(
                &task_id,
                format!("'{}' looks like a method; only plain functions are supported", callable.name()),
            ));
        }

        if let Some(package) = self.codec.required_package() {
            if !self.environment.system_site_packages
                && !self.codec.is_satisfied_by(&self.environment.requirements)
            {
                return Err(OperatorError::validation(
                    &task_id,
                    format!(
                        "the {} codec needs {} listed in requirements when system_site_packages is disabled",
                        self.codec, package
                    ),
                ));
            }
        }

        if let Some(major) = self.environment.major_version() {
            let host_major = self.settings.host_major_version();
            if major != host_major && (!self.op_args.is_empty() || !self.op_kwargs.is_empty()) {
                return Err(OperatorError::validation(
                    &task_id,
                    format!(
                        "passing op_args or op_kwargs is not supported across major Python versions \
                         (host {}, requested {}); use string_args instead",
                        host_major, major
                    ),
                ));
            }
        }

        callable
            .signature()
            .check_reserved(self.op_args.len(), RESERVED_CONTEXT_KEYS.iter().copied())?;

        let bridge = self
            .bridge
            .unwrap_or_else(|| ExecutionBridge::from_settings(&self.settings));

        Ok(IsolatedOperator {
            task_id,
            callable: Arc::new(callable),
            environment: self.environment,
            codec: self.codec,
            op_args: self.op_args,
            op_kwargs: Arc::new(self.op_kwargs),
            string_args: self.string_args,
            templates_dict: self.templates_dict,
            bridge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::binding::Signature;
    use crate::engine::LocalHost;
    use chrono::Utc;

    fn add() -> CallableSpec {
        CallableSpec::from_source("def add(a, b):\n    return a + b\n").unwrap()
    }

    #[test]
    fn test_callable_is_required() {
        let err = IsolatedOperator::builder("missing").build().unwrap_err();
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_yaml_codec_needs_pyyaml_without_site_packages() {
        let build = |requirements: Vec<&str>| {
            IsolatedOperator::builder("yaml")
                .callable(add())
                .codec(Codec::Yaml)
                .system_site_packages(false)
                .requirements(requirements)
                .build()
        };

        assert!(build(vec![]).is_err());
        assert!(build(vec!["requests"]).is_err());
        assert!(build(vec!["PyYAML==6.0.1"]).is_ok());

        let with_site_packages = IsolatedOperator::builder("yaml")
            .callable(add())
            .codec(Codec::Yaml)
            .build();
        assert!(with_site_packages.is_ok());
    }

    #[test]
    fn test_cross_major_version_rejects_arguments() {
        let err = IsolatedOperator::builder("legacy")
            .callable(add())
            .python_version("2.7")
            .op_args(vec![Value::from(1), Value::from(2)])
            .build()
            .unwrap_err();
        assert!(matches!(err, OperatorError::Validation { .. }));
        assert!(err.to_string().contains("string_args"));

        let ok = IsolatedOperator::builder("legacy")
            .callable(CallableSpec::from_source("def report():\n    pass\n").unwrap())
            .python_version("2")
            .string_args(["a", "b"])
            .build();
        assert!(ok.is_ok());

        let same_major = IsolatedOperator::builder("modern")
            .callable(add())
            .python_version("3.11")
            .op_args(vec![Value::from(1), Value::from(2)])
            .build();
        assert!(same_major.is_ok());
    }

    #[test]
    fn test_reserved_positional_names_are_rejected() {
        let callable =
            CallableSpec::from_source("def load(ds, path):\n    return path\n").unwrap();
        let err = IsolatedOperator::builder("load")
            .callable(callable)
            .op_args(vec![Value::from("2024-01-01")])
            .build()
            .unwrap_err();
        assert!(matches!(err, OperatorError::ReservedName { .. }));
    }

    #[test]
    fn test_module_callable_needs_declared_signature() {
        let module = || CallableSpec::from_module("etl.jobs", "load").unwrap();

        let err = IsolatedOperator::builder("load")
            .callable(module())
            .build()
            .unwrap_err();
        assert!(err.is_definition_error());
        assert!(err.to_string().contains("declare a signature"));

        let declared = IsolatedOperator::builder("load")
            .callable(module().with_signature(Signature::new(["path"])))
            .build();
        assert!(declared.is_ok());
    }

    #[test]
    fn test_multiline_header_keeps_op_kwargs() {
        let callable =
            CallableSpec::from_source("def add(\n    a,\n    b,\n):\n    return a + b\n").unwrap();
        let mut op_kwargs = Kwargs::new();
        op_kwargs.insert("a".to_string(), Value::from(2));
        op_kwargs.insert("b".to_string(), Value::from(3));

        let operator = IsolatedOperator::builder("add")
            .callable(callable)
            .op_kwargs(op_kwargs.clone())
            .build()
            .unwrap();
        let context = ExecutionContext::new(
            "math".to_string(),
            "add".to_string(),
            "manual__1".to_string(),
            Utc::now(),
            Arc::new(LocalHost::new()),
        );

        let args = operator.invocation_args(&context).unwrap();
        assert_eq!(args.kwargs, op_kwargs);
    }
}
