// ABOUTME: In-process function operator
// ABOUTME: Binds context and operator arguments to a Rust callable and reports its return value

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{merge_context, Operator};
use crate::engine::binding::{determine_op_kwargs, Signature};
use crate::engine::error::{OperatorError, Result};
use crate::engine::ExecutionContext;
use crate::value::{describe, Kwargs, Value};

/// Arguments a task callable is invoked with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl CallArgs {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

pub type TaskFn = Arc<dyn Fn(CallArgs) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Runs a callable in the host process.
///
/// Cloning shares the callable and `op_kwargs`.
#[derive(Clone)]
pub struct FunctionOperator {
    task_id: String,
    signature: Signature,
    callable: TaskFn,
    op_args: Vec<Value>,
    op_kwargs: Arc<Kwargs>,
    templates_dict: Option<Kwargs>,
}

impl FunctionOperator {
    pub fn new<F>(task_id: impl Into<String>, signature: Signature, callable: F) -> Self
    where
        F: Fn(CallArgs) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        Self::from_shared(task_id, signature, Arc::new(callable))
    }

    pub fn from_shared(task_id: impl Into<String>, signature: Signature, callable: TaskFn) -> Self {
        Self {
            task_id: task_id.into(),
            signature,
            callable,
            op_args: Vec::new(),
            op_kwargs: Arc::new(Kwargs::new()),
            templates_dict: None,
        }
    }

    pub fn with_op_args(mut self, op_args: Vec<Value>) -> Self {
        self.op_args = op_args;
        self
    }

    pub fn with_op_kwargs(mut self, op_kwargs: Kwargs) -> Self {
        self.op_kwargs = Arc::new(op_kwargs);
        self
    }

    pub fn with_templates_dict(mut self, templates_dict: Kwargs) -> Self {
        self.templates_dict = Some(templates_dict);
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn op_args(&self) -> &[Value] {
        &self.op_args
    }

    pub fn op_kwargs(&self) -> &Arc<Kwargs> {
        &self.op_kwargs
    }

    /// Keyword arguments the callable receives for `context`.
    pub fn resolve_kwargs(&self, context: &ExecutionContext) -> Result<Kwargs> {
        let merged = merge_context(context, &self.op_kwargs, self.templates_dict.as_ref());
        determine_op_kwargs(&self.signature, &merged, self.op_args.len())
    }

    /// Call the wrapped function with `op_args` and `kwargs` as given.
    pub(crate) fn call(&self, kwargs: Kwargs) -> Result<Option<Value>> {
        (self.callable)(CallArgs {
            args: self.op_args.clone(),
            kwargs,
        })
        .map_err(|e| OperatorError::CallableFailed {
            task_id: self.task_id.clone(),
            message: format!("{:#}", e),
        })
    }
}

pub(crate) fn log_return_value(result: &Option<Value>) {
    match result {
        Some(value) => info!("Done. Returned value was: {}", describe(value)),
        None => info!("Done. Returned value was: None"),
    }
}

#[async_trait]
impl Operator for FunctionOperator {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn operator_type(&self) -> &'static str {
        "python"
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>> {
        let kwargs = self.resolve_kwargs(context)?;
        let result = self.call(kwargs)?;
        log_return_value(&result);
        Ok(result)
    }
}
