// ABOUTME: Functional task definitions that register an operator per call
// ABOUTME: Derives unique task ids and optionally unrolls mapping results into keyed outputs

use async_trait::async_trait;
use std::sync::Arc;

use super::{CallArgs, FunctionOperator, Operator, TaskFn, TaskRegistry};
use crate::engine::binding::Signature;
use crate::engine::error::{OperatorError, Result};
use crate::engine::ExecutionContext;
use crate::value::{describe, Kwargs, Value};

/// Reference to the output of a registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub task_id: String,
    /// `None` refers to the whole return value.
    pub key: Option<String>,
}

impl OutputRef {
    /// Reference one keyed output of the same task.
    pub fn key(&self, key: impl Into<String>) -> Self {
        Self {
            task_id: self.task_id.clone(),
            key: Some(key.into()),
        }
    }
}

/// Turns a callable into tasks: every [`call`](TaskDecorator::call) registers
/// a new operator running it with the given arguments.
#[derive(Clone)]
pub struct TaskDecorator {
    task_id: String,
    signature: Signature,
    callable: TaskFn,
    multiple_outputs: bool,
}

impl std::fmt::Debug for TaskDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDecorator")
            .field("task_id", &self.task_id)
            .field("signature", &self.signature)
            .field("multiple_outputs", &self.multiple_outputs)
            .finish()
    }
}

impl TaskDecorator {
    /// `name` is the callable's name and the default task id.
    pub fn new<F>(name: impl Into<String>, signature: Signature, callable: F) -> Result<Self>
    where
        F: Fn(CallArgs) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        let task_id = name.into();
        if signature.accepts("self") {
            return Err(OperatorError::validation(
                task_id,
                "task definitions do not support methods",
            ));
        }

        Ok(Self {
            task_id,
            signature,
            callable: Arc::new(callable),
            multiple_outputs: false,
        })
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_multiple_outputs(mut self, multiple_outputs: bool) -> Self {
        self.multiple_outputs = multiple_outputs;
        self
    }

    /// Register a task calling the function with `op_args` and `op_kwargs`.
    pub fn call(
        &self,
        registry: &mut TaskRegistry,
        op_args: Vec<Value>,
        op_kwargs: Kwargs,
    ) -> Result<OutputRef> {
        self.signature
            .bind(op_args.len(), &op_kwargs)
            .map_err(|reason| OperatorError::validation(&self.task_id, reason))?;

        let task_id = registry.unique_task_id(&self.task_id);
        let inner = FunctionOperator::from_shared(
            task_id.clone(),
            self.signature.clone(),
            Arc::clone(&self.callable),
        )
        .with_op_args(op_args)
        .with_op_kwargs(op_kwargs);

        registry.register(Arc::new(FunctionalOperator {
            inner,
            multiple_outputs: self.multiple_outputs,
        }))?;

        Ok(OutputRef { task_id, key: None })
    }
}

/// Operator registered by [`TaskDecorator::call`]. The callable receives the
/// captured arguments only, never the host context.
#[derive(Clone)]
pub struct FunctionalOperator {
    inner: FunctionOperator,
    multiple_outputs: bool,
}

impl FunctionalOperator {
    pub fn multiple_outputs(&self) -> bool {
        self.multiple_outputs
    }

    async fn push_outputs(&self, context: &ExecutionContext, result: &Option<Value>) -> Result<()> {
        let task_id = self.task_id();
        let mapping = match result {
            Some(Value::Mapping(mapping)) => mapping,
            other => {
                return Err(OperatorError::InvalidOutputs {
                    task_id: task_id.to_string(),
                    reason: format!(
                        "returned {} where a mapping was expected",
                        other
                            .as_ref()
                            .map(describe)
                            .unwrap_or_else(|| "None".to_string())
                    ),
                })
            }
        };

        let mut outputs = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key = key.as_str().ok_or_else(|| OperatorError::InvalidOutputs {
                task_id: task_id.to_string(),
                reason: format!("mapping keys must be strings, found {}", describe(key)),
            })?;
            outputs.push((key, value));
        }

        for (key, value) in outputs {
            context
                .host()
                .push_output(task_id, key, value.clone())
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Operator for FunctionalOperator {
    fn task_id(&self) -> &str {
        self.inner.task_id()
    }

    fn operator_type(&self) -> &'static str {
        "functional"
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>> {
        let result = self.inner.call(self.inner.op_kwargs().as_ref().clone())?;

        if self.multiple_outputs {
            self.push_outputs(context, &result).await?;
        }
        Ok(result)
    }
}
