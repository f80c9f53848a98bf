// ABOUTME: Task operators wrapping callables for execution by a workflow host
// ABOUTME: Defines the Operator trait and the registry that owns operators by task id

pub mod branch;
pub mod decorator;
pub mod isolated;
pub mod python;
pub mod short_circuit;

pub use branch::BranchOperator;
pub use decorator::{FunctionalOperator, OutputRef, TaskDecorator};
pub use isolated::{IsolatedOperator, IsolatedOperatorBuilder};
pub use python::{CallArgs, FunctionOperator, TaskFn};
pub use short_circuit::ShortCircuitOperator;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

use crate::engine::error::{OperatorError, Result};
use crate::engine::ExecutionContext;
use crate::value::{kwargs_to_mapping, Kwargs, Value};

#[async_trait]
pub trait Operator: Send + Sync {
    fn task_id(&self) -> &str;
    fn operator_type(&self) -> &'static str;

    /// Run the task. The returned value is what the host hands downstream.
    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>>;
}

/// Host context merged with the operator's keyword arguments and templates.
pub(crate) fn merge_context(
    context: &ExecutionContext,
    op_kwargs: &Kwargs,
    templates_dict: Option<&Kwargs>,
) -> Kwargs {
    let mut merged = context.entries().clone();
    merged.extend(op_kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.insert(
        "templates_dict".to_string(),
        templates_dict
            .map(|templates| Value::Mapping(kwargs_to_mapping(templates)))
            .unwrap_or(Value::Null),
    );
    merged
}

/// Operators of one workflow, in registration order.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    operators: IndexMap<String, Arc<dyn Operator>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operator: Arc<dyn Operator>) -> Result<()> {
        let task_id = operator.task_id().to_string();
        if self.operators.contains_key(&task_id) {
            return Err(OperatorError::DuplicateTask { task_id });
        }
        debug!("Registered {} task {}", operator.operator_type(), task_id);
        self.operators.insert(task_id, operator);
        Ok(())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.operators.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Result<Arc<dyn Operator>> {
        self.operators
            .get(task_id)
            .cloned()
            .ok_or_else(|| OperatorError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.operators.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// `task_id` if it is free, otherwise `core__N` with N one above the
    /// highest counter already taken for the same core id.
    pub fn unique_task_id(&self, task_id: &str) -> String {
        if !self.contains(task_id) {
            return task_id.to_string();
        }

        let core = split_counter(task_id).0;
        let highest = self
            .operators
            .keys()
            .filter_map(|existing| match split_counter(existing) {
                (existing_core, Some(counter)) if existing_core == core => Some(counter),
                _ => None,
            })
            .max();

        format!("{}__{}", core, highest.map_or(1, |counter| counter + 1))
    }

    /// Execute `task_id` with a context derived from `context`.
    pub async fn execute_task(
        &self,
        task_id: &str,
        context: &ExecutionContext,
    ) -> Result<Option<Value>> {
        let operator = self.get(task_id)?;
        operator
            .execute(&context.for_task(task_id.to_string()))
            .await
    }
}

/// Split `name__12` into `("name", Some(12))`.
fn split_counter(task_id: &str) -> (&str, Option<u64>) {
    if let Some((core, counter)) = task_id.rsplit_once("__") {
        if !core.is_empty()
            && !counter.is_empty()
            && counter.chars().all(|c| c.is_ascii_digit())
        {
            if let Ok(counter) = counter.parse() {
                return (core, Some(counter));
            }
        }
    }
    (task_id, None)
}
