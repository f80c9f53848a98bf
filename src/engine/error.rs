// ABOUTME: Error types for operator construction and execution
// ABOUTME: Defines validation, reserved-name, callable and host errors and wraps isolated execution failures

use thiserror::Error;

use crate::isolation::IsolationError;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Invalid operator definition for {task_id}: {reason}")]
    Validation { task_id: String, reason: String },

    #[error("The key {name} in the op_args is part of the context, and therefore reserved")]
    ReservedName { name: String },

    #[error("Isolated execution failed: {0}")]
    Isolation(#[from] IsolationError),

    #[error("Callable for task {task_id} failed: {message}")]
    CallableFailed { task_id: String, message: String },

    #[error("Branch task {task_id} must return a task id or a list of task ids, got {found}")]
    InvalidBranch { task_id: String, found: String },

    #[error("Task {task_id} cannot unroll its return value into multiple outputs: {reason}")]
    InvalidOutputs { task_id: String, reason: String },

    #[error("Duplicate task id: {task_id}")]
    DuplicateTask { task_id: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Host error: {0}")]
    Host(String),
}

impl OperatorError {
    pub fn validation(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    /// Construction-time errors are raised before any file or process is touched.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::ReservedName { .. } | Self::DuplicateTask { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
