// ABOUTME: Branching operator that follows only the downstream tasks its callable selects
// ABOUTME: Every other direct downstream task is skipped through the host handle

use async_trait::async_trait;

use super::{FunctionOperator, Operator};
use crate::engine::error::{OperatorError, Result};
use crate::engine::ExecutionContext;
use crate::value::{describe, Value};

/// The callable returns a task id or a list of task ids to follow. Those
/// should be direct downstream tasks of this one.
#[derive(Clone)]
pub struct BranchOperator {
    inner: FunctionOperator,
}

impl BranchOperator {
    pub fn new(inner: FunctionOperator) -> Self {
        Self { inner }
    }
}

fn branch_targets(task_id: &str, result: &Option<Value>) -> Result<Vec<String>> {
    let invalid = || OperatorError::InvalidBranch {
        task_id: task_id.to_string(),
        found: result
            .as_ref()
            .map(describe)
            .unwrap_or_else(|| "None".to_string()),
    };

    match result {
        Some(Value::String(branch)) => Ok(vec![branch.clone()]),
        Some(Value::Sequence(branches)) => branches
            .iter()
            .map(|branch| branch.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

#[async_trait]
impl Operator for BranchOperator {
    fn task_id(&self) -> &str {
        self.inner.task_id()
    }

    fn operator_type(&self) -> &'static str {
        "branch"
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>> {
        let result = self.inner.execute(context).await?;
        let branches = branch_targets(self.task_id(), &result)?;
        context
            .host()
            .skip_all_except(self.task_id(), &branches)
            .await?;
        Ok(result)
    }
}
