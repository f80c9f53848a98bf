// ABOUTME: Short-circuit operator gating downstream tasks on a condition
// ABOUTME: A falsy callable result skips every task downstream of this one

use async_trait::async_trait;
use tracing::{debug, info};

use super::{FunctionOperator, Operator};
use crate::engine::error::Result;
use crate::engine::ExecutionContext;
use crate::value::{describe, is_truthy, Value};

#[derive(Clone)]
pub struct ShortCircuitOperator {
    inner: FunctionOperator,
}

impl ShortCircuitOperator {
    pub fn new(inner: FunctionOperator) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Operator for ShortCircuitOperator {
    fn task_id(&self) -> &str {
        self.inner.task_id()
    }

    fn operator_type(&self) -> &'static str {
        "short_circuit"
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<Option<Value>> {
        let condition = self.inner.execute(context).await?;
        info!(
            "Condition result is {}",
            condition
                .as_ref()
                .map(describe)
                .unwrap_or_else(|| "None".to_string())
        );

        if condition.as_ref().is_some_and(is_truthy) {
            info!("Proceeding with downstream tasks...");
            return Ok(None);
        }

        info!("Skipping downstream tasks...");
        let host = context.host();
        let downstream = host.downstream_task_ids(self.task_id()).await?;
        debug!("Downstream task_ids {:?}", downstream);

        if !downstream.is_empty() {
            host.skip(&downstream).await?;
        }

        info!("Done.");
        Ok(None)
    }
}
