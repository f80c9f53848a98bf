// ABOUTME: Host execution context handed to operators on every invocation
// ABOUTME: Holds the reserved context entries and the handle operators use to talk back to the host

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::error::Result;
use crate::value::{Kwargs, Mapping, Value};

/// Operations the orchestration host exposes to a running task.
#[async_trait]
pub trait HostHandle: Send + Sync {
    /// Mark every task directly downstream of `task_id` as skipped, except `keep`.
    async fn skip_all_except(&self, task_id: &str, keep: &[String]) -> Result<()>;

    /// All tasks downstream of `task_id`, direct or not.
    async fn downstream_task_ids(&self, task_id: &str) -> Result<Vec<String>>;

    /// Mark the given tasks of the current run as skipped.
    async fn skip(&self, task_ids: &[String]) -> Result<()>;

    /// Publish a keyed output of `task_id` for downstream tasks.
    async fn push_output(&self, task_id: &str, key: &str, value: Value) -> Result<()>;
}

#[derive(Clone)]
pub struct ExecutionContext {
    pub dag_id: String,
    pub task_id: String,
    pub run_id: String,
    pub execution_date: DateTime<Utc>,
    entries: Kwargs,
    host: Arc<dyn HostHandle>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("dag_id", &self.dag_id)
            .field("task_id", &self.task_id)
            .field("run_id", &self.run_id)
            .field("execution_date", &self.execution_date)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(
        dag_id: String,
        task_id: String,
        run_id: String,
        execution_date: DateTime<Utc>,
        host: Arc<dyn HostHandle>,
    ) -> Self {
        let mut context = Self {
            dag_id,
            task_id,
            run_id,
            execution_date,
            entries: Kwargs::new(),
            host,
        };
        context.fill_reserved_entries();
        context
    }

    /// Context for another task of the same run, sharing the host handle.
    pub fn for_task(&self, task_id: String) -> Self {
        let mut context = Self {
            dag_id: self.dag_id.clone(),
            task_id,
            run_id: self.run_id.clone(),
            execution_date: self.execution_date,
            entries: self.entries.clone(),
            host: Arc::clone(&self.host),
        };
        context.fill_reserved_entries();
        context
    }

    fn fill_reserved_entries(&mut self) {
        let ds = self.execution_date.format("%Y-%m-%d").to_string();
        let ts = self.execution_date.to_rfc3339();

        let mut ti = Mapping::new();
        ti.insert("dag_id".into(), self.dag_id.clone().into());
        ti.insert("task_id".into(), self.task_id.clone().into());
        ti.insert("run_id".into(), self.run_id.clone().into());

        let mut task = Mapping::new();
        task.insert("task_id".into(), self.task_id.clone().into());

        let mut dag_run = Mapping::new();
        dag_run.insert("dag_id".into(), self.dag_id.clone().into());
        dag_run.insert("run_id".into(), self.run_id.clone().into());
        dag_run.insert("execution_date".into(), ts.clone().into());

        self.insert("ds", Value::from(ds.clone()));
        self.insert("ds_nodash", Value::from(ds.replace('-', "")));
        self.insert("ts", Value::from(ts.clone()));
        self.insert("execution_date", Value::from(ts));
        self.insert("run_id", Value::from(self.run_id.clone()));
        self.insert(
            "task_instance_key_str",
            Value::from(format!(
                "{}__{}__{}",
                self.dag_id,
                self.task_id,
                ds.replace('-', "")
            )),
        );
        self.insert("ti", Value::Mapping(ti.clone()));
        self.insert("task_instance", Value::Mapping(ti));
        self.insert("task", Value::Mapping(task));
        self.insert("dag_run", Value::Mapping(dag_run));
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &Kwargs {
        &self.entries
    }

    pub fn host(&self) -> &Arc<dyn HostHandle> {
        &self.host
    }
}

/// In-memory host used when operators run outside a scheduler.
///
/// Skips and pushed outputs are recorded so callers can inspect them.
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    downstream: HashMap<String, Vec<String>>,
    state: Arc<RwLock<LocalHostState>>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalHostState {
    pub skipped: Vec<String>,
    pub outputs: IndexMap<String, Kwargs>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the direct downstream tasks of `task_id`.
    pub fn with_downstream<I, S>(mut self, task_id: &str, downstream: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.downstream.insert(
            task_id.to_string(),
            downstream.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub async fn skipped(&self) -> Vec<String> {
        self.state.read().await.skipped.clone()
    }

    pub async fn outputs(&self, task_id: &str) -> Kwargs {
        let state = self.state.read().await;
        state.outputs.get(task_id).cloned().unwrap_or_default()
    }

    fn direct_downstream(&self, task_id: &str) -> &[String] {
        self.downstream
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    async fn mark_skipped(&self, task_ids: impl IntoIterator<Item = String>) {
        let mut state = self.state.write().await;
        for task_id in task_ids {
            if !state.skipped.contains(&task_id) {
                state.skipped.push(task_id);
            }
        }
    }
}

#[async_trait]
impl HostHandle for LocalHost {
    async fn skip_all_except(&self, task_id: &str, keep: &[String]) -> Result<()> {
        let to_skip: Vec<String> = self
            .direct_downstream(task_id)
            .iter()
            .filter(|candidate| !keep.contains(*candidate))
            .cloned()
            .collect();
        info!("Following branch {:?}, skipping {:?}", keep, to_skip);
        self.mark_skipped(to_skip).await;
        Ok(())
    }

    async fn downstream_task_ids(&self, task_id: &str) -> Result<Vec<String>> {
        let mut found: Vec<String> = Vec::new();
        let mut pending: Vec<String> = self.direct_downstream(task_id).to_vec();

        while let Some(next) = pending.pop() {
            if found.contains(&next) {
                continue;
            }
            pending.extend(self.direct_downstream(&next).iter().cloned());
            found.push(next);
        }

        found.sort();
        Ok(found)
    }

    async fn skip(&self, task_ids: &[String]) -> Result<()> {
        self.mark_skipped(task_ids.iter().cloned()).await;
        Ok(())
    }

    async fn push_output(&self, task_id: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .outputs
            .entry(task_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(host: Arc<dyn HostHandle>) -> ExecutionContext {
        ExecutionContext::new(
            "etl".to_string(),
            "extract".to_string(),
            "manual__1".to_string(),
            Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
            host,
        )
    }

    #[test]
    fn test_reserved_entries_are_filled() {
        let context = context(Arc::new(LocalHost::new()));

        assert_eq!(context.get("ds"), Some(&Value::from("2024-03-09")));
        assert_eq!(context.get("ds_nodash"), Some(&Value::from("20240309")));
        assert_eq!(context.get("run_id"), Some(&Value::from("manual__1")));
        assert_eq!(
            context.get("task_instance_key_str"),
            Some(&Value::from("etl__extract__20240309"))
        );
        assert_eq!(context.get("ti").unwrap()["task_id"], Value::from("extract"));
    }

    #[test]
    fn test_for_task_rewrites_task_entries() {
        let context = context(Arc::new(LocalHost::new())).for_task("load".to_string());

        assert_eq!(context.task_id, "load");
        assert_eq!(context.get("task").unwrap()["task_id"], Value::from("load"));
        assert_eq!(context.run_id, "manual__1");
    }

    #[tokio::test]
    async fn test_local_host_downstream_is_transitive() {
        let host = LocalHost::new()
            .with_downstream("check", ["a", "b"])
            .with_downstream("a", ["c"])
            .with_downstream("c", ["d"]);

        let downstream = host.downstream_task_ids("check").await.unwrap();
        assert_eq!(downstream, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_local_host_records_skips_and_outputs() {
        let host = LocalHost::new().with_downstream("branch", ["left", "right", "middle"]);

        host.skip_all_except("branch", &["left".to_string()])
            .await
            .unwrap();
        assert_eq!(host.skipped().await, vec!["right", "middle"]);

        host.push_output("branch", "count", Value::from(3))
            .await
            .unwrap();
        assert_eq!(host.outputs("branch").await.get("count"), Some(&Value::from(3)));
    }
}
