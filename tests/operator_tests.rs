// ABOUTME: Integration tests for operators working together inside a task registry
// ABOUTME: Covers branching, short-circuiting, functional task ids and keyed outputs through a local host

use std::sync::Arc;

use pyoperator::engine::{LocalHost, OperatorError, Signature};
use pyoperator::isolation::CallableSpec;
use pyoperator::operators::{
    BranchOperator, FunctionOperator, IsolatedOperator, Operator, ShortCircuitOperator,
    TaskDecorator, TaskRegistry,
};
use pyoperator::value::{Kwargs, Mapping, Value};

mod common;
use common::{context, fake_bridge, FakeRunner};

fn pipeline_host() -> Arc<LocalHost> {
    Arc::new(
        LocalHost::new()
            .with_downstream("check", ["route"])
            .with_downstream("route", ["full_load", "incremental_load"])
            .with_downstream("full_load", ["report"])
            .with_downstream("incremental_load", ["report"]),
    )
}

#[tokio::test]
async fn test_branch_selects_path_from_context() {
    let host = pipeline_host();
    let mut registry = TaskRegistry::new();

    registry
        .register(Arc::new(BranchOperator::new(FunctionOperator::new(
            "route",
            Signature::new(["ds"]),
            |call| {
                let ds = call.kwarg("ds").and_then(Value::as_str).unwrap_or_default();
                let target = if ds.ends_with("-01") {
                    "full_load"
                } else {
                    "incremental_load"
                };
                Ok(Some(Value::from(target)))
            },
        ))))
        .unwrap();

    let context = context(host.clone(), "check");
    let ds = context.get("ds").and_then(Value::as_str).unwrap().to_string();
    let result = registry.execute_task("route", &context).await.unwrap();

    let (followed, skipped) = if ds.ends_with("-01") {
        ("full_load", "incremental_load")
    } else {
        ("incremental_load", "full_load")
    };
    assert_eq!(result, Some(Value::from(followed)));
    assert_eq!(host.skipped().await, vec![skipped]);
}

#[tokio::test]
async fn test_short_circuit_skips_whole_downstream_graph() {
    let host = pipeline_host();
    let mut registry = TaskRegistry::new();
    registry
        .register(Arc::new(ShortCircuitOperator::new(FunctionOperator::new(
            "check",
            Signature::default(),
            |_| Ok(Some(Value::Sequence(Vec::new()))),
        ))))
        .unwrap();

    let result = registry
        .execute_task("check", &context(host.clone(), "check"))
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(
        host.skipped().await,
        vec!["full_load", "incremental_load", "report", "route"]
    );
}

#[tokio::test]
async fn test_short_circuit_without_downstream_is_a_no_op() {
    let host = Arc::new(LocalHost::new());
    let operator = ShortCircuitOperator::new(FunctionOperator::new(
        "leaf",
        Signature::default(),
        |_| Ok(Some(Value::Null)),
    ));

    operator.execute(&context(host.clone(), "leaf")).await.unwrap();
    assert!(host.skipped().await.is_empty());
}

#[tokio::test]
async fn test_functional_tasks_share_one_registry() {
    let mut registry = TaskRegistry::new();
    let split = TaskDecorator::new("split", Signature::new(["line"]), |call| {
        let line = call.arg(0).and_then(Value::as_str).unwrap_or_default();
        let mut parts = Mapping::new();
        for (index, word) in line.split_whitespace().enumerate() {
            parts.insert(Value::from(format!("word_{}", index)), Value::from(word));
        }
        Ok(Some(Value::Mapping(parts)))
    })
    .unwrap()
    .with_multiple_outputs(true);

    let first = split
        .call(&mut registry, vec![Value::from("hello world")], Kwargs::new())
        .unwrap();
    let second = split
        .call(&mut registry, vec![Value::from("one")], Kwargs::new())
        .unwrap();
    assert_eq!(first.task_id, "split");
    assert_eq!(second.task_id, "split__1");

    let host = Arc::new(LocalHost::new());
    let base = context(host.clone(), "split");
    registry.execute_task(&first.task_id, &base).await.unwrap();
    registry.execute_task(&second.task_id, &base).await.unwrap();

    let outputs = host.outputs("split").await;
    assert_eq!(outputs.get("word_1"), Some(&Value::from("world")));
    assert_eq!(host.outputs("split__1").await.len(), 1);
}

#[tokio::test]
async fn test_isolated_and_in_process_tasks_register_together() {
    let runner = FakeRunner::returning(b"{\"rows\": 10}");
    let mut registry = TaskRegistry::new();

    registry
        .register(Arc::new(
            IsolatedOperator::builder("extract")
                .callable(CallableSpec::from_source("def extract():\n    return {'rows': 10}\n").unwrap())
                .bridge(fake_bridge(runner.clone()))
                .build()
                .unwrap(),
        ))
        .unwrap();
    registry
        .register(Arc::new(FunctionOperator::new(
            "announce",
            Signature::default(),
            |_| Ok(Some(Value::from("done"))),
        )))
        .unwrap();

    let duplicate = registry.register(Arc::new(FunctionOperator::new(
        "extract",
        Signature::default(),
        |_| Ok(None),
    )));
    assert!(matches!(duplicate, Err(OperatorError::DuplicateTask { .. })));
    assert_eq!(registry.task_ids(), vec!["extract", "announce"]);

    let host = Arc::new(LocalHost::new());
    let extracted = registry
        .execute_task("extract", &context(host.clone(), "extract"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(extracted["rows"], Value::from(10));
    assert_eq!(registry.get("extract").unwrap().operator_type(), "isolated");
}
