use rexflow_kernel::prelude::*;
use rexflow_test_utils::{tw_document, RecordingRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn build(steps: &str) -> PipelineGraph {
    let doc = tw_document();
    let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
    let options = PipelineOptions::default().with_steps(steps.parse().unwrap());
    PipelineGraph::build(&args, &options).unwrap()
}

#[tokio::test]
async fn failing_wave_stops_progression() {
    let runner = Arc::new(RecordingRunner::failing(|unit| {
        unit.stage == StageKind::N && unit.invocation.to_string().contains("reg2j1b")
    }));
    let executor = LocalExecutor::with_runner(runner.clone(), 2);

    let err = executor
        .run(&build("n,wf"), Path::new("/tmp/ws"))
        .await
        .unwrap_err();

    let (stages, failed, total, report) = match err {
        PipelineError::StageFailure {
            stages,
            failed,
            total,
            report,
        } => (stages, failed, total, report),
        other => panic!("expected a stage failure, got {other}"),
    };
    assert_eq!(stages, vec![StageKind::N]);
    assert_eq!((failed, total), (1, 4));
    assert_eq!(report.waves.len(), 1);
    assert_eq!(report.waves[0].outcomes.len(), 4);
    assert_eq!(report.outcomes().filter(|o| o.success).count(), 3);

    // every sibling ran, the fit never did
    assert_eq!(runner.stages(), vec![StageKind::N; 4]);
}

#[tokio::test]
async fn waves_run_in_dependency_order() {
    let runner = Arc::new(RecordingRunner::new());
    let executor = LocalExecutor::with_runner(runner.clone(), 4);
    let graph = build("all");

    let report = executor.run(&graph, Path::new("/tmp/ws")).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.outcomes().count(), graph.invocation_count());

    let stages = runner.stages();
    for (from, to) in graph.edges() {
        let last_parent = stages.iter().rposition(|s| *s == from).unwrap();
        let first_child = stages.iter().position(|s| *s == to).unwrap();
        assert!(last_parent < first_child, "{from} must finish before {to}");
    }
}

#[tokio::test]
async fn units_run_in_the_workspace() {
    let runner = Arc::new(RecordingRunner::new());
    let executor = LocalExecutor::with_runner(runner.clone(), 3);
    executor.run(&build("n"), Path::new("/data/tW.local.d")).await.unwrap();

    let workdirs = runner.workdirs();
    assert_eq!(workdirs.len(), 4);
    assert!(workdirs.iter().all(|d| d == Path::new("/data/tW.local.d")));
}

#[tokio::test]
async fn worker_pool_bounds_concurrency() {
    let runner = Arc::new(RecordingRunner::new().with_delay(Duration::from_millis(20)));
    let executor = LocalExecutor::with_runner(runner.clone(), 2);

    // three rankings, then the plot
    executor.run(&build("r"), Path::new("/tmp/ws")).await.unwrap();
    assert_eq!(runner.calls().len(), 4);
    assert!(runner.peak() <= 2);
    assert!(runner.peak() >= 1);
}

#[tokio::test]
async fn empty_graph_runs_nothing() {
    let runner = Arc::new(RecordingRunner::new());
    let executor = LocalExecutor::with_runner(runner.clone(), 1);
    let report = executor
        .run(&PipelineGraph::new(), Path::new("/tmp/ws"))
        .await
        .unwrap();
    assert!(report.waves.is_empty());
    assert!(runner.calls().is_empty());
}
