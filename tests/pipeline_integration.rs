//! End-to-end pipeline tests with in-memory search and retrieval backends.
//!
//! Execution uses the real `BinaryRunner`, so these tests need a POSIX `sh`.

#![cfg(unix)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use neighbor::execution::{BinaryRunner, ExecutionBackend};
use neighbor::pipeline::{Pipeline, PipelineConfig, PipelineState, StageOutcome};
use neighbor::retrieval::RetrievalBackend;
use neighbor::search::SearchBackend;
use neighbor::{PipelineError, ProjectDescriptor, RetrievalError, SearchError};

struct StaticSearch {
    projects: Vec<ProjectDescriptor>,
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn search(
        &self,
        _cancel: &CancellationToken,
        _query: &str,
        num_desired: usize,
    ) -> Result<Vec<ProjectDescriptor>, SearchError> {
        let mut projects = self.projects.clone();
        if projects.len() < num_desired {
            return Err(SearchError::FewerResultsThanDesired {
                desired: num_desired,
                projects,
            });
        }
        projects.truncate(num_desired);
        Ok(projects)
    }
}

/// Creates the destination directory, optionally dropping marker files in it.
#[derive(Default)]
struct FakeRetriever {
    fail: HashSet<String>,
    markers: HashSet<String>,
    delay: Duration,
    calls: AtomicUsize,
    /// Cancels this token on the given call number.
    cancel_on: Option<(usize, CancellationToken)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl RetrievalBackend for FakeRetriever {
    async fn retrieve(
        &self,
        _cancel: &CancellationToken,
        source_location: &str,
        dest: &Path,
    ) -> Result<(), RetrievalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some((n, token)) = &self.cancel_on {
            if call == *n {
                token.cancel();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.contains(source_location) {
            return Err(RetrievalError::CloneFailed {
                source_location: source_location.to_string(),
                code: Some(128),
                stderr: "fatal: repository not found".to_string(),
            });
        }
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(RetrievalError::Spawn)?;
        if self.markers.contains(source_location) {
            tokio::fs::write(dest.join("broken"), b"")
                .await
                .map_err(RetrievalError::Spawn)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct CountingRunner {
    runs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl ExecutionBackend for CountingRunner {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        work_dir: &Path,
    ) -> Result<(), neighbor::ExecutionError> {
        self.runs.lock().unwrap().push(work_dir.to_path_buf());
        Ok(())
    }
}

fn source(i: usize) -> String {
    format!("https://github.com/org/project-{i}.git")
}

fn projects(n: usize) -> Vec<ProjectDescriptor> {
    (0..n)
        .map(|i| ProjectDescriptor::new(format!("org/project-{i}"), "", source(i)).unwrap())
        .collect()
}

fn config(root: &Path, desired: usize) -> PipelineConfig {
    PipelineConfig::new("language:rust")
        .with_num_desired(desired)
        .with_projects_dir(root.join("_external_projects"))
        .with_clean(false)
}

#[tokio::test]
async fn one_failed_retrieval_does_not_stop_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = FakeRetriever {
        fail: HashSet::from([source(3)]),
        ..FakeRetriever::default()
    };
    let runner = BinaryRunner::new(r#"sh -c "touch ran""#).unwrap();

    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(6),
        }),
        Arc::new(retriever),
        Some(Arc::new(runner)),
        config(tmp.path(), 6),
    )
    .unwrap();

    let report = pipeline.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.discovered, 6);
    assert_eq!(report.retrieved(), 5);
    assert_eq!(report.executed(), 5);
    assert!(report.projects[3].retrieval.is_failure());
    assert_eq!(report.projects[3].execution, StageOutcome::Skipped);

    let root = tmp.path().join("_external_projects");
    for i in (0..6).filter(|i| *i != 3) {
        assert!(root.join(format!("org/project-{i}/ran")).exists(), "project-{i} ran");
    }
    assert!(!root.join("org/project-3").exists());
}

#[tokio::test]
async fn one_failed_command_does_not_stop_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = FakeRetriever {
        markers: HashSet::from([source(1)]),
        ..FakeRetriever::default()
    };
    let runner = BinaryRunner::new(r#"sh -c "test ! -f broken""#).unwrap();

    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(4),
        }),
        Arc::new(retriever),
        Some(Arc::new(runner)),
        config(tmp.path(), 4).with_execution_workers(2),
    )
    .unwrap();

    let report = pipeline.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.retrieved(), 4);
    assert_eq!(report.executed(), 3);
    assert!(matches!(
        &report.projects[1].execution,
        StageOutcome::Failed(reason) if reason.contains("exited with code Some(1)")
    ));
}

#[tokio::test]
async fn small_pool_drains_large_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = Arc::new(FakeRetriever {
        delay: Duration::from_millis(10),
        ..FakeRetriever::default()
    });
    let runner = Arc::new(CountingRunner::default());

    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(20),
        }),
        retriever.clone(),
        Some(runner.clone()),
        config(tmp.path(), 20).with_retrieval_workers(3),
    )
    .unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        pipeline.run(CancellationToken::new()),
    )
    .await
    .expect("pipeline terminates")
    .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.retrieved(), 20);
    assert_eq!(runner.runs.lock().unwrap().len(), 20);
    assert!(retriever.max_in_flight.load(Ordering::SeqCst) <= 3);

    let names: HashSet<&str> = report.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names.len(), 20);
}

#[tokio::test]
async fn cancellation_stops_admission_and_keeps_outcomes() {
    let tmp = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let retriever = Arc::new(FakeRetriever {
        delay: Duration::from_millis(50),
        cancel_on: Some((3, cancel.clone())),
        ..FakeRetriever::default()
    });

    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(10),
        }),
        retriever.clone(),
        Some(Arc::new(CountingRunner::default())),
        config(tmp.path(), 10).with_retrieval_workers(2),
    )
    .unwrap();

    let err = pipeline.run(cancel).await.unwrap_err();
    let report = match err {
        PipelineError::Cancelled(report) => report,
        other => panic!("unexpected error: {other}"),
    };

    let calls = retriever.calls.load(Ordering::SeqCst);
    assert!(calls >= 3 && calls < 10, "admitted {calls} retrievals");
    assert_eq!(report.completed(), calls);
    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(pipeline.state(), PipelineState::Cancelled);

    // Admitted work reports an outcome; the rest is marked skipped.
    let skipped = report
        .projects
        .iter()
        .filter(|p| p.retrieval == StageOutcome::Skipped)
        .count();
    assert_eq!(skipped, 10 - calls);
}

#[tokio::test]
async fn cancelled_before_start_admits_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = Arc::new(FakeRetriever::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(5),
        }),
        retriever.clone(),
        None,
        config(tmp.path(), 5),
    )
    .unwrap();

    let err = pipeline.run(cancel).await.unwrap_err();
    match err {
        PipelineError::Cancelled(report) => {
            assert_eq!(report.completed(), 0);
            assert_eq!(report.discovered, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plain_retrieve_with_partial_discovery() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(StaticSearch {
            projects: projects(3),
        }),
        Arc::new(FakeRetriever::default()),
        None,
        config(tmp.path(), 8).with_clean(true),
    )
    .unwrap();

    let report = pipeline.run(CancellationToken::new()).await.unwrap();

    assert!(!report.satisfied);
    assert_eq!(report.desired, 8);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.retrieved(), 3);
    assert!(report
        .projects
        .iter()
        .all(|p| p.execution == StageOutcome::Skipped));
    assert!(!tmp.path().join("_external_projects").exists());
}
