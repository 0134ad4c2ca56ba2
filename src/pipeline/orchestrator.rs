//! Pipeline orchestrator: discovery, then pooled retrieval feeding pooled
//! execution.
//!
//! Discovered projects are pushed onto a bounded job queue shared by a fixed
//! pool of retrieval workers. Each successful retrieval is forwarded over a
//! second channel to the execution pool. Every worker returns its own
//! outcomes when it exits, and the orchestrator waits for both pools to
//! drain before reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::PipelineConfig;
use super::report::{ExecutionOutcome, PipelineState, RetrievalOutcome, RunReport, StageOutcome};
use crate::error::{ConfigError, ExecutionError, PipelineError, RetrievalError, SearchError};
use crate::execution::ExecutionBackend;
use crate::project::ProjectDescriptor;
use crate::retrieval::RetrievalBackend;
use crate::search::SearchBackend;

struct RetrievalJob {
    index: usize,
    project: ProjectDescriptor,
}

struct ExecutionJob {
    index: usize,
    project: ProjectDescriptor,
}

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Pulls the next job unless cancellation wins first.
async fn next_job<T>(rx: &SharedReceiver<T>, cancel: &CancellationToken) -> Option<T> {
    let mut rx = rx.lock().await;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        job = rx.recv() => job,
    }
}

/// Wires a search, a retrieval and an optional execution backend together.
///
/// Without an execution backend the pipeline only retrieves projects.
pub struct Pipeline {
    search: Arc<dyn SearchBackend>,
    retrieval: Arc<dyn RetrievalBackend>,
    execution: Option<Arc<dyn ExecutionBackend>>,
    config: PipelineConfig,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        retrieval: Arc<dyn RetrievalBackend>,
        execution: Option<Arc<dyn ExecutionBackend>>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(PipelineState::Idle);
        Ok(Self {
            search,
            retrieval,
            execution,
            config,
            state,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receives every state transition.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Moves to `next` if that is a forward transition.
    fn advance(&self, next: PipelineState) -> bool {
        let advanced = self.state.send_if_modified(|state| {
            if state.can_advance_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if advanced {
            debug!(state = %next, "Pipeline state changed");
        }
        advanced
    }

    /// Runs discovery, retrieval and execution once.
    ///
    /// Per-project failures are recorded in the report. Returns
    /// [`PipelineError::Cancelled`] with the outcomes gathered so far when
    /// `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, PipelineError> {
        if !self.advance(PipelineState::Discovering) {
            return Err(PipelineError::AlreadyStarted(self.state()));
        }

        let desired = self.config.num_desired;
        info!(query = %self.config.query, desired, "Discovering projects");

        let (projects, satisfied) =
            match self.search.search(&cancel, &self.config.query, desired).await {
                Ok(projects) => (projects, true),
                Err(SearchError::FewerResultsThanDesired { projects, .. }) => {
                    warn!(
                        found = projects.len(),
                        desired, "Discovery returned fewer projects than desired"
                    );
                    (projects, false)
                }
                Err(SearchError::Cancelled) => {
                    let report = RunReport::new(desired, &[], false);
                    return Err(self.finish_cancelled(report, false).await);
                }
                Err(e) => return Err(PipelineError::Discovery(e)),
            };

        let mut report = RunReport::new(desired, &projects, satisfied);
        info!(discovered = projects.len(), "Discovery complete");

        let root = self.config.projects_dir.clone();
        create_run_root(&root).await?;

        self.advance(PipelineState::Retrieving);

        let (exec_tx, mut execution_pool) = match &self.execution {
            Some(backend) => {
                let (tx, rx) = mpsc::channel(self.config.execution_workers);
                let pool = spawn_execution_workers(
                    self.config.execution_workers,
                    Arc::clone(backend),
                    Arc::new(Mutex::new(rx)),
                    &cancel,
                );
                (Some(tx), pool)
            }
            None => (None, JoinSet::new()),
        };

        let (job_tx, job_rx) = mpsc::channel(self.config.retrieval_workers);
        let mut retrieval_pool = spawn_retrieval_workers(
            self.config.retrieval_workers,
            Arc::clone(&self.retrieval),
            Arc::new(Mutex::new(job_rx)),
            exec_tx,
            root.clone(),
            &cancel,
        );

        // Producer: admission stops as soon as cancellation is observed.
        for (index, project) in projects.into_iter().enumerate() {
            let job = RetrievalJob { index, project };
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = job_tx.send(job) => sent.is_ok(),
            };
            if !sent {
                debug!(index, "Stopped enqueuing retrieval jobs");
                break;
            }
        }
        drop(job_tx);

        while let Some(joined) = retrieval_pool.join_next().await {
            match joined {
                Ok(outcomes) => outcomes
                    .into_iter()
                    .for_each(|outcome| report.record_retrieval(outcome)),
                Err(e) => error!(error = %e, "Retrieval worker panicked"),
            }
        }

        if self.execution.is_some() {
            self.advance(PipelineState::Executing);
        }

        while let Some(joined) = execution_pool.join_next().await {
            match joined {
                Ok(outcomes) => outcomes
                    .into_iter()
                    .for_each(|outcome| report.record_execution(outcome)),
                Err(e) => error!(error = %e, "Execution worker panicked"),
            }
        }

        if cancel.is_cancelled() {
            return Err(self.finish_cancelled(report, true).await);
        }

        self.clean_up(&mut report).await;
        self.advance(PipelineState::Done);
        report.state = PipelineState::Done;
        info!(
            discovered = report.discovered,
            retrieved = report.retrieved(),
            executed = report.executed(),
            failed = report.failed(),
            "Pipeline finished"
        );
        Ok(report)
    }

    /// `root_created` is false when the run stopped before creating its root.
    async fn finish_cancelled(&self, mut report: RunReport, root_created: bool) -> PipelineError {
        if root_created {
            self.clean_up(&mut report).await;
        }
        self.advance(PipelineState::Cancelled);
        report.state = PipelineState::Cancelled;
        warn!(admitted = report.completed(), discovered = report.discovered, "Pipeline cancelled");
        PipelineError::Cancelled(Box::new(report))
    }

    /// Removes the run root this run created. Report paths are cleared with it.
    async fn clean_up(&self, report: &mut RunReport) {
        if !self.config.clean {
            return;
        }
        let root = &self.config.projects_dir;
        match tokio::fs::remove_dir_all(root).await {
            Ok(()) => {
                report.forget_local_locations();
                debug!(path = %root.display(), "Removed projects directory");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %root.display(), error = %e, "Failed to remove projects directory"),
        }
    }
}

/// Creates the run root, failing if it already exists. Missing parents are
/// created.
async fn create_run_root(root: &Path) -> Result<(), PipelineError> {
    let workspace_err = |source: std::io::Error| PipelineError::Workspace {
        path: root.to_path_buf(),
        source,
    };
    if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(workspace_err)?;
    }
    tokio::fs::create_dir(root).await.map_err(workspace_err)?;
    debug!(path = %root.display(), "Created projects directory");
    Ok(())
}

fn spawn_retrieval_workers(
    count: usize,
    backend: Arc<dyn RetrievalBackend>,
    rx: SharedReceiver<RetrievalJob>,
    exec_tx: Option<mpsc::Sender<ExecutionJob>>,
    root: PathBuf,
    cancel: &CancellationToken,
) -> JoinSet<Vec<RetrievalOutcome>> {
    let mut pool = JoinSet::new();
    for worker_id in 0..count {
        pool.spawn(retrieval_worker(
            worker_id,
            Arc::clone(&backend),
            Arc::clone(&rx),
            exec_tx.clone(),
            root.clone(),
            cancel.clone(),
        ));
    }
    pool
}

async fn retrieval_worker(
    worker_id: usize,
    backend: Arc<dyn RetrievalBackend>,
    rx: SharedReceiver<RetrievalJob>,
    exec_tx: Option<mpsc::Sender<ExecutionJob>>,
    root: PathBuf,
    cancel: CancellationToken,
) -> Vec<RetrievalOutcome> {
    debug!(worker_id, "Retrieval worker starting");
    let mut outcomes = Vec::new();

    while let Some(RetrievalJob { index, project }) = next_job(&rx, &cancel).await {
        let dest = root.join(project.name());
        let outcome = match backend
            .retrieve(&cancel, project.source_location(), &dest)
            .await
        {
            Ok(()) => StageOutcome::Succeeded,
            Err(RetrievalError::Cancelled) => StageOutcome::Cancelled,
            Err(e) => {
                warn!(worker_id, project = %project.name(), error = %e, "Retrieval failed");
                StageOutcome::Failed(e.to_string())
            }
        };

        let retrieved = outcome.is_success();
        outcomes.push(RetrievalOutcome {
            index,
            name: project.name().to_string(),
            dest: dest.clone(),
            outcome,
        });

        if let (true, Some(tx)) = (retrieved, &exec_tx) {
            let job = ExecutionJob {
                index,
                project: project.with_local_location(dest),
            };
            let forwarded = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = tx.send(job) => sent.is_ok(),
            };
            if !forwarded {
                debug!(worker_id, index, "Execution not admitted");
            }
        }
    }

    debug!(worker_id, processed = outcomes.len(), "Retrieval worker exiting");
    outcomes
}

fn spawn_execution_workers(
    count: usize,
    backend: Arc<dyn ExecutionBackend>,
    rx: SharedReceiver<ExecutionJob>,
    cancel: &CancellationToken,
) -> JoinSet<Vec<ExecutionOutcome>> {
    let mut pool = JoinSet::new();
    for worker_id in 0..count {
        pool.spawn(execution_worker(
            worker_id,
            Arc::clone(&backend),
            Arc::clone(&rx),
            cancel.clone(),
        ));
    }
    pool
}

async fn execution_worker(
    worker_id: usize,
    backend: Arc<dyn ExecutionBackend>,
    rx: SharedReceiver<ExecutionJob>,
    cancel: CancellationToken,
) -> Vec<ExecutionOutcome> {
    debug!(worker_id, "Execution worker starting");
    let mut outcomes = Vec::new();

    while let Some(ExecutionJob { index, project }) = next_job(&rx, &cancel).await {
        let work_dir = project.local_location().unwrap_or(Path::new(""));
        let outcome = match backend.run(&cancel, work_dir).await {
            Ok(()) => StageOutcome::Succeeded,
            Err(ExecutionError::Cancelled) => StageOutcome::Cancelled,
            Err(e) => {
                warn!(worker_id, project = %project.name(), error = %e, "Execution failed");
                StageOutcome::Failed(e.to_string())
            }
        };
        outcomes.push(ExecutionOutcome {
            index,
            name: project.name().to_string(),
            outcome,
        });
    }

    debug!(worker_id, processed = outcomes.len(), "Execution worker exiting");
    outcomes
}
