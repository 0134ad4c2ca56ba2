//! Run state and per-project outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::project::ProjectDescriptor;

/// Pipeline lifecycle. Transitions only move forward; `Done` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Discovering,
    Retrieving,
    Executing,
    Done,
    Cancelled,
}

impl PipelineState {
    fn rank(&self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Discovering => 1,
            PipelineState::Retrieving => 2,
            PipelineState::Executing => 3,
            PipelineState::Done | PipelineState::Cancelled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineState::Cancelled || next.rank() > self.rank()
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Discovering => "discovering",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Executing => "executing",
            PipelineState::Done => "done",
            PipelineState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Result of one stage for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed(String),
    /// The stage started but observed cancellation.
    Cancelled,
    /// The stage never ran for this project.
    #[default]
    Skipped,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Succeeded => write!(f, "ok"),
            StageOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            StageOutcome::Cancelled => write!(f, "cancelled"),
            StageOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Retrieval result produced by a retrieval worker.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Position of the project in the discovery result.
    pub index: usize,
    pub name: String,
    pub dest: PathBuf,
    pub outcome: StageOutcome,
}

/// Execution result produced by an execution worker.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub index: usize,
    pub name: String,
    pub outcome: StageOutcome,
}

/// Everything the run learned about one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub name: String,
    pub version: String,
    pub source_location: String,
    /// Where the project was cloned; `None` if retrieval failed or the run
    /// root was cleaned up.
    pub local_location: Option<PathBuf>,
    pub retrieval: StageOutcome,
    pub execution: StageOutcome,
}

impl ProjectReport {
    pub fn pending(project: &ProjectDescriptor) -> Self {
        Self {
            name: project.name().to_string(),
            version: project.version().to_string(),
            source_location: project.source_location().to_string(),
            local_location: None,
            retrieval: StageOutcome::Skipped,
            execution: StageOutcome::Skipped,
        }
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub state: PipelineState,
    pub desired: usize,
    pub discovered: usize,
    /// Whether discovery returned the full desired count.
    pub satisfied: bool,
    /// One entry per discovered project, in discovery order.
    pub projects: Vec<ProjectReport>,
}

impl RunReport {
    pub fn new(desired: usize, projects: &[ProjectDescriptor], satisfied: bool) -> Self {
        Self {
            state: PipelineState::Idle,
            desired,
            discovered: projects.len(),
            satisfied,
            projects: projects.iter().map(ProjectReport::pending).collect(),
        }
    }

    /// Projects admitted to retrieval.
    pub fn completed(&self) -> usize {
        self.projects
            .iter()
            .filter(|p| p.retrieval != StageOutcome::Skipped)
            .count()
    }

    pub fn retrieved(&self) -> usize {
        self.projects
            .iter()
            .filter(|p| p.retrieval.is_success())
            .count()
    }

    pub fn executed(&self) -> usize {
        self.projects
            .iter()
            .filter(|p| p.execution.is_success())
            .count()
    }

    /// Projects with a failed stage.
    pub fn failed(&self) -> usize {
        self.projects
            .iter()
            .filter(|p| p.retrieval.is_failure() || p.execution.is_failure())
            .count()
    }

    pub(crate) fn record_retrieval(&mut self, outcome: RetrievalOutcome) {
        if let Some(report) = self.projects.get_mut(outcome.index) {
            if outcome.outcome.is_success() {
                report.local_location = Some(outcome.dest);
            }
            report.retrieval = outcome.outcome;
        }
    }

    /// Drops local paths once the run root has been removed.
    pub(crate) fn forget_local_locations(&mut self) {
        for project in &mut self.projects {
            project.local_location = None;
        }
    }

    pub(crate) fn record_execution(&mut self, outcome: ExecutionOutcome) {
        if let Some(report) = self.projects.get_mut(outcome.index) {
            report.execution = outcome.outcome;
        }
    }
}
