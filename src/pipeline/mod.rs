//! Pipeline: per-document orchestration and batch runs

mod builder;
mod cancel;
mod orchestrator;
mod report;
mod review;
mod runner;

pub use builder::{build_runner, Components};
pub use cancel::CancellationToken;
pub use orchestrator::{DocumentOutcome, DocumentState, Orchestrator};
pub use report::{FailureEntry, ReportBuilder, RunReport};
pub use review::{
    Evaluation, EvaluationSink, EvaluationStatus, FsEvaluationSink, MemoryEvaluationSink,
};
pub use runner::{BatchRunner, RunnerSettings};
