//! TierFlow engine
//!
//! Turns a task string plus a dollar budget into a deliverable and a cost
//! report: the planner decomposes the task into a subtask DAG, then one of
//! two executors walks it — the static pipeline (allocation cascade +
//! surplus redistribution) or the dynamic pipeline (start cheap, escalate
//! only when the ROI test justifies the spend).

pub mod allocator;
pub mod batch;
pub mod dynamic;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod planner;
pub mod prompt;
pub mod report;
pub mod server;
pub mod text_metrics;
pub mod trace;

use async_trait::async_trait;
use tierflow_models::{ExecutorResult, TaskGraph};

pub use allocator::Allocator;
pub use batch::{Pipeline, RunOutput};
pub use dynamic::DynamicExecutor;
pub use error::{EngineError, Result};
pub use evaluator::Evaluator;
pub use executor::StaticExecutor;
pub use planner::{Planner, PlannerOutcome};
pub use trace::TraceStore;

/// Common capability of both execution strategies: given a validated
/// graph and a budget, produce the deliverable plus its cost report.
/// Which implementation runs is a run-time choice.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        task: &str,
        graph: &TaskGraph,
        budget_dollars: f64,
        planner_cost_dollars: f64,
    ) -> Result<ExecutorResult>;
}
