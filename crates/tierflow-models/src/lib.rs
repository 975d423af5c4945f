//! TierFlow data model
//!
//! Pure types shared across the engine: tier catalog and pricing, the
//! subtask DAG with validation and analysis, execution plans, attempt and
//! ROI records, cost reports, quality scores, and persisted run traces.
//! No I/O lives here.

pub mod config;
pub mod graph;
pub mod plan;
pub mod quality;
pub mod report;
pub mod tier;
pub mod trace;

pub use config::SchedulerConfig;
pub use graph::{GraphError, SubTask, TaskGraph};
pub use plan::{ExecutionPlan, SubTaskAllocation};
pub use quality::{QualityScore, TextMetrics};
pub use report::{
    CostReport, ExecutorResult, RoiDecision, RoiOutcome, SubTaskAttempt, SubTaskResult,
};
pub use tier::{Complexity, Tier, TierCatalog, TierSpec};
pub use trace::{PlannerTrace, RunTrace, SubTaskTrace};
