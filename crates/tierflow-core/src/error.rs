//! Engine error taxonomy.
//!
//! Configuration, budget, and planner failures abort a run. Per-subtask
//! model and judge failures are contained by the executors and never
//! surface as errors here.

use thiserror::Error;
use tierflow_ai::AiError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("missing configuration: {0}")]
    Config(String),

    #[error(
        "budget exhausted before allocation: ${budget:.4} budget, ${spent:.4} already spent"
    )]
    BudgetExhausted { budget: f64, spent: f64 },

    #[error("planner produced an invalid graph: {0}")]
    PlannerInvalid(String),

    #[error("model call failed: {0}")]
    Model(#[from] AiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
