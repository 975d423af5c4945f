//! Static allocation output: per-subtask tier assignments under a budget.

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// One subtask's frozen assignment. Produced by the allocator and never
/// mutated after the plan is returned (the executor copies `max_tokens`
/// before boosting from surplus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskAllocation {
    pub subtask_id: u32,
    pub tier: Tier,
    pub model: String,
    pub max_tokens: u32,
    pub estimated_cost_dollars: f64,
    #[serde(default)]
    pub skipped: bool,
}

/// Full allocation for a graph: same order as the graph's subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub allocations: Vec<SubTaskAllocation>,
    pub total_estimated_tokens: u32,
    pub total_estimated_cost_dollars: f64,
    pub budget_dollars: f64,
    /// Human-readable record of every cascade action, in order applied.
    #[serde(default)]
    pub downgrades_applied: Vec<String>,
}

impl ExecutionPlan {
    pub fn allocation(&self, subtask_id: u32) -> Option<&SubTaskAllocation> {
        self.allocations.iter().find(|a| a.subtask_id == subtask_id)
    }
}
