//! Execution records: attempts, ROI decisions, per-subtask results, and
//! the aggregate cost report.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// One model invocation for a subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskAttempt {
    pub tier: Tier,
    pub model: String,
    pub output: String,
    /// Judge score in [0, 10]; 0.0 when the call or the judge failed.
    pub quality_score: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_dollars: f64,
}

/// Outcome of one post-attempt upgrade evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiOutcome {
    Upgrade,
    Accept,
    BudgetExceeded,
}

/// Record of a single upgrade-or-accept decision in the dynamic
/// executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiDecision {
    pub subtask_id: u32,
    pub current_tier: Tier,
    pub current_quality: f64,
    pub proposed_tier: Tier,
    pub upgrade_cost_estimate: f64,
    pub expected_quality_lift: f64,
    pub roi: f64,
    pub decision: RoiOutcome,
    pub reason: String,
}

/// Final record for one subtask, summed across all attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskResult {
    pub subtask_id: u32,
    pub description: String,
    /// Tier of the attempt whose output was chosen.
    pub tier: Tier,
    pub model: String,
    pub tokens_budgeted: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_dollars: f64,
    /// Unused output-token budget returned to the surplus pool.
    pub surplus: u32,
    pub output: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub attempts: Vec<SubTaskAttempt>,
    #[serde(default)]
    pub roi_decisions: Vec<RoiDecision>,
    #[serde(default)]
    pub final_attempt_index: usize,
    #[serde(default)]
    pub skipped: bool,
}

impl SubTaskResult {
    /// Empty result for a subtask the allocator dropped.
    pub fn skipped(subtask_id: u32, description: &str, tier: Tier, model: &str) -> Self {
        Self {
            subtask_id,
            description: description.to_string(),
            tier,
            model: model.to_string(),
            tokens_budgeted: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_dollars: 0.0,
            surplus: 0,
            output: String::new(),
            prompt: String::new(),
            attempts: Vec::new(),
            roi_decisions: Vec::new(),
            final_attempt_index: 0,
            skipped: true,
        }
    }
}

/// Aggregate accounting for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub budget_dollars: f64,
    pub spent_dollars: f64,
    pub remaining_dollars: f64,
    pub utilization_pct: f64,

    pub subtask_results: Vec<SubTaskResult>,

    pub tier_counts: HashMap<String, usize>,
    pub subtasks_skipped: usize,
    pub subtasks_downgraded: usize,
    pub total_upgrades: usize,

    pub downgrades_applied: Vec<String>,
    #[serde(default)]
    pub roi_decisions: Vec<RoiDecision>,

    pub total_tokens_budgeted: u32,
    pub total_tokens_consumed: u32,
    pub total_surplus: u32,
    pub token_efficiency_pct: f64,

    pub total_subtasks: usize,
    pub max_depth: u32,
    pub parallelizable_subtasks: usize,
    pub complexity_distribution: HashMap<String, usize>,

    /// Judge spend; meta-overhead, never drawn from the task budget.
    #[serde(default)]
    pub evaluation_cost_dollars: f64,
}

/// What either executor hands back: the concatenated deliverable plus
/// the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub deliverable: String,
    pub report: CostReport,
}
