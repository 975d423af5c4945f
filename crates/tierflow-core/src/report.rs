//! Cost report assembly: a pure projection over subtask results.

use std::collections::HashMap;

use tierflow_models::{CostReport, RoiDecision, SubTaskResult, TaskGraph};

/// Everything the report needs, gathered by whichever executor ran.
pub struct ReportInputs<'a> {
    pub graph: &'a TaskGraph,
    pub results: Vec<SubTaskResult>,
    pub budget_dollars: f64,
    pub total_spent: f64,
    pub downgrades_applied: Vec<String>,
    pub subtasks_downgraded: usize,
    pub total_upgrades: usize,
    pub roi_decisions: Vec<RoiDecision>,
    pub evaluation_cost_dollars: f64,
}

/// Concatenate every non-empty subtask output in execution order,
/// separated by blank lines. Presentation never re-orders nodes.
pub fn assemble_deliverable(order: &[u32], outputs: &HashMap<u32, String>) -> String {
    let parts: Vec<&str> = order
        .iter()
        .filter_map(|sid| outputs.get(sid))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        "(No output produced; the budget may have been insufficient.)".to_string()
    } else {
        parts.join("\n\n")
    }
}

pub fn build_report(inputs: ReportInputs<'_>) -> CostReport {
    let ReportInputs {
        graph,
        results,
        budget_dollars,
        total_spent,
        downgrades_applied,
        subtasks_downgraded,
        total_upgrades,
        roi_decisions,
        evaluation_cost_dollars,
    } = inputs;

    let remaining = budget_dollars - total_spent;
    let utilization_pct = if budget_dollars > 0.0 {
        total_spent / budget_dollars * 100.0
    } else {
        0.0
    };

    let mut tier_counts: HashMap<String, usize> = [
        ("fast".to_string(), 0),
        ("verify".to_string(), 0),
        ("deep".to_string(), 0),
    ]
    .into_iter()
    .collect();
    for result in results.iter().filter(|r| !r.skipped) {
        *tier_counts
            .entry(result.tier.as_str().to_string())
            .or_default() += 1;
    }

    let subtasks_skipped = results.iter().filter(|r| r.skipped).count();

    let total_tokens_budgeted: u32 = results.iter().map(|r| r.tokens_budgeted).sum();
    let total_tokens_consumed: u32 = results.iter().map(|r| r.completion_tokens).sum();
    let total_surplus: u32 = results.iter().map(|r| r.surplus).sum();
    let token_efficiency_pct = if total_tokens_budgeted > 0 {
        total_tokens_consumed as f64 / total_tokens_budgeted as f64 * 100.0
    } else {
        0.0
    };

    CostReport {
        budget_dollars,
        spent_dollars: total_spent,
        remaining_dollars: remaining,
        utilization_pct,
        subtask_results: results,
        tier_counts,
        subtasks_skipped,
        subtasks_downgraded,
        total_upgrades,
        downgrades_applied,
        roi_decisions,
        total_tokens_budgeted,
        total_tokens_consumed,
        total_surplus,
        token_efficiency_pct,
        total_subtasks: graph.len(),
        max_depth: graph.max_depth(),
        parallelizable_subtasks: graph.source_count(),
        complexity_distribution: graph.complexity_distribution(),
        evaluation_cost_dollars,
    }
}
