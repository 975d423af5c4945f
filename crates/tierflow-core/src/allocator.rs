//! Static tier allocation under a dollar ceiling.
//!
//! Pure algorithmic logic, no I/O. The budget is treated as a ceiling:
//! cost estimates use worst-case output caps so the executor can return
//! unused tokens to the surplus pool later.

use std::collections::BTreeMap;

use tierflow_models::{ExecutionPlan, SchedulerConfig, SubTaskAllocation, TaskGraph, Tier};
use tracing::info;

use crate::error::{EngineError, Result};

/// Routes subtasks to model tiers and enforces the dollar budget via a
/// deterministic downgrade cascade. Identical inputs always yield
/// identical plans.
pub struct Allocator {
    config: SchedulerConfig,
}

impl Allocator {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Produce an `ExecutionPlan` for `graph` under `budget_dollars`.
    ///
    /// `spent_dollars` accounts for dollars already consumed (e.g. by the
    /// planner) so the cascade works against the remaining budget.
    pub fn allocate(
        &self,
        graph: &TaskGraph,
        budget_dollars: f64,
        spent_dollars: f64,
    ) -> Result<ExecutionPlan> {
        let remaining = budget_dollars - spent_dollars;
        if remaining <= 0.0 {
            return Err(EngineError::BudgetExhausted {
                budget: budget_dollars,
                spent: spent_dollars,
            });
        }

        let catalog = &self.config.catalog;
        let crit_order = graph.criticality_order();

        // Initial mapping: tier by complexity, worst-case cost by cap.
        let mut allocs: BTreeMap<u32, SubTaskAllocation> = graph
            .subtasks
            .iter()
            .map(|s| {
                let tier = tierflow_models::TierCatalog::tier_for(s.complexity);
                let max_tokens = catalog.max_tokens(tier);
                (
                    s.id,
                    SubTaskAllocation {
                        subtask_id: s.id,
                        tier,
                        model: catalog.model(tier).to_string(),
                        max_tokens,
                        estimated_cost_dollars: catalog.output_cost(tier, max_tokens),
                        skipped: false,
                    },
                )
            })
            .collect();

        let mut downgrades: Vec<String> = Vec::new();

        // Pass 1: Deep -> Verify, least critical first.
        for &sid in &crit_order {
            if total_cost(&allocs) <= remaining {
                break;
            }
            let alloc = allocs.get_mut(&sid).unwrap();
            if alloc.tier == Tier::Deep && !alloc.skipped {
                set_tier(alloc, Tier::Verify, &self.config);
                downgrades.push(format!("Subtask {sid}: deep -> verify (budget pressure)"));
            }
        }

        // Pass 2: remaining Deep -> Fast, now hitting the most critical.
        for &sid in &crit_order {
            if total_cost(&allocs) <= remaining {
                break;
            }
            let alloc = allocs.get_mut(&sid).unwrap();
            if alloc.tier == Tier::Deep && !alloc.skipped {
                set_tier(alloc, Tier::Fast, &self.config);
                downgrades.push(format!("Subtask {sid}: deep -> fast (budget pressure)"));
            }
        }

        // Pass 3: skip least-critical Verify subtasks entirely.
        for &sid in &crit_order {
            if total_cost(&allocs) <= remaining {
                break;
            }
            let alloc = allocs.get_mut(&sid).unwrap();
            if alloc.tier == Tier::Verify && !alloc.skipped {
                alloc.skipped = true;
                alloc.max_tokens = 0;
                alloc.estimated_cost_dollars = 0.0;
                downgrades.push(format!("Subtask {sid}: skipped (budget pressure)"));
            }
        }

        // Pass 4 (fallback): scale every surviving cap proportionally,
        // flooring at the configured minimum.
        if total_cost(&allocs) > remaining {
            let current_cost: f64 = allocs
                .values()
                .filter(|a| !a.skipped)
                .map(|a| a.estimated_cost_dollars)
                .sum();
            if current_cost > 0.0 {
                let scale = remaining / current_cost;
                for alloc in allocs.values_mut().filter(|a| !a.skipped) {
                    let scaled = (alloc.max_tokens as f64 * scale) as u32;
                    alloc.max_tokens = scaled.max(self.config.token_floor);
                    alloc.estimated_cost_dollars =
                        catalog.output_cost(alloc.tier, alloc.max_tokens);
                }
                downgrades.push(format!(
                    "All subtasks: max_tokens scaled to {:.0}% (budget pressure)",
                    scale * 100.0
                ));
            }
        }

        // The token floor can keep the estimate above the remaining
        // budget; that is a hard stop, not a plan. The tolerance absorbs
        // rounding noise from the proportional scale, which targets
        // `remaining` exactly.
        if total_cost(&allocs) > remaining + COST_TOLERANCE {
            return Err(EngineError::BudgetExhausted {
                budget: budget_dollars,
                spent: spent_dollars,
            });
        }

        let ordered: Vec<SubTaskAllocation> = graph
            .subtasks
            .iter()
            .map(|s| allocs[&s.id].clone())
            .collect();
        let total_tokens: u32 = ordered.iter().map(|a| a.max_tokens).sum();
        let total_cost: f64 = ordered.iter().map(|a| a.estimated_cost_dollars).sum();

        info!(
            subtasks = ordered.len(),
            estimated_cost = total_cost,
            remaining,
            downgrades = downgrades.len(),
            "Allocator produced plan"
        );

        Ok(ExecutionPlan {
            allocations: ordered,
            total_estimated_tokens: total_tokens,
            total_estimated_cost_dollars: total_cost,
            budget_dollars,
            downgrades_applied: downgrades,
        })
    }
}

const COST_TOLERANCE: f64 = 1e-12;

fn total_cost(allocs: &BTreeMap<u32, SubTaskAllocation>) -> f64 {
    allocs.values().map(|a| a.estimated_cost_dollars).sum()
}

fn set_tier(alloc: &mut SubTaskAllocation, tier: Tier, config: &SchedulerConfig) {
    let catalog = &config.catalog;
    alloc.tier = tier;
    alloc.model = catalog.model(tier).to_string();
    alloc.max_tokens = catalog.max_tokens(tier);
    alloc.estimated_cost_dollars = catalog.output_cost(tier, alloc.max_tokens);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierflow_models::{Complexity, SubTask};

    fn chain_graph() -> TaskGraph {
        // Five-node linear chain: low, low, high, high, medium.
        let complexities = [
            Complexity::Low,
            Complexity::Low,
            Complexity::High,
            Complexity::High,
            Complexity::Medium,
        ];
        TaskGraph::new(
            complexities
                .iter()
                .enumerate()
                .map(|(i, &complexity)| SubTask {
                    id: i as u32 + 1,
                    description: format!("step {}", i + 1),
                    complexity,
                    dependencies: if i == 0 { vec![] } else { vec![i as u32] },
                })
                .collect(),
        )
    }

    fn allocator() -> Allocator {
        Allocator::new(SchedulerConfig::default())
    }

    #[test]
    fn test_single_high_sink_gets_deep_without_downgrades() {
        let graph = TaskGraph::new(vec![SubTask {
            id: 1,
            description: "compose".to_string(),
            complexity: Complexity::High,
            dependencies: vec![],
        }]);

        let plan = allocator().allocate(&graph, 0.10, 0.0).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].tier, Tier::Deep);
        assert!(!plan.allocations[0].skipped);
        assert!(plan.downgrades_applied.is_empty());
        assert!(plan.total_estimated_cost_dollars <= 0.10 + 1e-12);
    }

    #[test]
    fn test_roomy_budget_keeps_default_mapping() {
        // Full worst-case cost of the chain is ~$0.0841.
        let plan = allocator().allocate(&chain_graph(), 0.09, 0.0).unwrap();

        let tiers: Vec<Tier> = plan.allocations.iter().map(|a| a.tier).collect();
        assert_eq!(
            tiers,
            vec![Tier::Fast, Tier::Fast, Tier::Deep, Tier::Deep, Tier::Verify]
        );
        assert!(plan.downgrades_applied.is_empty());
    }

    #[test]
    fn test_tight_budget_demotes_less_critical_deep_first() {
        // $0.015 cannot hold two Deep calls ($0.04096 each).
        let plan = allocator().allocate(&chain_graph(), 0.015, 0.0).unwrap();

        let demoted: Vec<&str> = plan
            .downgrades_applied
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert!(!demoted.is_empty());
        // Node 4 is closer to the sink than node 3, so node 3 goes first.
        assert!(demoted[0].starts_with("Subtask 3: deep -> verify"));
        assert!(plan.total_estimated_cost_dollars <= 0.015 + 1e-12);
    }

    #[test]
    fn test_very_tight_budget_scales_caps_to_floor() {
        // Low enough that even Fast/Fast survivors must be scaled down.
        let plan = allocator().allocate(&chain_graph(), 0.0004, 0.0).unwrap();

        assert!(
            plan.downgrades_applied
                .iter()
                .any(|d| d.contains("max_tokens scaled"))
        );
        for alloc in plan.allocations.iter().filter(|a| !a.skipped) {
            assert!(alloc.max_tokens >= 128);
        }
        assert!(plan.total_estimated_cost_dollars <= 0.0004 + 1e-12);
    }

    #[test]
    fn test_budget_below_floor_cost_is_exhausted() {
        // Two Fast nodes at the 128-token floor cost ~$0.0001; less than
        // that cannot be planned.
        let result = allocator().allocate(&chain_graph(), 0.00005, 0.0);
        assert!(matches!(result, Err(EngineError::BudgetExhausted { .. })));
    }

    #[test]
    fn test_zero_remaining_budget_is_exhausted() {
        let result = allocator().allocate(&chain_graph(), 0.05, 0.05);
        assert!(matches!(result, Err(EngineError::BudgetExhausted { .. })));
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let graph = chain_graph();
        let a = allocator().allocate(&graph, 0.015, 0.001).unwrap();
        let b = allocator().allocate(&graph, 0.015, 0.001).unwrap();

        assert_eq!(a.downgrades_applied, b.downgrades_applied);
        assert_eq!(a.total_estimated_cost_dollars, b.total_estimated_cost_dollars);
        for (x, y) in a.allocations.iter().zip(b.allocations.iter()) {
            assert_eq!(x.tier, y.tier);
            assert_eq!(x.max_tokens, y.max_tokens);
            assert_eq!(x.skipped, y.skipped);
        }
    }

    #[test]
    fn test_smaller_budget_never_costs_more() {
        let graph = chain_graph();
        let mut previous = f64::MAX;
        for budget in [0.10, 0.05, 0.02, 0.01, 0.005, 0.002] {
            let plan = allocator().allocate(&graph, budget, 0.0).unwrap();
            assert!(
                plan.total_estimated_cost_dollars <= previous + 1e-12,
                "budget {budget} produced a costlier plan"
            );
            previous = plan.total_estimated_cost_dollars;
        }
    }

    #[test]
    fn test_smaller_budget_never_demotes_fewer_nodes() {
        let graph = chain_graph();
        let mut previous = 0;
        for budget in [0.10, 0.05, 0.02, 0.01, 0.005, 0.002] {
            let plan = allocator().allocate(&graph, budget, 0.0).unwrap();
            assert!(plan.downgrades_applied.len() >= previous);
            previous = plan.downgrades_applied.len();
        }
    }

    #[test]
    fn test_plan_cost_dominated_by_remaining_budget() {
        let graph = chain_graph();
        for budget in [0.08, 0.02, 0.01, 0.004, 0.001, 0.0004] {
            let plan = allocator().allocate(&graph, budget, 0.0).unwrap();
            assert!(
                plan.total_estimated_cost_dollars <= budget + 1e-12,
                "plan for budget {budget} exceeds it"
            );
        }
    }

    #[test]
    fn test_floor_is_configurable() {
        // $0.000082 covers two Fast nodes at ~100 tokens each, which the
        // default 128-token floor rejects but a 64-token floor admits.
        let result = allocator().allocate(&chain_graph(), 0.000082, 0.0);
        assert!(matches!(result, Err(EngineError::BudgetExhausted { .. })));

        let config = SchedulerConfig {
            token_floor: 64,
            ..SchedulerConfig::default()
        };
        let plan = Allocator::new(config)
            .allocate(&chain_graph(), 0.000082, 0.0)
            .unwrap();
        for alloc in plan.allocations.iter().filter(|a| !a.skipped) {
            assert!(alloc.max_tokens >= 64);
        }
        assert!(plan.total_estimated_cost_dollars <= 0.000082 + 1e-12);
    }
}
