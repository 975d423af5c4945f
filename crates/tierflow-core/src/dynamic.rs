//! Dynamic ROI-driven executor.
//!
//! Replaces the static allocator + executor pipeline. Every subtask
//! starts at the cheapest tier and is escalated only when the quality
//! gate fails AND the marginal return on investment justifies the spend.
//! A fixed fraction of the post-planning budget is reserved so the
//! terminal subtask can always run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tierflow_ai::{GenerationRequest, TierClients};
use tierflow_models::{
    ExecutorResult, RoiDecision, RoiOutcome, SchedulerConfig, SubTaskAttempt, SubTaskResult,
    TaskGraph, Tier,
};
use tracing::{info, warn};

use crate::Executor;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::prompt::build_context;
use crate::report;

const GENERATION_TEMPERATURE: f32 = 0.4;

/// ROI-driven executor that starts cheap and upgrades on evidence.
///
/// For each subtask: run at Fast, judge the output, and walk up the tier
/// ladder only while quality is below the threshold, the expected lift
/// per dollar clears the minimum ROI, and the budget can afford the
/// worst-case cost of the next tier.
pub struct DynamicExecutor {
    clients: TierClients,
    evaluator: Arc<Evaluator>,
    config: SchedulerConfig,
}

impl DynamicExecutor {
    pub fn new(clients: TierClients, evaluator: Arc<Evaluator>, config: SchedulerConfig) -> Self {
        Self {
            clients,
            evaluator,
            config,
        }
    }

    /// One generation attempt at `tier`. Failures are contained: the
    /// attempt comes back with empty output and zero cost so the ROI
    /// logic can decide whether an upgrade is still worth trying.
    async fn attempt(&self, sid: u32, tier: Tier, prompt: &str) -> SubTaskAttempt {
        let catalog = &self.config.catalog;
        let request = GenerationRequest::new(prompt)
            .with_max_output_tokens(catalog.max_tokens(tier))
            .with_temperature(GENERATION_TEMPERATURE);

        let (output, usage) = match self.clients.get(tier).generate(request).await {
            Ok(response) => (response.text, response.usage),
            Err(e) => {
                warn!(subtask_id = sid, tier = %tier, error = %e, "Attempt failed");
                (String::new(), Default::default())
            }
        };

        SubTaskAttempt {
            tier,
            model: catalog.model(tier).to_string(),
            cost_dollars: catalog.call_cost(tier, usage.prompt_tokens, usage.completion_tokens),
            output,
            quality_score: 0.0,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }

    /// Judge one attempt. An empty output scores 0 without spending
    /// judge tokens; a judge failure also scores 0 so the upgrade check
    /// can still fire.
    async fn score(&self, sid: u32, desc: &str, output: &str, task: &str) -> (f64, String) {
        if output.trim().is_empty() {
            return (0.0, "empty output".to_string());
        }
        match self.evaluator.quick_score(desc, output, task).await {
            Ok((score, reason)) => (score, reason),
            Err(e) => {
                warn!(subtask_id = sid, error = %e, "Judge unavailable, scoring 0");
                (0.0, "evaluation unavailable".to_string())
            }
        }
    }
}

#[async_trait]
impl Executor for DynamicExecutor {
    async fn execute(
        &self,
        task: &str,
        graph: &TaskGraph,
        budget_dollars: f64,
        planner_cost_dollars: f64,
    ) -> Result<ExecutorResult> {
        let config = &self.config;
        let catalog = &config.catalog;
        let order = graph.topo_order();
        let final_id = order.last().copied();

        // Budget partition: hold back a synthesis reserve so upstream
        // escalation can never starve the terminal subtask.
        let remaining_total = budget_dollars - planner_cost_dollars;
        let synthesis_reserve = remaining_total * config.synthesis_reserve_fraction;
        let upstream_budget = remaining_total - synthesis_reserve;

        let mut outputs: HashMap<u32, String> = HashMap::new();
        let mut results: Vec<SubTaskResult> = Vec::with_capacity(order.len());
        let mut all_roi_decisions: Vec<RoiDecision> = Vec::new();
        let mut total_spent = planner_cost_dollars;
        let mut upstream_spent = 0.0_f64;
        let mut total_upgrades = 0usize;

        for &sid in &order {
            let Some(subtask) = graph.get(sid) else {
                continue;
            };
            let is_final = Some(sid) == final_id;

            let mut available = if is_final {
                budget_dollars - total_spent
            } else {
                (upstream_budget - upstream_spent).min(budget_dollars - total_spent)
            };

            let prompt = build_context(task, &subtask.description, &subtask.dependencies, &outputs);

            let mut tier_idx = 0usize;
            let mut attempts: Vec<SubTaskAttempt> = Vec::new();
            let mut decisions: Vec<RoiDecision> = Vec::new();
            let mut subtask_cost = 0.0_f64;

            while tier_idx < Tier::LADDER.len() {
                let tier = Tier::LADDER[tier_idx];
                let est = catalog.worst_case_cost(tier);

                if est > available {
                    if attempts.is_empty() {
                        warn!(
                            subtask_id = sid,
                            tier = %tier,
                            est,
                            available,
                            "Cannot afford any attempt for subtask"
                        );
                    }
                    break;
                }

                info!(
                    subtask_id = sid,
                    tier = %tier,
                    model = catalog.model(tier),
                    max_tokens = catalog.max_tokens(tier),
                    "Dispatching attempt"
                );

                let mut attempt = self.attempt(sid, tier, &prompt).await;
                let (score, reason) = self
                    .score(sid, &subtask.description, &attempt.output, task)
                    .await;
                attempt.quality_score = score;

                subtask_cost += attempt.cost_dollars;
                available -= attempt.cost_dollars;

                info!(
                    subtask_id = sid,
                    tier = %tier,
                    quality = score,
                    cost = attempt.cost_dollars,
                    reason = %reason,
                    "Attempt scored"
                );
                attempts.push(attempt);

                if score >= config.quality_threshold {
                    break;
                }

                let Some(&next_tier) = Tier::LADDER.get(tier_idx + 1) else {
                    break;
                };

                let upgrade_est = catalog.worst_case_cost(next_tier);
                let lift = config.expected_lift(tier, next_tier);
                let roi = if upgrade_est > 0.0 {
                    lift / upgrade_est
                } else {
                    0.0
                };
                let roi_rounded = (roi * 10.0).round() / 10.0;

                if roi >= config.min_roi && upgrade_est <= available {
                    let decision = RoiDecision {
                        subtask_id: sid,
                        current_tier: tier,
                        current_quality: score,
                        proposed_tier: next_tier,
                        upgrade_cost_estimate: upgrade_est,
                        expected_quality_lift: lift,
                        roi: roi_rounded,
                        decision: RoiOutcome::Upgrade,
                        reason: format!(
                            "Quality {score:.1} < {:.1}, ROI {roi:.0} >= {:.0}; upgrading",
                            config.quality_threshold, config.min_roi
                        ),
                    };
                    decisions.push(decision.clone());
                    all_roi_decisions.push(decision);
                    total_upgrades += 1;
                    info!(
                        subtask_id = sid,
                        from = %tier,
                        to = %next_tier,
                        roi,
                        "Upgrading tier"
                    );
                    tier_idx += 1;
                    continue;
                }

                let (outcome, reason) = if upgrade_est > available {
                    (
                        RoiOutcome::BudgetExceeded,
                        format!(
                            "Quality {score:.1} < {:.1}, but upgrade cost ${upgrade_est:.6} > ${available:.6} available",
                            config.quality_threshold
                        ),
                    )
                } else {
                    (
                        RoiOutcome::Accept,
                        format!(
                            "Quality {score:.1} < {:.1}, ROI {roi:.0} < {:.0}; not worth upgrading",
                            config.quality_threshold, config.min_roi
                        ),
                    )
                };
                let decision = RoiDecision {
                    subtask_id: sid,
                    current_tier: tier,
                    current_quality: score,
                    proposed_tier: next_tier,
                    upgrade_cost_estimate: upgrade_est,
                    expected_quality_lift: lift,
                    roi: roi_rounded,
                    decision: outcome,
                    reason,
                };
                decisions.push(decision.clone());
                all_roi_decisions.push(decision);
                break;
            }

            // Keep the best attempt seen, not the last one tried: a
            // pricier tier can occasionally score below an earlier one.
            let best_idx = attempts
                .iter()
                .enumerate()
                .fold(None::<(usize, f64)>, |best, (idx, a)| match best {
                    Some((_, score)) if score >= a.quality_score => best,
                    _ => Some((idx, a.quality_score)),
                })
                .map(|(idx, _)| idx);

            let (final_tier, output, best_index) = match best_idx {
                Some(idx) => (
                    attempts[idx].tier,
                    attempts[idx].output.clone(),
                    idx,
                ),
                None => (Tier::Fast, String::new(), 0),
            };
            outputs.insert(sid, output.clone());

            let prompt_tokens: u32 = attempts.iter().map(|a| a.prompt_tokens).sum();
            let completion_tokens: u32 = attempts.iter().map(|a| a.completion_tokens).sum();

            total_spent += subtask_cost;
            if !is_final {
                upstream_spent += subtask_cost;
            }

            info!(
                subtask_id = sid,
                final_tier = %final_tier,
                attempts = attempts.len(),
                cost = subtask_cost,
                "Subtask accepted"
            );

            results.push(SubTaskResult {
                subtask_id: sid,
                description: subtask.description.clone(),
                tier: final_tier,
                model: catalog.model(final_tier).to_string(),
                tokens_budgeted: catalog.max_tokens(final_tier),
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cost_dollars: subtask_cost,
                surplus: 0,
                output,
                prompt,
                attempts,
                roi_decisions: decisions,
                final_attempt_index: best_index,
                skipped: false,
            });
        }

        let deliverable = report::assemble_deliverable(&order, &outputs);
        let upgrade_log: Vec<String> = all_roi_decisions
            .iter()
            .filter(|d| d.decision == RoiOutcome::Upgrade)
            .map(|d| {
                format!(
                    "Subtask {}: {} -> {} (quality {:.1}, ROI {:.0})",
                    d.subtask_id, d.current_tier, d.proposed_tier, d.current_quality, d.roi
                )
            })
            .collect();

        let cost_report = report::build_report(report::ReportInputs {
            graph,
            results,
            budget_dollars,
            total_spent,
            downgrades_applied: upgrade_log,
            subtasks_downgraded: 0,
            total_upgrades,
            roi_decisions: all_roi_decisions,
            evaluation_cost_dollars: self.evaluator.total_cost_dollars().await,
        });

        Ok(ExecutorResult {
            deliverable,
            report: cost_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tierflow_ai::{LlmClient, MockLlmClient, MockStep};
    use tierflow_models::{Complexity, SubTask, TierCatalog};

    use super::*;

    fn chain_graph() -> TaskGraph {
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

    fn score_json(overall: f64) -> serde_json::Value {
        json!({
            "relevance": overall,
            "completeness": overall,
            "coherence": overall,
            "conciseness": overall,
            "overall": overall,
            "rationale": "scripted"
        })
    }

    /// Tier clients that always answer, plus a judge scripted per call.
    fn harness(judge_steps: Vec<MockStep>) -> (TierClients, Arc<Evaluator>) {
        let clients = TierClients::from_arcs(
            Arc::new(MockLlmClient::new("fast-model")),
            Arc::new(MockLlmClient::new("verify-model")),
            Arc::new(MockLlmClient::new("deep-model")),
        );
        let judge: Arc<dyn LlmClient> =
            Arc::new(MockLlmClient::from_steps("judge-model", judge_steps));
        let evaluator = Arc::new(Evaluator::new(judge, TierCatalog::default()));
        (clients, evaluator)
    }

    fn harness_with_default_score(score: f64) -> (TierClients, Arc<Evaluator>) {
        let clients = TierClients::from_arcs(
            Arc::new(MockLlmClient::new("fast-model")),
            Arc::new(MockLlmClient::new("verify-model")),
            Arc::new(MockLlmClient::new("deep-model")),
        );
        let judge: Arc<dyn LlmClient> = Arc::new(
            MockLlmClient::new("judge-model").with_json_default(score_json(score)),
        );
        let evaluator = Arc::new(Evaluator::new(judge, TierCatalog::default()));
        (clients, evaluator)
    }

    fn executor(clients: TierClients, evaluator: Arc<Evaluator>) -> DynamicExecutor {
        DynamicExecutor::new(clients, evaluator, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_good_fast_output_stops_at_fast() {
        let (clients, evaluator) = harness_with_default_score(8.0);
        let result = executor(clients, evaluator)
            .execute("task", &chain_graph(), 0.10, 0.0)
            .await
            .unwrap();

        for r in &result.report.subtask_results {
            assert_eq!(r.tier, Tier::Fast);
            assert_eq!(r.attempts.len(), 1);
            assert!(r.roi_decisions.is_empty());
        }
        assert_eq!(result.report.total_upgrades, 0);
    }

    #[tokio::test]
    async fn test_each_node_upgrades_once_when_verify_satisfies() {
        // Judge: 4.0 for every Fast attempt, 9.0 for every Verify
        // attempt; two judged attempts per node, five nodes.
        let mut steps = Vec::new();
        for _ in 0..5 {
            steps.push(MockStep::json(score_json(4.0)));
            steps.push(MockStep::json(score_json(9.0)));
        }
        let (clients, evaluator) = harness(steps);

        let result = executor(clients, evaluator)
            .execute("task", &chain_graph(), 0.10, 0.0)
            .await
            .unwrap();

        assert_eq!(result.report.total_upgrades, 5);
        for r in &result.report.subtask_results {
            assert_eq!(r.tier, Tier::Verify, "subtask {} final tier", r.subtask_id);
            assert_eq!(r.attempts.len(), 2);
            // Exactly one upgrade decision per node, none reaching Deep.
            assert_eq!(r.roi_decisions.len(), 1);
            assert_eq!(r.roi_decisions[0].decision, RoiOutcome::Upgrade);
            assert_eq!(r.roi_decisions[0].proposed_tier, Tier::Verify);
        }
    }

    #[tokio::test]
    async fn test_persistently_low_quality_climbs_ladder_under_budget() {
        let (clients, evaluator) = harness_with_default_score(4.0);
        let result = executor(clients, evaluator)
            .execute("task", &chain_graph(), 0.06, 0.0)
            .await
            .unwrap();

        // Upstream nodes walk Fast -> Verify and stop when Deep's
        // worst-case cost no longer fits the upstream partition; the
        // reserve still guarantees the terminal node at least one
        // attempt.
        let terminal = result.report.subtask_results.last().unwrap();
        assert_eq!(terminal.subtask_id, 5);
        assert!(!terminal.attempts.is_empty());

        for r in &result.report.subtask_results {
            assert!(!r.attempts.is_empty(), "subtask {} never ran", r.subtask_id);
            // Ladder order is respected within each node.
            let tiers: Vec<Tier> = r.attempts.iter().map(|a| a.tier).collect();
            for pair in tiers.windows(2) {
                assert!(Tier::LADDER.iter().position(|t| *t == pair[0])
                    < Tier::LADDER.iter().position(|t| *t == pair[1]));
            }
        }
    }

    #[tokio::test]
    async fn test_upstream_spend_respects_synthesis_reserve() {
        let (clients, evaluator) = harness_with_default_score(4.0);
        let budget = 0.06;
        let result = executor(clients, evaluator)
            .execute("task", &chain_graph(), budget, 0.0)
            .await
            .unwrap();

        let config = SchedulerConfig::default();
        let upstream_cap = budget * (1.0 - config.synthesis_reserve_fraction);
        let deep_worst_case = config.catalog.worst_case_cost(Tier::Deep);

        let upstream_spend: f64 = result
            .report
            .subtask_results
            .iter()
            .filter(|r| r.subtask_id != 5)
            .map(|r| r.cost_dollars)
            .sum();

        // Upstream spend can breach the partition by at most the single
        // attempt that crossed it.
        assert!(upstream_spend <= upstream_cap + deep_worst_case);
    }

    #[tokio::test]
    async fn test_best_attempt_wins_even_if_earlier() {
        // Fast scores 5.5, Verify scores 4.5: the Verify attempt is kept
        // in the record but Fast's output is chosen.
        let steps = vec![
            MockStep::json(score_json(5.5)),
            MockStep::json(score_json(4.5)),
        ];
        let (clients, evaluator) = harness(steps);

        let graph = TaskGraph::new(vec![SubTask {
            id: 1,
            description: "only".to_string(),
            complexity: Complexity::Low,
            dependencies: vec![],
        }]);

        let result = executor(clients, evaluator)
            .execute("task", &graph, 0.10, 0.0)
            .await
            .unwrap();

        let r = &result.report.subtask_results[0];
        assert_eq!(r.attempts.len(), 2);
        assert_eq!(r.tier, Tier::Fast);
        assert_eq!(r.final_attempt_index, 0);
        assert_eq!(r.output, r.attempts[0].output);
    }

    #[tokio::test]
    async fn test_failed_attempt_scores_zero_and_still_tries_upgrade() {
        let clients = TierClients::from_arcs(
            Arc::new(MockLlmClient::from_steps(
                "fast-model",
                vec![MockStep::error("provider down")],
            )),
            Arc::new(MockLlmClient::new("verify-model")),
            Arc::new(MockLlmClient::new("deep-model")),
        );
        // Only the Verify attempt reaches the judge (the failed Fast
        // attempt is scored 0 without a judge call).
        let judge: Arc<dyn LlmClient> = Arc::new(MockLlmClient::from_steps(
            "judge-model",
            vec![MockStep::json(score_json(9.0))],
        ));
        let evaluator = Arc::new(Evaluator::new(judge, TierCatalog::default()));

        let graph = TaskGraph::new(vec![SubTask {
            id: 1,
            description: "only".to_string(),
            complexity: Complexity::Low,
            dependencies: vec![],
        }]);

        let result = executor(clients, evaluator)
            .execute("task", &graph, 0.10, 0.0)
            .await
            .unwrap();

        let r = &result.report.subtask_results[0];
        assert_eq!(r.attempts.len(), 2);
        assert_eq!(r.attempts[0].quality_score, 0.0);
        assert_eq!(r.tier, Tier::Verify);
        assert!(!r.output.is_empty());
    }

    #[tokio::test]
    async fn test_judge_failure_scores_zero_and_flows_through_roi() {
        // The judge errors on the Fast attempt, then scores Verify 9.0.
        let steps = vec![
            MockStep::error("judge offline"),
            MockStep::json(score_json(9.0)),
        ];
        let (clients, evaluator) = harness(steps);

        let graph = TaskGraph::new(vec![SubTask {
            id: 1,
            description: "only".to_string(),
            complexity: Complexity::Low,
            dependencies: vec![],
        }]);

        let result = executor(clients, evaluator)
            .execute("task", &graph, 0.10, 0.0)
            .await
            .unwrap();

        let r = &result.report.subtask_results[0];
        assert_eq!(r.attempts[0].quality_score, 0.0);
        assert_eq!(r.roi_decisions[0].decision, RoiOutcome::Upgrade);
        assert_eq!(r.tier, Tier::Verify);
    }

    #[tokio::test]
    async fn test_unaffordable_budget_accepts_empty_output() {
        // Budget below even the Fast worst-case: no attempt is made.
        let (clients, evaluator) = harness_with_default_score(9.0);
        let graph = TaskGraph::new(vec![SubTask {
            id: 1,
            description: "only".to_string(),
            complexity: Complexity::Low,
            dependencies: vec![],
        }]);

        let result = executor(clients, evaluator)
            .execute("task", &graph, 0.0001, 0.0)
            .await
            .unwrap();

        let r = &result.report.subtask_results[0];
        assert!(r.attempts.is_empty());
        assert_eq!(r.output, "");
        assert_eq!(r.cost_dollars, 0.0);
    }

    #[tokio::test]
    async fn test_roi_decisions_recorded_before_next_node_results() {
        let (clients, evaluator) = harness_with_default_score(4.0);
        let result = executor(clients, evaluator)
            .execute("task", &chain_graph(), 0.10, 0.0)
            .await
            .unwrap();

        // Global decision list groups each node's decisions contiguously
        // in execution order.
        let mut last_seen = 0u32;
        for d in &result.report.roi_decisions {
            assert!(d.subtask_id >= last_seen);
            last_seen = d.subtask_id;
        }
    }
}
