//! Static executor: one call per subtask at its planned tier, with
//! surplus-token redistribution to downstream caps.

use std::collections::HashMap;

use async_trait::async_trait;
use tierflow_ai::{GenerationRequest, TierClients};
use tierflow_models::{
    ExecutionPlan, ExecutorResult, SchedulerConfig, SubTaskResult, TaskGraph,
};
use tracing::{error, info};

use crate::Executor;
use crate::allocator::Allocator;
use crate::error::Result;
use crate::prompt::build_context;
use crate::report;

const GENERATION_TEMPERATURE: f32 = 0.4;

/// Walks the DAG in deterministic topological order, runs each subtask
/// once at its allocated tier, and returns unused output tokens to a
/// pool that boosts downstream caps (never past the tier default).
pub struct StaticExecutor {
    clients: TierClients,
    config: SchedulerConfig,
}

impl StaticExecutor {
    pub fn new(clients: TierClients, config: SchedulerConfig) -> Self {
        Self { clients, config }
    }

    /// Run a pre-computed plan. Exposed separately so callers that embed
    /// the allocation step (batch sweeps, the dashboard) can reuse one
    /// plan across presentations.
    pub async fn execute_plan(
        &self,
        task: &str,
        graph: &TaskGraph,
        plan: &ExecutionPlan,
        planner_cost_dollars: f64,
    ) -> Result<ExecutorResult> {
        let catalog = &self.config.catalog;
        let order = graph.topo_order();

        let mut outputs: HashMap<u32, String> = HashMap::new();
        let mut results: Vec<SubTaskResult> = Vec::with_capacity(order.len());
        let mut surplus_pool: u32 = 0;
        let mut total_spent = planner_cost_dollars;

        for &sid in &order {
            let Some(alloc) = plan.allocation(sid) else {
                continue;
            };
            let Some(subtask) = graph.get(sid) else {
                continue;
            };

            if alloc.skipped {
                results.push(SubTaskResult::skipped(
                    sid,
                    &subtask.description,
                    alloc.tier,
                    &alloc.model,
                ));
                info!(subtask_id = sid, "Subtask skipped by allocator");
                continue;
            }

            // Opportunistic boost from the surplus pool, capped at the
            // tier's default output budget.
            let tier_max = catalog.max_tokens(alloc.tier);
            let mut max_tokens = alloc.max_tokens;
            if surplus_pool > 0 && max_tokens < tier_max {
                let boost = surplus_pool.min(tier_max - max_tokens);
                max_tokens += boost;
                surplus_pool -= boost;
                info!(
                    subtask_id = sid,
                    boost, max_tokens, "Boosted output cap from surplus pool"
                );
            }

            let prompt = build_context(task, &subtask.description, &subtask.dependencies, &outputs);

            info!(
                subtask_id = sid,
                tier = %alloc.tier,
                model = %alloc.model,
                max_tokens,
                "Dispatching subtask"
            );

            let request = GenerationRequest::new(prompt.clone())
                .with_max_output_tokens(max_tokens)
                .with_temperature(GENERATION_TEMPERATURE);

            // A failed call is contained: the subtask contributes an
            // empty output and its dependents still run.
            let (output_text, usage) = match self.clients.get(alloc.tier).generate(request).await {
                Ok(response) => (response.text, response.usage),
                Err(e) => {
                    error!(subtask_id = sid, error = %e, "Subtask model call failed");
                    (String::new(), Default::default())
                }
            };

            outputs.insert(sid, output_text.clone());

            let cost = catalog.call_cost(alloc.tier, usage.prompt_tokens, usage.completion_tokens);
            total_spent += cost;

            let surplus = max_tokens.saturating_sub(usage.completion_tokens);
            surplus_pool += surplus;

            results.push(SubTaskResult {
                subtask_id: sid,
                description: subtask.description.clone(),
                tier: alloc.tier,
                model: alloc.model.clone(),
                tokens_budgeted: max_tokens,
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                cost_dollars: cost,
                surplus,
                output: output_text,
                prompt,
                attempts: Vec::new(),
                roi_decisions: Vec::new(),
                final_attempt_index: 0,
                skipped: false,
            });

            info!(
                subtask_id = sid,
                tokens = usage.total_tokens,
                cost,
                surplus,
                "Subtask completed"
            );
        }

        let deliverable = report::assemble_deliverable(&order, &outputs);
        let cost_report = report::build_report(report::ReportInputs {
            graph,
            results,
            budget_dollars: plan.budget_dollars,
            total_spent,
            downgrades_applied: plan.downgrades_applied.clone(),
            subtasks_downgraded: plan.downgrades_applied.len(),
            total_upgrades: 0,
            roi_decisions: Vec::new(),
            evaluation_cost_dollars: 0.0,
        });

        Ok(ExecutorResult {
            deliverable,
            report: cost_report,
        })
    }
}

#[async_trait]
impl Executor for StaticExecutor {
    async fn execute(
        &self,
        task: &str,
        graph: &TaskGraph,
        budget_dollars: f64,
        planner_cost_dollars: f64,
    ) -> Result<ExecutorResult> {
        let allocator = Allocator::new(self.config.clone());
        let plan = allocator.allocate(graph, budget_dollars, planner_cost_dollars)?;
        self.execute_plan(task, graph, &plan, planner_cost_dollars)
            .await
    }
}
