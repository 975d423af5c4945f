//! Run orchestration: single runs and multi-budget sweeps.
//!
//! The planner is called once per task and shared across a sweep so that
//! budget is the only variable. Runs share no mutable state; a bounded
//! worker pool dispatches them with a small stagger between launches to
//! avoid provider rate-limit bursts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tierflow_ai::{LlmClient, TierClients, tier_clients};
use tierflow_models::{
    CostReport, PlannerTrace, RunTrace, SchedulerConfig, SubTaskTrace, Tier,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dynamic::DynamicExecutor;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::executor::StaticExecutor;
use crate::planner::{Planner, PlannerOutcome};
use crate::text_metrics::compute_text_metrics;
use crate::trace::TraceStore;
use crate::Executor;

/// One finished run: the persisted trace plus the in-memory report.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub trace: RunTrace,
    pub report: CostReport,
}

/// Everything needed to turn (task, budget) into a persisted `RunTrace`.
/// Cloning is cheap; clones share clients and the trace store but each
/// run gets its own judge ledger.
#[derive(Clone)]
pub struct Pipeline {
    planner: Planner,
    clients: TierClients,
    judge_client: Arc<dyn LlmClient>,
    config: SchedulerConfig,
    store: Option<Arc<TraceStore>>,
    dynamic: bool,
    evaluate: bool,
}

impl Pipeline {
    pub fn new(
        planner_client: Arc<dyn LlmClient>,
        clients: TierClients,
        judge_client: Arc<dyn LlmClient>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            planner: Planner::new(planner_client),
            clients,
            judge_client,
            config,
            store: None,
            dynamic: false,
            evaluate: true,
        }
    }

    /// Wire up real Gemini clients: the planner on the Verify model, the
    /// judge on the Fast model, one generation client per tier.
    pub fn from_api_key(api_key: &str, config: SchedulerConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(crate::error::EngineError::Config(
                "provider API key is empty".to_string(),
            ));
        }
        let bundle = build_gemini_clients(api_key, &config)?;
        Ok(Self::new(bundle.planner, bundle.tiers, bundle.judge, config))
    }

    pub fn with_store(mut self, store: Arc<TraceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Select the dynamic ROI executor instead of the static pipeline.
    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Disable post-hoc judge scoring of subtasks and the deliverable.
    /// The dynamic executor keeps its inner-loop judge either way.
    pub fn with_evaluation(mut self, evaluate: bool) -> Self {
        self.evaluate = evaluate;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn plan(&self, task: &str) -> Result<PlannerOutcome> {
        self.planner.plan(task).await
    }

    /// Fresh judge bound to this pipeline's judge model and pricing.
    pub fn new_evaluator(&self) -> Evaluator {
        Evaluator::new(self.judge_client.clone(), self.config.catalog.clone())
    }

    pub fn tier_clients(&self) -> &TierClients {
        &self.clients
    }

    /// Plan and execute in one step.
    pub async fn run_task(&self, task: &str, budget_dollars: f64) -> Result<RunOutput> {
        let outcome = self.plan(task).await?;
        self.run_single(&outcome, budget_dollars).await
    }

    /// Execute one budget level against a pre-computed plan and persist
    /// the trace. Each run gets a fresh judge so evaluation cost is
    /// accounted per run.
    pub async fn run_single(
        &self,
        outcome: &PlannerOutcome,
        budget_dollars: f64,
    ) -> Result<RunOutput> {
        let planner_cost = outcome.cost_dollars(&self.config.catalog);
        let evaluator = Arc::new(Evaluator::new(
            self.judge_client.clone(),
            self.config.catalog.clone(),
        ));

        let result = if self.dynamic {
            DynamicExecutor::new(self.clients.clone(), evaluator.clone(), self.config.clone())
                .execute(&outcome.task, &outcome.graph, budget_dollars, planner_cost)
                .await?
        } else {
            StaticExecutor::new(self.clients.clone(), self.config.clone())
                .execute(&outcome.task, &outcome.graph, budget_dollars, planner_cost)
                .await?
        };

        let mut subtask_traces = Vec::with_capacity(result.report.subtask_results.len());
        for sr in &result.report.subtask_results {
            let quality = if self.evaluate && !sr.skipped && !sr.output.is_empty() {
                match evaluator
                    .evaluate_subtask(&sr.description, &sr.output, &outcome.task)
                    .await
                {
                    Ok(score) => Some(score),
                    Err(e) => {
                        warn!(subtask_id = sr.subtask_id, error = %e, "Subtask evaluation failed");
                        None
                    }
                }
            } else {
                None
            };

            let text_metrics = (!sr.output.is_empty()).then(|| compute_text_metrics(&sr.output));

            subtask_traces.push(SubTaskTrace {
                subtask_id: sr.subtask_id,
                description: sr.description.clone(),
                tier: sr.tier,
                model: sr.model.clone(),
                max_tokens: sr.tokens_budgeted,
                prompt: sr.prompt.clone(),
                output: sr.output.clone(),
                prompt_tokens: sr.prompt_tokens,
                completion_tokens: sr.completion_tokens,
                total_tokens: sr.total_tokens,
                cost_dollars: sr.cost_dollars,
                surplus: sr.surplus,
                skipped: sr.skipped,
                quality,
                text_metrics,
            });
        }

        let deliverable_quality = if self.evaluate && !result.deliverable.is_empty() {
            match evaluator
                .evaluate_deliverable(&outcome.task, &result.deliverable)
                .await
            {
                Ok(score) => Some(score),
                Err(e) => {
                    warn!(error = %e, "Deliverable evaluation failed");
                    None
                }
            }
        } else {
            None
        };

        let trace = RunTrace {
            run_id: Uuid::new_v4().to_string(),
            task: outcome.task.clone(),
            budget_dollars,
            timestamp: Utc::now(),
            planner_trace: PlannerTrace {
                task: outcome.task.clone(),
                model: outcome.model.clone(),
                prompt_tokens: outcome.usage.prompt_tokens,
                completion_tokens: outcome.usage.completion_tokens,
                total_tokens: outcome.usage.total_tokens,
                cost_dollars: planner_cost,
                graph_json: serde_json::to_string(&outcome.graph)?,
            },
            subtask_traces,
            deliverable: result.deliverable.clone(),
            deliverable_quality,
            total_cost_dollars: result.report.spent_dollars,
            evaluation_cost_dollars: evaluator.total_cost_dollars().await,
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&trace) {
                warn!(run_id = %trace.run_id, error = %e, "Failed to persist trace");
            }
        }

        Ok(RunOutput {
            trace,
            report: result.report,
        })
    }

    /// Sweep the same plan across several budgets. Per-run failures are
    /// logged and dropped; results come back sorted by budget.
    pub async fn run_batch(
        &self,
        task: &str,
        budgets: &[f64],
        concurrency: usize,
        stagger: Duration,
    ) -> Result<Vec<RunTrace>> {
        info!(task, ?budgets, concurrency, "Starting batch sweep");

        let outcome = self.plan(task).await?;
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (i, &budget) in budgets.iter().enumerate() {
            if i > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }

            let pipeline = self.clone();
            let outcome = outcome.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let output = pipeline.run_single(&outcome, budget).await;
                (budget, output)
            });
        }

        let mut traces = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((budget, Ok(output))) => {
                    info!(
                        budget,
                        cost = output.trace.total_cost_dollars,
                        run_id = %output.trace.run_id,
                        "Budget run finished"
                    );
                    traces.push(output.trace);
                }
                Ok((budget, Err(e))) => {
                    error!(budget, error = %e, "Budget run failed");
                }
                Err(e) => {
                    error!(error = %e, "Budget run panicked");
                }
            }
        }

        traces.sort_by(|a, b| {
            a.budget_dollars
                .partial_cmp(&b.budget_dollars)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(traces)
    }
}

/// The three client roles the pipeline needs from a provider.
pub struct GeminiClientsBundle {
    pub planner: Arc<dyn LlmClient>,
    pub judge: Arc<dyn LlmClient>,
    pub tiers: TierClients,
}

fn build_gemini_clients(api_key: &str, config: &SchedulerConfig) -> Result<GeminiClientsBundle> {
    use tierflow_ai::{GeminiClient, RetryingLlmClient};

    let catalog = &config.catalog;
    let wrap = |model: &str| -> Result<Arc<dyn LlmClient>> {
        let client = GeminiClient::new(api_key, model)?;
        Ok(Arc::new(RetryingLlmClient::with_default_config(Arc::new(
            client,
        ))))
    };

    Ok(GeminiClientsBundle {
        planner: wrap(catalog.model(Tier::Verify))?,
        judge: wrap(catalog.model(Tier::Fast))?,
        tiers: tier_clients(api_key, catalog)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tierflow_ai::MockLlmClient;

    use super::*;

    fn planner_client() -> Arc<dyn LlmClient> {
        let graph = json!({
            "subtasks": [
                {"id": 1, "description": "research", "complexity": "low"},
                {"id": 2, "description": "compose", "complexity": "medium", "dependencies": [1]}
            ]
        });
        Arc::new(MockLlmClient::new("planner-model").with_json_default(graph))
    }

    fn judge_client(score: f64) -> Arc<dyn LlmClient> {
        Arc::new(MockLlmClient::new("judge-model").with_json_default(json!({
            "relevance": score,
            "completeness": score,
            "coherence": score,
            "conciseness": score,
            "overall": score,
            "rationale": "scripted"
        })))
    }

    fn echo_tiers() -> TierClients {
        TierClients::from_arcs(
            Arc::new(MockLlmClient::new("fast-model")),
            Arc::new(MockLlmClient::new("verify-model")),
            Arc::new(MockLlmClient::new("deep-model")),
        )
    }

    fn pipeline(evaluate: bool) -> Pipeline {
        Pipeline::new(
            planner_client(),
            echo_tiers(),
            judge_client(7.0),
            SchedulerConfig::default(),
        )
        .with_evaluation(evaluate)
    }

    #[tokio::test]
    async fn test_run_task_produces_trace_with_quality() {
        let trace = pipeline(true)
            .run_task("write a brief", 0.05)
            .await
            .unwrap()
            .trace;

        assert_eq!(trace.task, "write a brief");
        assert_eq!(trace.subtask_traces.len(), 2);
        assert!(trace.subtask_traces[0].quality.is_some());
        assert!(trace.deliverable_quality.is_some());
        assert!(trace.evaluation_cost_dollars > 0.0);
        assert!(!trace.deliverable.is_empty());
    }

    #[tokio::test]
    async fn test_no_eval_omits_quality_fields() {
        let trace = pipeline(false)
            .run_task("write a brief", 0.05)
            .await
            .unwrap()
            .trace;

        assert!(trace.subtask_traces.iter().all(|st| st.quality.is_none()));
        assert!(trace.deliverable_quality.is_none());
        assert_eq!(trace.evaluation_cost_dollars, 0.0);
    }

    #[tokio::test]
    async fn test_batch_returns_traces_sorted_by_budget() {
        let traces = pipeline(false)
            .run_batch("task", &[0.08, 0.02, 0.05], 2, Duration::ZERO)
            .await
            .unwrap();

        let budgets: Vec<f64> = traces.iter().map(|t| t.budget_dollars).collect();
        assert_eq!(budgets, vec![0.02, 0.05, 0.08]);
    }

    #[tokio::test]
    async fn test_batch_persists_each_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TraceStore::new(dir.path()));
        let pipeline = pipeline(false).with_store(store.clone());

        pipeline
            .run_batch("task", &[0.02, 0.05], 2, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dynamic_pipeline_records_roi_activity() {
        // Judge scores 4.0 everywhere: every node should upgrade once to
        // Verify and then accept (Deep fails the ROI test).
        let pipeline = Pipeline::new(
            planner_client(),
            echo_tiers(),
            judge_client(4.0),
            SchedulerConfig::default(),
        )
        .with_dynamic(true)
        .with_evaluation(false);

        let output = pipeline.run_task("task", 0.10).await.unwrap();
        assert_eq!(output.trace.subtask_traces.len(), 2);
        assert_eq!(output.report.total_upgrades, 2);
        // Judge spend from the inner ROI loop is reported even with
        // trace-time evaluation off.
        assert!(output.trace.evaluation_cost_dollars > 0.0);
    }
}
