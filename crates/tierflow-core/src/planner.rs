//! Task decomposition via a structured-output model.

use std::sync::Arc;

use serde_json::{Value, json};
use tierflow_ai::{GenerationRequest, LlmClient, TokenUsage};
use tierflow_models::{TaskGraph, Tier, TierCatalog};
use tracing::info;

use crate::error::{EngineError, Result};

const SYSTEM_INSTRUCTION: &str = "\
You are a task decomposition engine. Given a user's task, break it into \
discrete subtasks that together produce the final deliverable.

Rules:
1. Assign each subtask a unique integer ID starting from 1.
2. Write a clear, actionable one-sentence description for each subtask.
3. Rate complexity:
   - low: simple retrieval, formatting, lookups, or straightforward generation.
   - medium: moderate synthesis, quality checks, verification, summarisation.
   - high: creative writing, trend analysis, multi-source reasoning, long-form composition.
4. List dependency IDs: subtasks that MUST complete before this one can start.
5. The subtasks must form a valid DAG (no circular dependencies).
6. Aim for 3-7 subtasks. Prefer fewer, coarser subtasks over many tiny ones.
7. The final subtask should always produce or review the user-facing deliverable.";

/// Response schema handed to the provider's structured-output mode.
fn task_graph_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subtasks": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "INTEGER" },
                        "description": { "type": "STRING" },
                        "complexity": {
                            "type": "STRING",
                            "enum": ["low", "medium", "high"]
                        },
                        "dependencies": {
                            "type": "ARRAY",
                            "items": { "type": "INTEGER" }
                        }
                    },
                    "required": ["id", "description", "complexity"]
                }
            }
        },
        "required": ["subtasks"]
    })
}

/// What planning produced: the validated graph plus the call's own cost
/// inputs, so the caller can charge the planner against the budget.
#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub task: String,
    pub graph: TaskGraph,
    pub usage: TokenUsage,
    pub model: String,
}

impl PlannerOutcome {
    /// Planner spend, billed at Verify pricing.
    pub fn cost_dollars(&self, catalog: &TierCatalog) -> f64 {
        catalog.call_cost(
            Tier::Verify,
            self.usage.prompt_tokens,
            self.usage.completion_tokens,
        )
    }
}

/// Decomposes a user task into a validated subtask DAG.
///
/// The planner is budget-unaware: it decomposes based purely on what the
/// task requires. Budget constraints are applied downstream.
#[derive(Clone)]
pub struct Planner {
    client: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Decompose `task` into a validated `TaskGraph`. Any parse or graph
    /// violation is fatal; no partial plan is ever returned.
    pub async fn plan(&self, task: &str) -> Result<PlannerOutcome> {
        let request = GenerationRequest::new(task)
            .with_system(SYSTEM_INSTRUCTION)
            .with_temperature(0.2);

        let response = self
            .client
            .generate_json(request, task_graph_schema())
            .await?;

        let graph: TaskGraph = serde_json::from_value(response.value)
            .map_err(|e| EngineError::PlannerInvalid(e.to_string()))?;
        graph
            .validate()
            .map_err(|e| EngineError::PlannerInvalid(e.to_string()))?;

        info!(
            subtasks = graph.len(),
            tokens = response.usage.total_tokens,
            model = self.client.model(),
            "Planner decomposed task"
        );

        Ok(PlannerOutcome {
            task: task.to_string(),
            graph,
            usage: response.usage,
            model: self.client.model().to_string(),
        })
    }
}
