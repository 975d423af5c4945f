//! LLM-as-judge quality scoring.
//!
//! Evaluation cost is tracked per instance and intentionally kept
//! separate from the task budget: judging is meta-analysis, not part of
//! the pipeline spend.

use std::sync::Arc;

use serde_json::{Value, json};
use tierflow_ai::{GenerationRequest, LlmClient};
use tierflow_models::{QualityScore, Tier, TierCatalog};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EngineError, Result};

const SUBTASK_SYSTEM_INSTRUCTION: &str = "\
You are a strict quality evaluator. Given a subtask description, the overall \
task context, and the agent's output, score the output on four dimensions:

1. relevance (0-10): Does the output address the subtask?
2. completeness (0-10): Does it cover all aspects of the subtask?
3. coherence (0-10): Is it logically structured and clearly written?
4. conciseness (0-10): Is it free of filler, repetition, and padding?

Also provide:
- overall (0-10): A single holistic quality score.
- rationale: One sentence explaining the score.

Be critical. Reserve 9-10 for exceptional work only.";

const DELIVERABLE_SYSTEM_INSTRUCTION: &str = "\
You are a strict quality evaluator. Given the original user task and the final \
deliverable produced by a multi-agent pipeline, score the deliverable on four \
dimensions:

1. relevance (0-10): Does the deliverable fulfil the user's task?
2. completeness (0-10): Are all requested components present?
3. coherence (0-10): Is the deliverable logically structured and readable?
4. conciseness (0-10): Is it free of filler, repetition, and unnecessary padding?

Also provide:
- overall (0-10): A single holistic quality score.
- rationale: One sentence explaining the score.

Be critical. Reserve 9-10 for exceptional work only.";

fn quality_score_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "relevance": { "type": "NUMBER" },
            "completeness": { "type": "NUMBER" },
            "coherence": { "type": "NUMBER" },
            "conciseness": { "type": "NUMBER" },
            "overall": { "type": "NUMBER" },
            "rationale": { "type": "STRING" }
        },
        "required": ["relevance", "completeness", "coherence", "conciseness", "overall"]
    })
}

#[derive(Debug, Default, Clone, Copy)]
struct EvalTotals {
    tokens: u64,
    cost_dollars: f64,
}

/// Stateless scorer backed by a cheap model; accumulates its own spend.
pub struct Evaluator {
    client: Arc<dyn LlmClient>,
    catalog: TierCatalog,
    totals: Mutex<EvalTotals>,
}

impl Evaluator {
    pub fn new(client: Arc<dyn LlmClient>, catalog: TierCatalog) -> Self {
        Self {
            client,
            catalog,
            totals: Mutex::new(EvalTotals::default()),
        }
    }

    /// Score a single subtask output against its description.
    pub async fn evaluate_subtask(
        &self,
        subtask_description: &str,
        output: &str,
        task_context: &str,
    ) -> Result<QualityScore> {
        let prompt = format!(
            "OVERALL TASK: {task_context}\n\nSUBTASK: {subtask_description}\n\nAGENT OUTPUT:\n{output}"
        );
        self.evaluate(&prompt, SUBTASK_SYSTEM_INSTRUCTION).await
    }

    /// Score the final deliverable against the original task.
    pub async fn evaluate_deliverable(
        &self,
        task: &str,
        deliverable: &str,
    ) -> Result<QualityScore> {
        let prompt = format!("USER TASK: {task}\n\nDELIVERABLE:\n{deliverable}");
        self.evaluate(&prompt, DELIVERABLE_SYSTEM_INSTRUCTION).await
    }

    /// Cheap inner-loop score for the ROI check: overall plus rationale.
    /// Same schema and judge as the full evaluation.
    pub async fn quick_score(
        &self,
        subtask_description: &str,
        output: &str,
        task_context: &str,
    ) -> Result<(f64, String)> {
        let score = self
            .evaluate_subtask(subtask_description, output, task_context)
            .await?;
        Ok((score.overall, score.rationale))
    }

    /// Judge spend so far, in dollars.
    pub async fn total_cost_dollars(&self) -> f64 {
        self.totals.lock().await.cost_dollars
    }

    pub async fn total_tokens(&self) -> u64 {
        self.totals.lock().await.tokens
    }

    async fn evaluate(&self, prompt: &str, system_instruction: &str) -> Result<QualityScore> {
        let request = GenerationRequest::new(prompt)
            .with_system(system_instruction)
            .with_temperature(0.1);

        let response = self
            .client
            .generate_json(request, quality_score_schema())
            .await?;

        let score: QualityScore = serde_json::from_value(response.value).map_err(|e| {
            EngineError::Model(tierflow_ai::AiError::InvalidJson(format!(
                "judge schema mismatch: {e}"
            )))
        })?;

        // Judge runs on Fast-tier pricing.
        let cost = self.catalog.call_cost(
            Tier::Fast,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
        );

        let mut totals = self.totals.lock().await;
        totals.tokens += response.usage.total_tokens as u64;
        totals.cost_dollars += cost;

        debug!(
            overall = score.overall,
            tokens = response.usage.total_tokens,
            cumulative_cost = totals.cost_dollars,
            "Judge scored output"
        );

        Ok(score)
    }
}
