//! SSE endpoint streaming a side-by-side comparison: the tiered
//! pipeline versus a single Deep-model baseline on the same task and
//! budget.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Sse,
    response::sse::Event,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tierflow_ai::GenerationRequest;
use tierflow_models::{ExecutionPlan, TaskGraph, Tier};
use tokio::sync::mpsc;
use tracing::error;

use super::AppState;
use crate::allocator::Allocator;
use crate::batch::Pipeline;
use crate::prompt::build_context;
use crate::text_metrics::compute_text_metrics;

const GENERATION_TEMPERATURE: f32 = 0.4;
const BASELINE_MIN_TOKENS: u32 = 256;
const BASELINE_MAX_TOKENS: u32 = 65_536;

#[derive(Debug, Deserialize)]
pub(super) struct CompareParams {
    #[serde(default)]
    task: String,
    #[serde(default = "default_budget")]
    budget: f64,
    #[serde(default = "default_mode")]
    mode: String,
}

fn default_budget() -> f64 {
    0.08
}

fn default_mode() -> String {
    "capped".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Tiered,
    Baseline,
}

enum CompareEvent {
    Emit { name: &'static str, data: Value },
    SideDone {
        side: Side,
        deliverable: String,
        total_cost: f64,
    },
}

fn sse_event(name: &str, data: &Value) -> std::result::Result<Event, Infallible> {
    Ok(Event::default().event(name).data(data.to_string()))
}

pub(super) async fn compare_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompareParams>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let task = params.task.trim().to_string();
        if task.is_empty() {
            yield sse_event("error", &json!({"message": "task is required"}));
            return;
        }
        let budget = params.budget;
        let mode = params.mode.clone();

        let pipeline = state.pipeline.clone();
        let outcome = match pipeline.plan(&task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                yield sse_event("error", &json!({"message": e.to_string()}));
                return;
            }
        };
        let planner_cost = outcome.cost_dollars(&pipeline.config().catalog);

        let plan = match Allocator::new(pipeline.config().clone())
            .allocate(&outcome.graph, budget, planner_cost)
        {
            Ok(plan) => plan,
            Err(e) => {
                yield sse_event("error", &json!({"message": e.to_string()}));
                return;
            }
        };

        let subtasks: Vec<Value> = outcome
            .graph
            .subtasks
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "description": s.description,
                    "complexity": s.complexity.as_str(),
                    "dependencies": s.dependencies,
                })
            })
            .collect();
        let allocations: Vec<Value> = plan
            .allocations
            .iter()
            .map(|a| {
                json!({
                    "subtask_id": a.subtask_id,
                    "tier": a.tier.as_str(),
                    "model": a.model,
                    "max_tokens": a.max_tokens,
                    "skipped": a.skipped,
                })
            })
            .collect();

        yield sse_event("plan", &json!({
            "subtasks": subtasks,
            "allocations": allocations,
            "planner_cost": planner_cost,
            "total_subtasks": outcome.graph.len(),
        }));

        let (tx, mut rx) = mpsc::channel::<CompareEvent>(64);

        {
            let pipeline = pipeline.clone();
            let task = task.clone();
            let graph = outcome.graph.clone();
            let plan = plan.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                run_tiered(pipeline, task, graph, plan, planner_cost, tx).await;
            });
        }
        {
            let pipeline = pipeline.clone();
            let task = task.clone();
            let mode = mode.clone();
            tokio::spawn(async move {
                run_baseline(pipeline, task, budget, mode, tx).await;
            });
        }

        let mut done = 0usize;
        let mut tiered_deliverable = String::new();
        let mut baseline_deliverable = String::new();
        let mut tiered_cost = 0.0f64;
        let mut baseline_cost = 0.0f64;

        while done < 2 {
            let Some(event) = rx.recv().await else {
                break;
            };
            match event {
                CompareEvent::Emit { name, data } => {
                    yield sse_event(name, &data);
                }
                CompareEvent::SideDone { side, deliverable, total_cost } => {
                    done += 1;
                    match side {
                        Side::Tiered => {
                            tiered_deliverable = deliverable;
                            tiered_cost = total_cost;
                        }
                        Side::Baseline => {
                            baseline_deliverable = deliverable;
                            baseline_cost = total_cost;
                        }
                    }
                }
            }
        }

        let evaluator = pipeline.new_evaluator();
        let tiered_quality = if tiered_deliverable.is_empty() {
            None
        } else {
            evaluator.evaluate_deliverable(&task, &tiered_deliverable).await.ok()
        };
        let baseline_quality = if baseline_deliverable.is_empty() {
            None
        } else {
            evaluator.evaluate_deliverable(&task, &baseline_deliverable).await.ok()
        };

        yield sse_event("quality", &json!({
            "tiered": &tiered_quality,
            "baseline": &baseline_quality,
        }));

        yield sse_event("text_metrics", &json!({
            "tiered": compute_text_metrics(&tiered_deliverable),
            "baseline": compute_text_metrics(&baseline_deliverable),
        }));

        yield sse_event("done", &json!({
            "tiered_cost": tiered_cost,
            "baseline_cost": baseline_cost,
            "tiered_quality": tiered_quality.map(|q| q.overall),
            "baseline_quality": baseline_quality.map(|q| q.overall),
            "mode": mode,
            "budget": budget,
        }));
    };

    Sse::new(stream)
}

async fn emit(tx: &mpsc::Sender<CompareEvent>, name: &'static str, data: Value) {
    let _ = tx.send(CompareEvent::Emit { name, data }).await;
}

/// Walk the static plan, streaming chunks as they arrive.
async fn run_tiered(
    pipeline: Pipeline,
    task: String,
    graph: TaskGraph,
    plan: ExecutionPlan,
    planner_cost: f64,
    tx: mpsc::Sender<CompareEvent>,
) {
    let catalog = pipeline.config().catalog.clone();
    let clients = pipeline.tier_clients().clone();
    let order = graph.topo_order();
    let total_subtasks = order.len();

    let mut outputs: HashMap<u32, String> = HashMap::new();
    let mut total_cost = planner_cost;

    for (idx, &sid) in order.iter().enumerate() {
        let progress = format!("{}/{}", idx + 1, total_subtasks);
        let (Some(alloc), Some(subtask)) = (plan.allocation(sid), graph.get(sid)) else {
            continue;
        };

        if alloc.skipped {
            emit(&tx, "tier_subtask_done", json!({
                "subtask_id": sid,
                "description": subtask.description,
                "skipped": true,
                "cost": 0.0,
                "tokens": 0,
                "output": "",
                "cost_so_far": total_cost,
                "progress": progress,
            }))
            .await;
            continue;
        }

        let prompt = build_context(&task, &subtask.description, &subtask.dependencies, &outputs);
        let request = GenerationRequest::new(prompt)
            .with_max_output_tokens(alloc.max_tokens)
            .with_temperature(GENERATION_TEMPERATURE);

        let mut stream = clients.get(alloc.tier).generate_stream(request);
        let mut output = String::new();
        let mut est_tokens: u32 = 0;
        let mut usage = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    if !chunk.text.is_empty() {
                        output.push_str(&chunk.text);
                        est_tokens += ((chunk.text.len() / 4).max(1)) as u32;
                        let est_cost = catalog.output_cost(alloc.tier, est_tokens);
                        emit(&tx, "tier_chunk", json!({
                            "subtask_id": sid,
                            "delta": chunk.text,
                            "cost_so_far": total_cost + est_cost,
                            "progress": progress,
                        }))
                        .await;
                    }
                }
                Err(e) => {
                    error!(subtask_id = sid, error = %e, "Tiered stream failed");
                    emit(&tx, "error", json!({"message": format!("tiered: {e}")})).await;
                    break;
                }
            }
        }

        let (prompt_tokens, completion_tokens) = usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, est_tokens));
        let cost = catalog.call_cost(alloc.tier, prompt_tokens, completion_tokens);
        total_cost += cost;
        outputs.insert(sid, output.clone());

        emit(&tx, "tier_subtask_done", json!({
            "subtask_id": sid,
            "description": subtask.description,
            "tier": alloc.tier.as_str(),
            "skipped": false,
            "tokens": completion_tokens,
            "cost": cost,
            "cost_so_far": total_cost,
            "output": output,
            "progress": progress,
        }))
        .await;
    }

    let parts: Vec<&str> = order
        .iter()
        .filter_map(|sid| outputs.get(sid))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    let deliverable = parts.join("\n\n");

    let _ = tx
        .send(CompareEvent::SideDone {
            side: Side::Tiered,
            deliverable,
            total_cost,
        })
        .await;
}

/// One uncapped (or budget-capped) Deep call on the raw task.
async fn run_baseline(
    pipeline: Pipeline,
    task: String,
    budget: f64,
    mode: String,
    tx: mpsc::Sender<CompareEvent>,
) {
    let catalog = pipeline.config().catalog.clone();
    let clients = pipeline.tier_clients().clone();
    let tier = Tier::Deep;

    let mut request = GenerationRequest::new(task).with_temperature(GENERATION_TEMPERATURE);
    if mode == "capped" {
        let price_per_token = catalog.spec(tier).output_price_per_1m / 1_000_000.0;
        let max_tokens = if price_per_token > 0.0 {
            (budget / price_per_token) as u32
        } else {
            8192
        };
        request = request
            .with_max_output_tokens(max_tokens.clamp(BASELINE_MIN_TOKENS, BASELINE_MAX_TOKENS));
    }

    let mut stream = clients.get(tier).generate_stream(request);
    let mut output = String::new();
    let mut est_tokens: u32 = 0;
    let mut usage = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if chunk.usage.is_some() {
                    usage = chunk.usage;
                }
                if !chunk.text.is_empty() {
                    output.push_str(&chunk.text);
                    est_tokens += ((chunk.text.len() / 4).max(1)) as u32;
                    emit(&tx, "baseline_chunk", json!({
                        "delta": chunk.text,
                        "tokens_so_far": est_tokens,
                        "cost_so_far": catalog.output_cost(tier, est_tokens),
                    }))
                    .await;
                }
            }
            Err(e) => {
                error!(error = %e, "Baseline stream failed");
                emit(&tx, "error", json!({"message": format!("baseline: {e}")})).await;
                break;
            }
        }
    }

    let (prompt_tokens, completion_tokens) = usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, est_tokens));
    let total_cost = catalog.call_cost(tier, prompt_tokens, completion_tokens);

    emit(&tx, "baseline_done", json!({
        "tokens": completion_tokens,
        "prompt_tokens": prompt_tokens,
        "cost": total_cost,
        "output": output,
    }))
    .await;

    let _ = tx
        .send(CompareEvent::SideDone {
            side: Side::Baseline,
            deliverable: output,
            total_cost,
        })
        .await;
}
