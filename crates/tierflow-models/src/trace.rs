//! Persisted run records. One `RunTrace` is written per completed run;
//! serialising to JSON and back must be loss-free.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quality::{QualityScore, TextMetrics};
use crate::tier::Tier;

/// Planning-call record: what the decomposition itself cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerTrace {
    pub task: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_dollars: f64,
    /// The validated graph as serialized JSON.
    pub graph_json: String,
}

/// Per-subtask record inside a run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskTrace {
    pub subtask_id: u32,
    pub description: String,
    pub tier: Tier,
    pub model: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub prompt: String,
    pub output: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_dollars: f64,
    pub surplus: u32,
    pub skipped: bool,
    /// Omitted when the judge was disabled or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_metrics: Option<TextMetrics>,
}

/// One full run: planning, per-subtask execution, and the deliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: String,
    pub task: String,
    pub budget_dollars: f64,
    pub timestamp: DateTime<Utc>,
    pub planner_trace: PlannerTrace,
    pub subtask_traces: Vec<SubTaskTrace>,
    pub deliverable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliverable_quality: Option<QualityScore>,
    pub total_cost_dollars: f64,
    pub evaluation_cost_dollars: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;

    fn sample_trace() -> RunTrace {
        RunTrace {
            run_id: "0b4f6b52-1d2a-4f62-a7c8-9d8e1f203040".to_string(),
            task: "write a short market brief".to_string(),
            budget_dollars: 0.08,
            timestamp: "2025-11-03T12:30:00Z".parse().unwrap(),
            planner_trace: PlannerTrace {
                task: "write a short market brief".to_string(),
                model: "gemini-2.5-flash".to_string(),
                prompt_tokens: 180,
                completion_tokens: 95,
                total_tokens: 275,
                cost_dollars: 0.000084,
                graph_json: "{\"subtasks\":[]}".to_string(),
            },
            subtask_traces: vec![SubTaskTrace {
                subtask_id: 1,
                description: "gather sources".to_string(),
                tier: Tier::Fast,
                model: "gemini-2.5-flash-lite".to_string(),
                max_tokens: 1024,
                prompt: "OVERALL TASK: ...".to_string(),
                output: "three sources found".to_string(),
                prompt_tokens: 40,
                completion_tokens: 12,
                total_tokens: 52,
                cost_dollars: 0.0000088,
                surplus: 1012,
                skipped: false,
                quality: Some(QualityScore {
                    relevance: 7.0,
                    completeness: 6.0,
                    coherence: 8.0,
                    conciseness: 9.0,
                    overall: 7.0,
                    rationale: "solid coverage".to_string(),
                }),
                text_metrics: None,
            }],
            deliverable: "three sources found".to_string(),
            deliverable_quality: None,
            total_cost_dollars: 0.0000928,
            evaluation_cost_dollars: 0.0000031,
        }
    }

    #[test]
    fn test_run_trace_json_round_trip() {
        let trace = sample_trace();
        let json = serde_json::to_string(&trace).unwrap();
        let back: RunTrace = serde_json::from_str(&json).unwrap();

        assert_eq!(back.run_id, trace.run_id);
        assert_eq!(back.timestamp, trace.timestamp);
        assert_eq!(back.budget_dollars, trace.budget_dollars);
        assert_eq!(back.total_cost_dollars, trace.total_cost_dollars);
        assert_eq!(back.subtask_traces.len(), 1);
        assert_eq!(back.subtask_traces[0].tier, Tier::Fast);
        assert_eq!(back.subtask_traces[0].surplus, 1012);
        assert_eq!(
            back.subtask_traces[0].quality.as_ref().unwrap().overall,
            7.0
        );
        // Optional fields absent in the source stay absent.
        assert!(back.deliverable_quality.is_none());
        assert!(back.subtask_traces[0].text_metrics.is_none());
    }

    #[test]
    fn test_absent_quality_is_omitted_from_json() {
        let mut trace = sample_trace();
        trace.subtask_traces[0].quality = None;
        let json = serde_json::to_string(&trace).unwrap();
        assert!(!json.contains("\"quality\""));
    }
}
