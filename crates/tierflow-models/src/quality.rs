//! Judge scores and deterministic text metrics.

use serde::{Deserialize, Serialize};

/// Four-dimension rubric score from the judge model, each field in
/// [0, 10].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub relevance: f64,
    pub completeness: f64,
    pub coherence: f64,
    pub conciseness: f64,
    pub overall: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Post-hoc text statistics for a produced output. Not consulted by
/// scheduling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextMetrics {
    pub word_count: usize,
    pub type_token_ratio: f64,
    pub compression_ratio: f64,
    pub ngram_repetition_rate: f64,
    pub avg_sentence_length: f64,
    pub filler_phrase_count: usize,
}
