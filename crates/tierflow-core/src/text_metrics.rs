//! Deterministic text-level quality and verbosity metrics.
//!
//! Post-hoc analysis of produced outputs; never consulted by the
//! scheduler.

use std::collections::HashMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use once_cell::sync::Lazy;
use regex::Regex;
use tierflow_models::TextMetrics;

/// Phrases that pad output without adding information.
const FILLER_PHRASES: &[&str] = &[
    "it is important to note",
    "it's important to note",
    "it is worth noting",
    "it's worth noting",
    "as mentioned earlier",
    "as previously mentioned",
    "as noted above",
    "in order to",
    "for the purpose of",
    "at the end of the day",
    "in today's world",
    "it goes without saying",
    "needless to say",
    "essentially",
    "basically",
    "fundamentally",
    "in conclusion",
    "to summarize",
    "in summary",
    "overall",
    "moving forward",
    "going forward",
    "it should be noted that",
    "it can be seen that",
    "the fact that",
];

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());
static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]+\b").unwrap());

fn type_token_ratio(words: &[&str]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let unique: std::collections::HashSet<&&str> = words.iter().collect();
    unique.len() as f64 / words.len() as f64
}

fn compression_ratio(text: &str) -> f64 {
    let raw = text.as_bytes();
    if raw.is_empty() {
        return 0.0;
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
    let compressed_len = encoder
        .write_all(raw)
        .and_then(|_| encoder.finish())
        .map(|out| out.len())
        .unwrap_or(raw.len());
    compressed_len as f64 / raw.len() as f64
}

/// Fraction of 3-grams that appear more than once.
fn ngram_repetition_rate(words: &[&str], n: usize) -> f64 {
    if words.len() < n {
        return 0.0;
    }
    let mut counts: HashMap<&[&str], usize> = HashMap::new();
    for window in words.windows(n) {
        *counts.entry(window).or_default() += 1;
    }
    let repeated = counts.values().filter(|&&c| c > 1).count();
    repeated as f64 / counts.len() as f64
}

fn avg_sentence_length(text: &str) -> f64 {
    let sentences: Vec<&str> = SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let total_words: usize = sentences
        .iter()
        .map(|s| WORD_SPLIT.find_iter(s).count())
        .sum();
    total_words as f64 / sentences.len() as f64
}

fn filler_phrase_count(text_lower: &str) -> usize {
    FILLER_PHRASES
        .iter()
        .map(|phrase| text_lower.matches(phrase).count())
        .sum()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Analyse `text` and return all computed fields. Empty or whitespace
/// input yields the zero-valued default.
pub fn compute_text_metrics(text: &str) -> TextMetrics {
    if text.trim().is_empty() {
        return TextMetrics::default();
    }

    let text_lower = text.to_lowercase();
    let words: Vec<&str> = WORD_SPLIT
        .find_iter(&text_lower)
        .map(|m| m.as_str())
        .collect();

    TextMetrics {
        word_count: words.len(),
        type_token_ratio: round_to(type_token_ratio(&words), 4),
        compression_ratio: round_to(compression_ratio(text), 4),
        ngram_repetition_rate: round_to(ngram_repetition_rate(&words, 3), 4),
        avg_sentence_length: round_to(avg_sentence_length(text), 2),
        filler_phrase_count: filler_phrase_count(&text_lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_defaults() {
        let metrics = compute_text_metrics("   ");
        assert_eq!(metrics.word_count, 0);
        assert_eq!(metrics.compression_ratio, 0.0);
    }

    #[test]
    fn test_word_count_and_ttr() {
        let metrics = compute_text_metrics("the cat sat on the mat");
        assert_eq!(metrics.word_count, 6);
        // "the" repeats: 5 unique / 6 total
        assert!((metrics.type_token_ratio - round_to(5.0 / 6.0, 4)).abs() < 1e-9);
    }

    #[test]
    fn test_repetitive_text_has_high_ngram_rate() {
        let repetitive = "alpha beta gamma alpha beta gamma alpha beta gamma";
        let varied = "one two three four five six seven eight nine";
        let rep = compute_text_metrics(repetitive);
        let var = compute_text_metrics(varied);
        assert!(rep.ngram_repetition_rate > var.ngram_repetition_rate);
        assert_eq!(var.ngram_repetition_rate, 0.0);
    }

    #[test]
    fn test_compression_ratio_lower_for_redundant_text() {
        let redundant = "same same same same same same same same same same".repeat(20);
        let mixed = "Quartz jolted vexed nymphs by fog; wizard packs climb deftly.";
        let red = compute_text_metrics(&redundant);
        let mix = compute_text_metrics(mixed);
        assert!(red.compression_ratio < mix.compression_ratio);
    }

    #[test]
    fn test_filler_phrases_are_counted() {
        let metrics = compute_text_metrics(
            "It is important to note that, basically, we proceed. In conclusion, done.",
        );
        assert_eq!(metrics.filler_phrase_count, 3);
    }

    #[test]
    fn test_avg_sentence_length() {
        let metrics = compute_text_metrics("One two three. Four five. Six seven eight nine.");
        assert!((metrics.avg_sentence_length - 3.0).abs() < 1e-9);
    }
}
