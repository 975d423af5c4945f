//! Prompt assembly for subtask dispatch.

use std::collections::HashMap;

/// Build the prompt sent to a tier model for one subtask: the overall
/// task, the subtask itself, and the output of every dependency. The
/// closing instruction forbids restating prior content.
pub fn build_context(
    task: &str,
    subtask_desc: &str,
    dep_ids: &[u32],
    outputs: &HashMap<u32, String>,
) -> String {
    let mut parts = vec![
        format!("OVERALL TASK: {task}\n"),
        format!("YOUR SUBTASK: {subtask_desc}\n"),
    ];

    if !dep_ids.is_empty() {
        parts.push("CONTEXT FROM PRIOR SUBTASKS:\n".to_string());
        for did in dep_ids {
            if let Some(text) = outputs.get(did) {
                if !text.is_empty() {
                    parts.push(format!("--- Subtask {did} output ---\n{text}\n"));
                }
            }
        }
    }

    parts.push(
        "Produce a thorough, high-quality response for YOUR SUBTASK. \
         Use the context above where relevant but DO NOT repeat or \
         restate content from prior subtasks. Produce only NEW content."
            .to_string(),
    );
    parts.join("\n")
}
