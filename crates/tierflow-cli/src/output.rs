//! Console rendering of graphs, run results, and trace comparisons.

use tierflow_core::planner::PlannerOutcome;
use tierflow_core::text_metrics::compute_text_metrics;
use tierflow_core::{RunOutput, TraceStore};
use tierflow_models::RunTrace;

pub fn print_graph(outcome: &PlannerOutcome) {
    println!("{}", "=".repeat(60));
    println!("TASK GRAPH");
    println!("{}", "=".repeat(60));
    for subtask in &outcome.graph.subtasks {
        let deps = if subtask.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (depends on: {:?})", subtask.dependencies)
        };
        println!("  [{}] {}", subtask.id, subtask.description);
        println!("       complexity: {}{}", subtask.complexity, deps);
    }
    println!();
    println!("Planner model:  {}", outcome.model);
    println!("Prompt tokens:  {}", outcome.usage.prompt_tokens);
    println!("Output tokens:  {}", outcome.usage.completion_tokens);
    println!("Total tokens:   {}", outcome.usage.total_tokens);
    println!();
}

pub fn print_run(output: &RunOutput) {
    let report = &output.report;

    println!("{}", "=".repeat(60));
    println!("SUBTASKS");
    println!("{}", "=".repeat(60));
    for result in &report.subtask_results {
        if result.skipped {
            println!("  [{}] skipped (budget pressure)", result.subtask_id);
            continue;
        }
        println!(
            "  [{}] {} @ {} | {} tokens | ${:.6} | {} attempt(s)",
            result.subtask_id,
            result.description,
            result.tier,
            result.total_tokens,
            result.cost_dollars,
            result.attempts.len().max(1),
        );
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("COST REPORT");
    println!("{}", "=".repeat(60));
    println!("Budget:          ${:.4}", report.budget_dollars);
    println!("Spent:           ${:.6}", report.spent_dollars);
    println!("Remaining:       ${:.6}", report.remaining_dollars);
    println!("Utilization:     {:.1}%", report.utilization_pct);
    println!(
        "Tier mix:        fast={} verify={} deep={}",
        report.tier_counts.get("fast").copied().unwrap_or(0),
        report.tier_counts.get("verify").copied().unwrap_or(0),
        report.tier_counts.get("deep").copied().unwrap_or(0),
    );
    println!(
        "Skipped/downgraded/upgraded: {}/{}/{}",
        report.subtasks_skipped, report.subtasks_downgraded, report.total_upgrades
    );
    println!("Token efficiency: {:.1}%", report.token_efficiency_pct);
    println!(
        "DAG: {} subtasks, depth {}, {} parallelizable",
        report.total_subtasks, report.max_depth, report.parallelizable_subtasks
    );
    if !report.downgrades_applied.is_empty() {
        println!("Adjustments:");
        for entry in &report.downgrades_applied {
            println!("  - {entry}");
        }
    }
    if report.evaluation_cost_dollars > 0.0 {
        println!(
            "Judge cost (meta): ${:.6}",
            report.evaluation_cost_dollars
        );
    }
    if let Some(quality) = &output.trace.deliverable_quality {
        println!(
            "Deliverable quality: {:.1}/10 ({})",
            quality.overall, quality.rationale
        );
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("DELIVERABLE");
    println!("{}", "=".repeat(60));
    println!("{}", output.trace.deliverable);
}

pub fn print_trace_table(traces: &[RunTrace]) {
    if traces.is_empty() {
        println!("No traces found.");
        return;
    }

    println!(
        "{:>8}  {:>10}  {:>5}  {:>5}  {:>6}  {:>6}  {:>4}  {:>6}",
        "Budget", "Spent", "Qual", "TTR", "Compr", "Ngram", "Fill", "Words"
    );
    for trace in traces {
        let metrics = compute_text_metrics(&trace.deliverable);
        let quality = trace
            .deliverable_quality
            .as_ref()
            .map(|q| format!("{:>5.1}", q.overall))
            .unwrap_or_else(|| "  n/a".to_string());
        println!(
            "${:>7.4}  ${:>9.6}  {}  {:>5.3}  {:>6.3}  {:>6.3}  {:>4}  {:>6}",
            trace.budget_dollars,
            trace.total_cost_dollars,
            quality,
            metrics.type_token_ratio,
            metrics.compression_ratio,
            metrics.ngram_repetition_rate,
            metrics.filler_phrase_count,
            metrics.word_count,
        );
    }
}

pub fn print_trace_report(store: &TraceStore, task: Option<&str>) -> anyhow::Result<()> {
    let traces = match task {
        Some(task) => store.load_for_task(task)?,
        None => store.load_all()?,
    };
    print_trace_table(&traces);
    Ok(())
}
