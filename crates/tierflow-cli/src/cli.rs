use clap::Parser;

#[derive(Parser)]
#[command(name = "tierflow")]
#[command(
    version,
    about = "TierFlow - budget-constrained, quality-adaptive model orchestration"
)]
pub struct Cli {
    /// Task to decompose and execute
    pub task: Option<String>,

    /// Dollar budget for a single run
    #[arg(long, env = "BUDGET_DOLLARS", default_value_t = 0.08)]
    pub budget: f64,

    /// Sweep several budgets instead of a single run
    #[arg(long)]
    pub batch: bool,

    /// Comma-separated budget list for --batch (e.g. 0.01,0.05,0.1)
    #[arg(long, value_delimiter = ',')]
    pub budgets: Vec<f64>,

    /// Concurrent runs in batch mode
    #[arg(long, default_value_t = 3)]
    pub concurrency: usize,

    /// Disable judge scoring of subtask outputs and the deliverable
    #[arg(long)]
    pub no_eval: bool,

    /// Use the dynamic ROI executor instead of the static cascade
    #[arg(long)]
    pub dynamic: bool,

    /// Directory for JSONL run traces
    #[arg(long, env = "TIERFLOW_TRACE_DIR", default_value = "traces")]
    pub trace_dir: String,

    /// Serve the HTTP dashboard instead of running a task
    #[arg(long)]
    pub serve: bool,

    /// Dashboard port
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Print the stored-trace comparison table (optionally filtered by TASK)
    #[arg(long)]
    pub report: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
