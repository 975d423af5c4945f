mod cli;
mod output;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use cli::Cli;
use tierflow_core::server::{self, AppState};
use tierflow_core::{Pipeline, TraceStore};
use tierflow_models::SchedulerConfig;

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_env_filter(level)
        .init();
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = SchedulerConfig::default();
    let store = Arc::new(TraceStore::new(&cli.trace_dir));

    // Reporting over stored traces needs no credential.
    if cli.report {
        return output::print_trace_report(&store, cli.task.as_deref());
    }

    let api_key = std::env::var("GOOGLE_API_KEY")
        .map_err(|_| anyhow!("GOOGLE_API_KEY is not set in the environment"))?;

    let pipeline = Pipeline::from_api_key(&api_key, config)?
        .with_store(store.clone())
        .with_dynamic(cli.dynamic)
        .with_evaluation(!cli.no_eval);

    if cli.serve {
        let state = Arc::new(AppState { pipeline, store });
        let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
        server::serve(state, addr).await?;
        return Ok(());
    }

    let task = cli
        .task
        .clone()
        .ok_or_else(|| anyhow!("a task is required (or pass --serve / --report)"))?;

    if cli.batch {
        let budgets = if cli.budgets.is_empty() {
            vec![cli.budget]
        } else {
            cli.budgets.clone()
        };
        let traces = pipeline
            .run_batch(&task, &budgets, cli.concurrency, Duration::from_secs(1))
            .await?;
        output::print_trace_table(&traces);
        return Ok(());
    }

    let outcome = pipeline.plan(&task).await?;
    output::print_graph(&outcome);
    let run = pipeline.run_single(&outcome, cli.budget).await?;
    output::print_run(&run);
    Ok(())
}
