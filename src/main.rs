use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use symbiont::chaos::{ChaosKind, FaultInjector};
use symbiont::config::{self, WatchConfig};
use symbiont::validate::PythonSyntaxValidator;
use symbiont::watcher::Watcher;
use symbiont::GroqArchitect;

#[derive(Parser)]
#[command(name = "symbiont")]
#[command(version)]
#[command(about = "Supervise a worker process and heal it with LLM-generated patches")]
struct Args {
    /// Path to the worker source file to supervise
    #[arg(default_value = "organism.py")]
    worker: PathBuf,

    /// Interpreter used to run the worker and parse candidates
    #[arg(long, default_value = "python3")]
    interpreter: String,

    /// Seconds to sleep between supervision cycles
    #[arg(long, default_value_t = 3.0)]
    interval: f64,

    /// Hard per-run timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Latency target in seconds (overrides the TARGET_LATENCY env var)
    #[arg(long)]
    target_latency: Option<f64>,

    /// Corrupt the worker once and exit instead of supervising
    #[arg(long, value_enum)]
    chaos: Option<ChaosKind>,

    /// RNG seed for reproducible chaos injection
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if let Some(kind) = args.chaos {
        run_one_shot_chaos(&args, kind);
        return;
    }

    let mut cfg = WatchConfig::for_worker(&args.worker);
    cfg.interpreter = args.interpreter.clone();
    cfg.cycle_interval = Duration::from_secs_f64(args.interval.max(0.0));
    cfg.worker_timeout = Duration::from_secs_f64(args.timeout.max(0.1));
    if let Some(target) = args.target_latency {
        cfg.target_latency = target;
    }

    let architect = match GroqArchitect::from_env() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{} {e}", "error:".bright_red());
            eprintln!("export GROQ_API_KEY to enable the healing backend");
            std::process::exit(1);
        }
    };
    let validator = PythonSyntaxValidator::new(&args.interpreter);

    let mut watcher = Watcher::new(cfg.clone(), architect, validator);
    if let Some(seed) = args.seed {
        watcher = watcher.with_chaos_seed(seed);
    }
    let handle = watcher.handle();

    println!("{}", "symbiont — self-healing worker supervisor".bright_cyan().bold());
    println!("  worker:         {}", args.worker.display().to_string().bright_white());
    println!("  target latency: {:.1}s", cfg.target_latency);
    println!("  serving port:   {} (for the status API layer)", config::port_from_env());
    println!();

    let loop_task = tokio::spawn(watcher.run());

    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("{}", "failed to listen for ctrl-c; stopping".bright_red());
    }
    handle.stop();
    let _ = loop_task.await;

    let report = handle.status();
    println!();
    println!("{}", "final status".bright_cyan().bold());
    println!("  generation:    {}", report.generation);
    println!("  status:        {}", report.status);
    println!("  successes:     {}", report.success_count);
    println!("  crashes:       {}", report.crash_count);
    println!("  last mutation: {}", report.last_mutation);
}

fn run_one_shot_chaos(args: &Args, kind: ChaosKind) {
    let mut injector = match args.seed {
        Some(seed) => FaultInjector::with_seed(&args.worker, seed),
        None => FaultInjector::new(&args.worker),
    };
    match injector.inject(kind) {
        Ok(c) => {
            println!(
                "{} {} — {}",
                "chaos injected:".bright_yellow(),
                c.kind.to_string().bright_white(),
                c.detail
            );
        }
        Err(e) => {
            eprintln!("{} chaos injection failed: {e}", "error:".bright_red());
            std::process::exit(1);
        }
    }
}
