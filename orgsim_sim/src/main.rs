//! OrgSim CLI
//!
//! Run a built-in organization for a number of ticks under one decision
//! strategy, optionally recording or replaying transcripts.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use orgsim_env::{HttpTransport, OrgContext, TokioContext};
use orgsim_sim::llm::{LlmConfig, UnifiedClient};
use orgsim_sim::scenarios::ScenarioId;
use orgsim_sim::{
    DecisionRecorder, ModelStrategy, ReplayLibrary, ReplayStrategy, ScenarioResult, ScenarioRunner, SimConfig,
    SimContext,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Rules only
    Deterministic,
    /// Language-model decisions for managers, rules for everyone else
    Model,
    /// Recorded transcripts matched to the orders
    Replay,
}

/// OrgSim - tick-based agent organization simulator
#[derive(Parser, Debug)]
#[command(name = "orgsim")]
#[command(about = "Run a simulated agent organization", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,
    
    /// Scenario to run (pair, startup, acme, all)
    #[arg(short = 'S', long, default_value = "pair")]
    scenario: String,
    
    /// Ticks to run
    #[arg(short, long, default_value = "30")]
    ticks: u64,
    
    /// Order submitted before the first tick (repeatable)
    #[arg(short, long = "order")]
    orders: Vec<String>,
    
    /// Decision strategy tried before the rules
    #[arg(long, value_enum, default_value = "deterministic")]
    strategy: StrategyArg,
    
    /// Transcript directory for replay
    #[arg(long, default_value = "scenarios")]
    transcripts: PathBuf,
    
    /// Save model decisions as a transcript into this directory
    #[arg(long)]
    record: Option<PathBuf>,
    
    /// Route busy agents through the simulated model router
    #[arg(long)]
    router: bool,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

async fn run_scenario<Ctx: OrgContext>(
    args: &Args,
    config: SimConfig,
    ctx: Arc<Ctx>,
    scenario: ScenarioId,
) -> anyhow::Result<ScenarioResult> {
    let mut runner = ScenarioRunner::new(config.clone(), ctx.clone()).with_router(args.router);
    for order in &args.orders {
        runner = runner.with_order(order.clone());
    }
    
    match args.strategy {
        StrategyArg::Deterministic => {}
        StrategyArg::Replay => {
            // A single file is rejected outright; a directory skips bad files
            let library = if args.transcripts.is_file() {
                ReplayLibrary::load_file(&args.transcripts)?
            } else {
                let (library, failures) = ReplayLibrary::load_dir(&args.transcripts)
                    .with_context(|| format!("loading transcripts from {}", args.transcripts.display()))?;
                for failure in &failures {
                    warn!("{}", failure);
                }
                library
            };
            if library.is_empty() {
                bail!("no usable transcripts in {}", args.transcripts.display());
            }
            let replay = ReplayStrategy::new(library)
                .with_threshold(config.replay_threshold)
                .with_stretch(config.replay_stretch);
            runner = runner.with_strategy(Box::new(replay));
        }
        StrategyArg::Model => {
            let llm = LlmConfig::from_env();
            let transport = Arc::new(HttpTransport::new(Duration::from_secs(5))?);
            let client = Arc::new(UnifiedClient::new(llm, ctx, transport));
            let model = ModelStrategy::new(client)
                .with_min_level(config.manager_level)
                .with_limits(config.prompt_limits());
            if let Some(dir) = &args.record {
                let recorder = DecisionRecorder::new(scenario.name(), model.model_name());
                runner = runner.with_recording(recorder, dir.clone());
            }
            runner = runner.with_strategy(Box::new(model));
        }
    }
    
    Ok(runner.run(scenario).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    
    // Logs go to stderr so --json stays parseable
    let level = if args.verbose {
        Level::DEBUG
    } else if args.json {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;
    
    info!("OrgSim v{}", env!("CARGO_PKG_VERSION"));
    
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(anyhow::Error::msg)?]
    };
    
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };
    
    let config = SimConfig {
        seed,
        max_ticks: args.ticks,
        ..Default::default()
    };
    
    let mut results = Vec::new();
    for scenario in scenarios {
        info!("{}: {}", scenario.name(), scenario.description());
        // Live inference runs on the wall clock; everything else is virtual.
        let result = if args.strategy == StrategyArg::Model {
            run_scenario(&args, config.clone(), TokioContext::shared(), scenario).await?
        } else {
            run_scenario(&args, config.clone(), SimContext::shared(seed), scenario).await?
        };
        
        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED: {} decisions, {} applied, {} tasks done",
                    scenario.name(),
                    seed,
                    result.metrics.decisions,
                    result.metrics.applied,
                    result.metrics.last_tick.tasks_by_status.get("done").copied().unwrap_or(0)
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
            if let Some(path) = &result.recording {
                info!("recording saved: {}", path.display());
            }
            if let Some(router) = &result.metrics.router {
                info!(
                    "router: {} requests, ${:.4} spent, ${:.4} saved, {} fallbacks",
                    router.total_requests,
                    router.total_cost,
                    router.savings(),
                    router.fallbacks_triggered
                );
            }
        }
        results.push(result);
    }
    
    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    
    // Exit with proper code for CI
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
