//! tracegrade - evaluation and blind comparison CLI
//!
//! Runs the engine against a JSON fixture file instead of a database.
//!
//! ## Commands
//!
//! - `evaluate`: run evaluations against one trace
//! - `compare`: blind-compare two analyses with a judge model
//! - `show-config`: print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use tracegrade_core::{
    AdapterRegistry, CancelSignal, ComparisonOrchestrator, ComparisonResponse,
    CreateComparisonRequest, EngineConfig, EvaluationExecutor, EvaluationResponse, HttpGateway,
    ModelGateway, RunEvaluationsRequest, METRICS,
};
use tracegrade_store::{ComparisonLedger, EvaluationId, FixtureStore};

#[derive(Parser)]
#[command(name = "tracegrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate LLM traces and blind-compare analyses", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "TRACEGRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Override gateway.api_base from the config file
    #[arg(long, global = true, env = "TRACEGRADE_API_BASE")]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run evaluations against a recorded trace
    Evaluate {
        /// Fixture file with traces and evaluation definitions
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Trace to evaluate
        #[arg(long)]
        trace: String,

        /// Evaluation id to run (repeatable, runs in the given order)
        #[arg(short, long = "eval", required = true)]
        evals: Vec<String>,

        /// Model used by every LLM-graded evaluation in this run
        #[arg(long)]
        model_override: Option<String>,

        /// Requesting organization (defaults to the trace's)
        #[arg(long)]
        org: Option<String>,
    },

    /// Blind-compare two analyses stage by stage
    Compare {
        /// Fixture file with analyses
        #[arg(short, long)]
        fixtures: PathBuf,

        /// First analysis (reported as A)
        analysis_a: String,

        /// Second analysis (reported as B)
        analysis_b: String,

        /// Judge model
        #[arg(long)]
        judge_model: String,

        /// Evaluation criterion (repeatable)
        #[arg(long = "criterion", required = true)]
        criteria: Vec<String>,

        /// Requesting organization (defaults to analysis A's)
        #[arg(long)]
        org: Option<String>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracegrade_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.api_base)?;

    let outcome = match cli.command {
        Commands::Evaluate {
            fixtures,
            trace,
            evals,
            model_override,
            org,
        } => {
            let store = load_fixtures(&fixtures).await?;
            let gateway = http_gateway(&config)?;
            let cancel = CancelSignal::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, finishing in-flight evaluations");
                    on_interrupt.cancel();
                }
            });
            let request = evaluate_request(&trace, &evals, model_override, org);
            cmd_evaluate(&store, gateway, &config, request, cancel)
                .await
                .and_then(|responses| print_json(&responses))
        }
        Commands::Compare {
            fixtures,
            analysis_a,
            analysis_b,
            judge_model,
            criteria,
            org,
        } => {
            let store = load_fixtures(&fixtures).await?;
            let gateway = http_gateway(&config)?;
            let mut request =
                CreateComparisonRequest::new(analysis_a, analysis_b, judge_model, criteria);
            if let Some(org) = org {
                request = request.for_organization(org);
            }
            cmd_compare(&store, gateway, &config, request)
                .await
                .and_then(|response| print_json(&response))
        }
        Commands::ShowConfig => cmd_show_config(&config).map(|rendered| print!("{rendered}")),
    };

    METRICS.flush();
    outcome
}

/// Defaults, then the config file, then command-line overrides.
fn load_config(path: Option<&Path>, api_base: Option<String>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(api_base) = api_base {
        config.gateway.api_base = api_base;
    }
    Ok(config)
}

async fn load_fixtures(path: &Path) -> Result<FixtureStore> {
    FixtureStore::load(path)
        .await
        .with_context(|| format!("Failed to load fixtures {}", path.display()))
}

fn http_gateway(config: &EngineConfig) -> Result<Arc<dyn ModelGateway>> {
    let gateway = HttpGateway::from_config(config.gateway.clone())
        .context("Failed to build model gateway")?;
    Ok(Arc::new(gateway))
}

fn evaluate_request(
    trace: &str,
    evals: &[String],
    model_override: Option<String>,
    org: Option<String>,
) -> RunEvaluationsRequest {
    let ids = evals.iter().map(|e| EvaluationId::from(e.as_str())).collect();
    let mut request = RunEvaluationsRequest::new(trace, ids);
    if let Some(model) = model_override {
        request = request.with_model_override(model);
    }
    if let Some(org) = org {
        request = request.for_organization(org);
    }
    request
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run evaluations against a fixture trace
async fn cmd_evaluate(
    store: &FixtureStore,
    gateway: Arc<dyn ModelGateway>,
    config: &EngineConfig,
    request: RunEvaluationsRequest,
    cancel: CancelSignal,
) -> Result<Vec<EvaluationResponse>> {
    let registry = Arc::new(AdapterRegistry::new(gateway, &config.executor));
    let executor = EvaluationExecutor::new(
        store.traces.clone(),
        store.definitions.clone(),
        store.results.clone(),
        registry,
        config.executor.clone(),
    );

    let trace_id = request.trace_id.clone();
    let results = executor
        .run_with_cancel(request, cancel)
        .await
        .with_context(|| format!("Failed to evaluate trace {trace_id}"))?;

    let failed = results.iter().filter(|r| r.is_failed()).count();
    info!(
        trace_id = %trace_id,
        evaluations = results.len(),
        failed,
        "evaluations finished"
    );
    Ok(results.iter().map(EvaluationResponse::from).collect())
}

/// Compare two fixture analyses
async fn cmd_compare(
    store: &FixtureStore,
    gateway: Arc<dyn ModelGateway>,
    config: &EngineConfig,
    request: CreateComparisonRequest,
) -> Result<ComparisonResponse> {
    let registry = Arc::new(AdapterRegistry::new(gateway, &config.executor));
    let orchestrator = ComparisonOrchestrator::new(
        store.analyses.clone(),
        store.comparisons.clone(),
        registry,
        config.comparison.clone(),
    );

    let label = format!("{} vs {}", request.analysis_a_id, request.analysis_b_id);
    let record = orchestrator
        .compare(request)
        .await
        .with_context(|| format!("Comparison {label} failed"))?;

    let stages = store.comparisons.stages(&record.id).await?;
    info!(
        comparison_id = %record.id,
        stages = stages.len(),
        winner = ?record.overall_winner,
        "comparison finished"
    );
    Ok(ComparisonResponse::from(&record))
}

fn cmd_show_config(config: &EngineConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render config")
}
