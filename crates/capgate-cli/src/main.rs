use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use capgate_audit::{build_audit_event, AuditLog};
use capgate_broker_sim::SimulatedBroker;
use capgate_engine::PolicyEngine;
use capgate_execution::run_stream;
use capgate_types::{ExecutionState, MarketSnapshot, OrderIntent, PortfolioState};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "policygate")]
#[command(about = "Capital-risk policy gate for trading-signal intents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single order intent against a policy and print the decision.
    Eval {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        intent: PathBuf,
        #[arg(long)]
        portfolio: PathBuf,
        #[arg(long)]
        market: PathBuf,
        #[arg(long)]
        execution: Option<PathBuf>,
        #[arg(long = "audit-log")]
        audit_log: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },

    /// Run a stream of intents from a JSONL file through the gate and a
    /// simulated broker, printing a summary at the end.
    Run {
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        intents: PathBuf,
        #[arg(long)]
        portfolio: PathBuf,
        #[arg(long)]
        market: PathBuf,
        #[arg(long)]
        execution: Option<PathBuf>,
        #[arg(long = "audit-log")]
        audit_log: Option<PathBuf>,
        #[arg(long = "exec-log")]
        exec_log: Option<PathBuf>,
        #[arg(long = "out-summary")]
        out_summary: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn load_intents_jsonl(path: &Path) -> Result<Vec<OrderIntent>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut intents = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let intent: OrderIntent = serde_json::from_str(trimmed)
            .with_context(|| format!("parsing intent at line {} of {}", i + 1, path.display()))?;
        intent
            .validate()
            .map_err(|msg| anyhow::anyhow!("invalid intent at line {}: {msg}", i + 1))?;
        intents.push(intent);
    }
    Ok(intents)
}

/// Renders a serializable value as canonical (key-sorted) JSON, matching the
/// `sort_keys=True` convention every CLI output in this project follows.
fn render_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let as_value = serde_json::to_value(value).context("serializing output")?;
    if pretty {
        serde_json::to_string_pretty(&as_value).context("serializing output")
    } else {
        serde_json::to_string(&as_value).context("serializing output")
    }
}

fn run_eval(
    policy: PathBuf,
    intent: PathBuf,
    portfolio: PathBuf,
    market: PathBuf,
    execution: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let engine = PolicyEngine::load(&policy)?;
    let intent: OrderIntent = load_json(&intent)?;
    intent
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid intent: {msg}"))?;
    let portfolio: PortfolioState = load_json(&portfolio)?;
    portfolio
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid portfolio: {msg}"))?;
    let market: MarketSnapshot = load_json(&market)?;
    market
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid market snapshot: {msg}"))?;
    let execution: ExecutionState = match execution {
        Some(path) => load_json(&path)?,
        None => ExecutionState::default(),
    };

    let decision = engine.evaluate(&intent, &portfolio, &market, &execution);

    if let Some(path) = &audit_log {
        let event = build_audit_event(
            &intent,
            &portfolio,
            &market,
            &execution,
            &decision,
            engine.policy_hash(),
            None,
        );
        AuditLog::new(path).append(&event)?;
    }

    println!("{}", render_json(&decision, pretty)?);

    Ok(if decision.is_routable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[allow(clippy::too_many_arguments)]
fn run_run(
    policy: PathBuf,
    intents: PathBuf,
    portfolio: PathBuf,
    market: PathBuf,
    execution: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    exec_log: Option<PathBuf>,
    out_summary: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let engine = PolicyEngine::load(&policy)?;
    let intents = load_intents_jsonl(&intents)?;
    let mut portfolio: PortfolioState = load_json(&portfolio)?;
    portfolio
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid portfolio: {msg}"))?;
    let market: MarketSnapshot = load_json(&market)?;
    market
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid market snapshot: {msg}"))?;
    let mut execution: ExecutionState = match execution {
        Some(path) => load_json(&path)?,
        None => ExecutionState::default(),
    };

    let audit_log = audit_log.map(AuditLog::new);
    let run_id = Uuid::new_v4();
    let mut broker = SimulatedBroker::new();

    let summary = run_stream(
        &engine,
        &mut broker,
        &intents,
        &mut portfolio,
        &mut execution,
        &market,
        audit_log.as_ref(),
        exec_log.as_deref(),
        Some(run_id),
    )?;

    let report = summary.to_report(&portfolio, &execution);
    let rendered = render_json(&report, pretty)?;
    println!("{rendered}");

    if let Some(path) = out_summary {
        fs::write(&path, format!("{rendered}\n"))
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.cmd {
        Commands::Eval {
            policy,
            intent,
            portfolio,
            market,
            execution,
            audit_log,
            pretty,
        } => run_eval(policy, intent, portfolio, market, execution, audit_log, pretty),
        Commands::Run {
            policy,
            intents,
            portfolio,
            market,
            execution,
            audit_log,
            exec_log,
            out_summary,
            pretty,
        } => run_run(
            policy,
            intents,
            portfolio,
            market,
            execution,
            audit_log,
            exec_log,
            out_summary,
            pretty,
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
