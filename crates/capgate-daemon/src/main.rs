//! policygate-daemon entry point.
//!
//! Thin on purpose: parses arguments, loads the policy and starting state,
//! builds the shared `AppState`, wires tracing, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state types live in
//! `state.rs`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use capgate_audit::AuditLog;
use capgate_broker_sim::SimulatedBroker;
use capgate_daemon::{routes, state};
use capgate_engine::PolicyEngine;
use capgate_types::{ExecutionState, MarketSnapshot, PortfolioState};
use clap::Parser;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "policygate-daemon")]
#[command(about = "HTTP intake for the capital-risk policy gate", long_about = None)]
struct Cli {
    #[arg(long)]
    policy: PathBuf,
    #[arg(long)]
    portfolio: PathBuf,
    #[arg(long)]
    market: PathBuf,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8100)]
    port: u16,
    #[arg(long = "audit-log")]
    audit_log: Option<PathBuf>,
    #[arg(long = "exec-log")]
    exec_log: Option<PathBuf>,
    /// Bearer token required on every request. No token means no auth check.
    #[arg(long)]
    token: Option<String>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let engine = PolicyEngine::load(&cli.policy)?;
    let portfolio: PortfolioState = load_json(&cli.portfolio)?;
    portfolio
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid portfolio: {msg}"))?;
    let market: MarketSnapshot = load_json(&cli.market)?;
    market
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid market snapshot: {msg}"))?;

    let server_state = state::ServerState {
        engine,
        portfolio,
        market,
        execution: ExecutionState::default(),
        broker: SimulatedBroker::new(),
        run_id: Uuid::new_v4(),
        audit_log: cli.audit_log.as_deref().map(AuditLog::new),
        exec_log_path: cli.exec_log,
    };
    let shared = state::AppState::new(server_state, cli.token);

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid host/port: {}:{}", cli.host, cli.port))?;
    info!("policygate-daemon listening on http://{addr}");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
