use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use depot_lifecycle::config::DepotConfig;
use depot_lifecycle::request_lifecycle::memory::{
    InMemoryAuditSink, InMemoryChannelService, InMemoryRequestStore,
};
use depot_lifecycle::request_lifecycle::{
    Actor, Appointment, AutoTransitionOutcome, AutoTransitionTrigger, DocumentKind,
    ExecutorSettings, Request, RequestId, RequestStore, RequestType, Role, State, StateGraph,
    TransitionExecutor, TransitionRequest, TransitionValidator, TriggerReasons,
};
use depot_lifecycle::observability::TransitionMetrics;
use depot_lifecycle::telemetry::init_telemetry;
#[cfg(feature = "database")]
use depot_lifecycle::SqliteRequestStore;
#[cfg(not(feature = "database"))]
use tracing::warn;

#[derive(Parser)]
#[command(name = "depot-lifecycle")]
#[command(about = "Depot request lifecycle orchestration")]
#[command(long_about = "Inspect the depot request transition graph, check whether a role may \
                       take a transition, or run a full import flow against in-memory services.")]
struct Cli {
    /// Load configuration from this TOML file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every request state and its outgoing transitions
    States,
    /// Show the transitions a role may take from a state
    Next {
        #[arg(long, help = "Current state, e.g. SCHEDULED")]
        from: String,
        #[arg(long, help = "Actor role, e.g. SaleAdmin")]
        role: String,
    },
    /// Check whether a role may move a request between two states
    Check {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        role: String,
        #[arg(long, help = "Reason for the transition; required for rejections")]
        reason: Option<String>,
    },
    /// Run an import request from PENDING to IN_YARD against in-memory services
    Demo {
        /// Print the final request as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    DepotConfig::load_env_file()?;
    let config = match &cli.config {
        Some(path) => DepotConfig::load_from(path)?,
        None => DepotConfig::load()?,
    };
    init_telemetry(&config.observability)?;

    let graph = Arc::new(StateGraph::depot());

    match cli.command {
        Commands::States => states_command(&graph),
        Commands::Next { from, role } => next_command(&graph, &from, &role),
        Commands::Check {
            from,
            to,
            role,
            reason,
        } => check_command(graph, &from, &to, &role, reason.as_deref()),
        Commands::Demo { json } => tokio::runtime::Runtime::new()?
            .block_on(async { demo_command(graph, &config, json).await }),
    }
}

fn states_command(graph: &StateGraph) -> Result<()> {
    println!("📋 Request states");
    println!();
    for state in State::ALL {
        if graph.is_terminal(state) {
            println!("  {state} (terminal)");
            continue;
        }
        println!("  {state}");
        for rule in graph.rules().iter().filter(|rule| rule.from == state) {
            let roles: Vec<&str> = rule.allowed_roles.iter().map(|role| role.as_str()).collect();
            let reason = if rule.requires_reason { ", reason required" } else { "" };
            println!("    -> {} [{}{}]", rule.to, roles.join(", "), reason);
        }
    }
    Ok(())
}

fn next_command(graph: &StateGraph, from: &str, role: &str) -> Result<()> {
    let from: State = from.parse()?;
    let role: Role = role.parse()?;

    let rules = graph.valid_transitions(from, role);
    if rules.is_empty() {
        println!("No transitions available to {role} from {from}");
        return Ok(());
    }

    println!("Transitions available to {role} from {from}:");
    for rule in rules {
        let reason = if rule.requires_reason { " (reason required)" } else { "" };
        println!("  -> {}{}: {}", rule.to, reason, rule.description);
    }
    Ok(())
}

fn check_command(
    graph: Arc<StateGraph>,
    from: &str,
    to: &str,
    role: &str,
    reason: Option<&str>,
) -> Result<()> {
    let role: Role = role.parse()?;
    let validator = TransitionValidator::new(graph);
    let rule = validator.validate_raw(role, from, to, reason)?;
    println!("✅ {role} may move a request from {} to {}: {}", rule.from, rule.to, rule.description);
    Ok(())
}

async fn demo_command(graph: Arc<StateGraph>, config: &DepotConfig, json: bool) -> Result<()> {
    let id = RequestId::generate();
    let store = open_store(config, Request::new(id.clone(), RequestType::Import)).await?;
    let audit = Arc::new(InMemoryAuditSink::new());
    let channels = Arc::new(InMemoryChannelService::new());
    let metrics = Arc::new(TransitionMetrics::new());

    let executor = Arc::new(
        TransitionExecutor::new(graph, store.clone(), audit.clone(), channels.clone())
            .with_settings(ExecutorSettings::from(&config.orchestrator))
            .with_metrics(metrics.clone()),
    );
    let trigger = AutoTransitionTrigger::new(executor.clone())
        .with_reasons(TriggerReasons::from(&config.orchestrator));

    let sale = Actor::new("sale-admin-1", Role::SaleAdmin);
    let customer = Actor::new("customer-1", Role::CustomerUser);
    let security = Actor::new("gate-1", Role::Security);
    let maintenance = Actor::new("maintenance-1", Role::MaintenanceManager);
    let yard = Actor::new("yard-1", Role::YardManager);
    let driver = Actor::new("driver-1", Role::Driver);

    if !json {
        println!("🚚 Running import request {id}");
    }

    let appointment = Appointment {
        time: Utc::now() + Duration::days(1),
        details: Some(json!({ "slot": "morning" })),
    };
    executor
        .execute(
            &sale,
            &id,
            TransitionRequest::new(State::Pending, State::Scheduled)
                .with_appointment(appointment),
        )
        .await?;

    let scheduled = store_snapshot(&store, &id).await?;
    let outcome = trigger
        .on_document_uploaded(&customer, &scheduled, DocumentKind::Supplement, "supplement-1")
        .await;
    if let AutoTransitionOutcome::Failed(message) = &outcome {
        anyhow::bail!("supplement upload did not forward the request: {message}");
    }

    // Gate dispatch is automated
    executor
        .execute(
            &executor.system_actor(),
            &id,
            TransitionRequest::new(State::Forwarded, State::SentToGate),
        )
        .await?;

    // Drivers cannot admit containers at the gate
    if let Err(e) = executor
        .execute(&driver, &id, TransitionRequest::new(State::SentToGate, State::GateIn))
        .await
    {
        if !json {
            println!("⛔ Rejected attempt: {e}");
        }
    }

    let steps = [
        (&security, State::SentToGate, State::GateIn),
        (&security, State::GateIn, State::Checking),
        (&maintenance, State::Checking, State::Checked),
        (&sale, State::Checked, State::PendingAccept),
        (&customer, State::PendingAccept, State::Accept),
        (&yard, State::Accept, State::Positioned),
        (&driver, State::Positioned, State::Forklifting),
        (&driver, State::Forklifting, State::InYard),
    ];
    for (actor, from, to) in steps {
        executor
            .execute(actor, &id, TransitionRequest::new(from, to))
            .await?;
    }

    let request = store_snapshot(&store, &id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    println!();
    println!("📜 History");
    for entry in &request.history {
        let from = entry.from.map(|state| state.to_string()).unwrap_or_default();
        let reason = entry.reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default();
        println!("  {} {:>20} -> {:<20} by {}{}", entry.at.format("%H:%M:%S"), from, entry.action, entry.by, reason);
    }

    println!();
    println!("💬 Channel messages");
    for message in channels.messages(&id).await {
        println!("  {message}");
    }

    metrics.log_stats();
    let stats = metrics.snapshot();
    println!();
    println!(
        "📊 {} committed, {} rejected, {} auto-applied, {} audit events",
        stats.committed,
        stats.rejected,
        stats.auto_applied,
        audit.events().await.len()
    );
    println!("✅ Request {id} is {}", request.status);
    Ok(())
}

async fn store_snapshot(store: &Arc<dyn RequestStore>, id: &RequestId) -> Result<Request> {
    Ok(store.get(id).await?)
}

async fn memory_store(request: Request) -> Result<Arc<dyn RequestStore>> {
    let store = InMemoryRequestStore::new();
    store.insert(request).await;
    Ok(Arc::new(store))
}

#[cfg(feature = "database")]
async fn open_store(config: &DepotConfig, request: Request) -> Result<Arc<dyn RequestStore>> {
    match &config.database {
        Some(database) => {
            let store = SqliteRequestStore::connect(database).await?;
            store.insert(&request).await?;
            Ok(Arc::new(store))
        }
        None => memory_store(request).await,
    }
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &DepotConfig, request: Request) -> Result<Arc<dyn RequestStore>> {
    if config.database.is_some() {
        warn!("Database configured but the `database` feature is not enabled; using the in-memory store");
    }
    memory_store(request).await
}
