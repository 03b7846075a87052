//! Supportgraph CLI - knowledge graph for IT-support diagnosis

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use supportgraph_core::api::{
    ConfidenceOverride, DiagnoseRequest, EnrichRequest, EnrichResponse, FeedbackRequest,
    FeedbackResponse, HealthStatus, KnowledgeApi, QuickSuggestionQuery, SuggestEntitiesRequest,
};
use supportgraph_core::config::{Config, StorageBackend};
use supportgraph_core::domain::knowledge::{
    AnalysisWindow, DiagnosisResult, EntityType, FeedbackRecord, FeedbackTarget, GraphAnalytics,
    LayoutRunner, LayoutState, PruneCriteria, ResolutionTrace, Sentiment, TicketInput, Urgency,
    render_svg,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "supportgraph")]
#[command(author, version, about = "Self-learning knowledge graph for IT support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// SQLite database file, overriding storage.database_path
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },

    /// Extract knowledge from a ticket description
    Enrich {
        /// Ticket text
        description: String,
        /// Ticket identifier
        #[arg(short, long)]
        ticket_id: String,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long, value_parser = parse_urgency)]
        urgency: Option<Urgency>,
    },

    /// Suggest existing entities for a partial query
    Suggest {
        query: String,
        /// Entity type or free text narrowing the matches
        #[arg(short, long)]
        context: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Diagnose symptoms against the graph
    Diagnose {
        #[arg(required = true)]
        symptoms: Vec<String>,
        #[arg(short, long)]
        equipment: Option<String>,
        #[arg(short, long, value_parser = parse_urgency)]
        urgency: Option<Urgency>,
        /// Only rank causes (quick suggestions)
        #[arg(long)]
        quick: bool,
    },

    /// Feedback and learning
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },

    /// Graph analytics report
    Analytics {
        /// Growth window in days
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Compute a force-directed layout
    Layout {
        /// Comma-separated entity types to include
        #[arg(short, long)]
        types: Option<String>,
        #[arg(long)]
        ticks: Option<usize>,
        /// Write the result as SVG to this file
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Run on the paced tick loop and report progress
        #[arg(long)]
        live: bool,
    },

    /// Remove low-value entities and their relations
    Prune {
        /// Remove entities below this confidence
        #[arg(long)]
        min_confidence: Option<f32>,
        /// Remove entities not updated for this many days
        #[arg(long)]
        stale_days: Option<i64>,
        /// Remove entities without relations (brands are kept)
        #[arg(long)]
        orphans: bool,
        /// Report without removing
        #[arg(long)]
        dry_run: bool,
    },

    /// Change an entity's type
    Recategorize {
        entity_id: String,
        #[arg(value_parser = parse_entity_type)]
        new_type: EntityType,
        #[arg(short, long)]
        reason: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Rate an entity, relation, diagnosis or solution
    Submit {
        target_id: String,
        #[arg(long, default_value = "entity", value_parser = parse_target)]
        target: FeedbackTarget,
        /// 1 (useless) to 5 (exactly right)
        #[arg(short, long)]
        rating: u8,
        #[arg(short, long, default_value = "neutral", value_parser = parse_sentiment)]
        sentiment: Sentiment,
        #[arg(long)]
        comment: Option<String>,
        /// Idempotency key; resubmissions with the same key are ignored
        #[arg(long)]
        key: Option<String>,
    },
    /// Set a confidence value by hand
    Override {
        #[arg(long, conflicts_with = "relation", required_unless_present = "relation")]
        entity: Option<String>,
        #[arg(long)]
        relation: Option<String>,
        #[arg(short, long)]
        confidence: f32,
        #[arg(short, long)]
        reason: String,
    },
    /// Learn from a resolution trace (JSON file)
    Resolution { file: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Print the config file path
    Path,
}

fn parse_urgency(s: &str) -> Result<Urgency, String> {
    Urgency::parse(s).ok_or_else(|| format!("unknown urgency '{}'", s))
}

fn parse_entity_type(s: &str) -> Result<EntityType, String> {
    EntityType::parse(s).ok_or_else(|| format!("unknown entity type '{}'", s))
}

fn parse_target(s: &str) -> Result<FeedbackTarget, String> {
    FeedbackTarget::parse(s).ok_or_else(|| format!("unknown feedback target '{}'", s))
}

fn parse_sentiment(s: &str) -> Result<Sentiment, String> {
    Sentiment::parse(s).ok_or_else(|| format!("unknown sentiment '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("supportgraph=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, out),
        other => other,
    };

    let mut config = Config::load()?;
    if let Some(path) = cli.database {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_path = Some(path);
    }
    let api = KnowledgeApi::from_config(&config).await?;

    match command {
        Commands::Serve { addr } => server::serve(Arc::new(api), addr).await,
        Commands::Enrich {
            description,
            ticket_id,
            category,
            urgency,
        } => {
            let ticket = TicketInput {
                ticket_id,
                description,
                category,
                urgency,
            };
            cmd_enrich(&api, ticket, out).await
        }
        Commands::Suggest {
            query,
            context,
            limit,
        } => cmd_suggest(&api, query, context, limit, out).await,
        Commands::Diagnose {
            symptoms,
            equipment,
            urgency,
            quick,
        } => cmd_diagnose(&api, symptoms, equipment, urgency, quick, out).await,
        Commands::Feedback { action } => cmd_feedback(&api, action, out).await,
        Commands::Analytics { days } => cmd_analytics(&api, days, out).await,
        Commands::Layout {
            types,
            ticks,
            svg,
            live,
        } => cmd_layout(&api, types, ticks, svg, live, out).await,
        Commands::Prune {
            min_confidence,
            stale_days,
            orphans,
            dry_run,
        } => {
            let criteria = PruneCriteria {
                min_confidence,
                stale_before: stale_days.map(|d| chrono::Utc::now() - chrono::Duration::days(d)),
                remove_orphans: orphans,
                dry_run,
            };
            cmd_prune(&api, criteria, out).await
        }
        Commands::Recategorize {
            entity_id,
            new_type,
            reason,
        } => {
            let entity = api
                .maintenance()
                .recategorize(&entity_id, new_type, &reason)
                .await?;
            out.emit(&entity, || {
                println!("{} '{}' is now {}", entity.id, entity.name, entity.entity_type)
            })
        }
        Commands::Doctor => cmd_doctor(&api, out).await,
        Commands::Config { .. } => Ok(()),
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    /// Print as JSON, or run the text renderer unless quiet
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text if !self.quiet => text(),
            OutputFormat::Text => {}
        }
        Ok(())
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_enrich(api: &KnowledgeApi, ticket: TicketInput, out: Output) -> anyhow::Result<()> {
    let response = api.enrich(EnrichRequest::EnrichTicket(ticket)).await?;
    out.emit(&response, || {
        if let EnrichResponse::Enriched(result) = &response {
            println!(
                "Ticket {}: {} entities added, {} relations added, {} merged",
                result.ticket_id,
                result.added_entities,
                result.added_relations,
                result.merged_entity_ids.len()
            );
            for entity in &result.entities {
                println!(
                    "  [{}] {} ({:.2})",
                    entity.entity_type, entity.name, entity.confidence
                );
            }
        }
    })
}

async fn cmd_suggest(
    api: &KnowledgeApi,
    query: String,
    context: Option<String>,
    limit: usize,
    out: Output,
) -> anyhow::Result<()> {
    let response = api
        .enrich(EnrichRequest::SuggestEntities(SuggestEntitiesRequest {
            query,
            context,
            limit: Some(limit),
        }))
        .await?;
    out.emit(&response, || {
        if let EnrichResponse::Suggestions { suggestions } = &response {
            if suggestions.is_empty() {
                println!("No matching entities.");
            }
            for s in suggestions {
                println!(
                    "{:.2}  [{}] {} ({})",
                    s.score, s.entity.entity_type, s.entity.name, s.entity.id
                );
            }
        }
    })
}

async fn cmd_diagnose(
    api: &KnowledgeApi,
    symptoms: Vec<String>,
    equipment: Option<String>,
    urgency: Option<Urgency>,
    quick: bool,
    out: Output,
) -> anyhow::Result<()> {
    if quick {
        let found = api
            .quick_suggestions(&QuickSuggestionQuery {
                q: symptoms.join(" "),
                equipment,
            })
            .await;
        return out.emit(&found, || {
            for cause in &found.suggestions {
                println!("{:.2}  [{}] {}", cause.probability, cause.entity_type, cause.name);
            }
        });
    }

    let mut request = DiagnoseRequest::new(symptoms);
    if let Some(equipment) = equipment {
        request = request.with_equipment(equipment);
    }
    if let Some(urgency) = urgency {
        request = request.with_urgency(urgency);
    }
    let result = api.diagnose(&request).await?;
    out.emit(&result, || print_diagnosis(&result))
}

fn print_diagnosis(result: &DiagnosisResult) {
    match &result.primary_issue {
        Some(primary) => println!(
            "Primary issue: {} [{}] ({:.0}%)",
            primary.name,
            primary.entity_type,
            primary.probability * 100.0
        ),
        None => println!("No matching issue in the knowledge graph."),
    }
    if result.possible_causes.len() > 1 {
        println!("\nOther causes:");
        for cause in result.possible_causes.iter().skip(1) {
            println!("  {:.0}%  {}", cause.probability * 100.0, cause.name);
        }
    }
    if !result.recommended_solutions.is_empty() {
        println!("\nRecommended solutions:");
        for solution in &result.recommended_solutions {
            println!(
                "  {:.0}%  {}",
                solution.estimated_success * 100.0,
                solution.name
            );
            for (i, step) in solution.steps.iter().enumerate() {
                println!("        {}. {}", i + 1, step);
            }
        }
    }
    let risk = &result.risk_assessment;
    println!(
        "\nRisk: {} (urgency {}, impact {})",
        risk.risk_level, risk.urgency, risk.impact
    );
    println!("Estimated resolution: {} min", result.estimated_resolution_time);
    if !result.next_steps.is_empty() {
        println!("\nNext steps:");
        for step in &result.next_steps {
            println!("  - {}", step);
        }
    }
}

async fn cmd_feedback(api: &KnowledgeApi, action: FeedbackAction, out: Output) -> anyhow::Result<()> {
    let request = match action {
        FeedbackAction::Submit {
            target_id,
            target,
            rating,
            sentiment,
            comment,
            key,
        } => {
            let mut record = FeedbackRecord::new(target, target_id, rating);
            record.sentiment = sentiment;
            record.comments = comment.unwrap_or_default();
            record.idempotency_key = key;
            FeedbackRequest::SubmitFeedback(record)
        }
        FeedbackAction::Override {
            entity,
            relation,
            confidence,
            reason,
        } => FeedbackRequest::UpdateConfidence(ConfidenceOverride {
            entity_id: entity,
            relation_id: relation,
            new_confidence: confidence,
            reason,
        }),
        FeedbackAction::Resolution { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let trace: ResolutionTrace = serde_json::from_str(&raw)?;
            FeedbackRequest::LearnFromResolution(trace)
        }
    };

    let response = api.feedback(request).await?;
    out.emit(&response, || match &response {
        FeedbackResponse::Submitted(outcome) => {
            print_update(&outcome.update_result);
            for insight in &outcome.insights {
                println!("  insight [{}]: {}", insight.impact, insight.title);
            }
        }
        FeedbackResponse::Updated(result) => print_update(result),
        FeedbackResponse::Learned(outcome) => {
            println!(
                "{} learnings, {} applied",
                outcome.learnings.len(),
                outcome.applied_learnings
            );
            for learning in &outcome.learnings {
                let mark = if learning.applied { "+" } else { "-" };
                println!("  {} {}", mark, learning.description);
            }
        }
    })
}

fn print_update(result: &supportgraph_core::domain::knowledge::UpdateResult) {
    match (result.old_confidence, result.new_confidence) {
        (Some(old), Some(new)) if result.success => {
            let clamped = if result.clamped { " (clamped)" } else { "" };
            println!("{}: {:.2} -> {:.2}{}", result.target_id, old, new, clamped);
        }
        _ => println!("{}: {:?}", result.target_id, result.status),
    }
}

async fn cmd_analytics(api: &KnowledgeApi, days: Option<i64>, out: Output) -> anyhow::Result<()> {
    let window = days.filter(|d| *d > 0).map(AnalysisWindow::last_days);
    let report = api.analytics(window).await;
    out.emit(&report, || print_analytics(&report))
}

fn print_analytics(report: &GraphAnalytics) {
    println!(
        "{} entities, {} relations",
        report.total_entities, report.total_relations
    );
    for (entity_type, count) in &report.entity_distribution {
        println!("  {:<12} {}", entity_type, count);
    }
    let metrics = &report.confidence_metrics;
    println!(
        "\nConfidence: {} high, {} medium, {} low (avg {:.2})",
        metrics.high, metrics.medium, metrics.low, metrics.average
    );
    if !report.top_influential.is_empty() {
        println!("\nMost influential:");
        for entry in &report.top_influential {
            println!("  {:.2}  {} (degree {})", entry.influence, entry.name, entry.degree);
        }
    }
    if !report.anomalies.is_empty() {
        println!("\nAnomalies:");
        for anomaly in &report.anomalies {
            println!(
                "  [{}] {}: {}",
                anomaly.severity,
                anomaly.name,
                anomaly.reasons.join(", ")
            );
        }
    }
    if let Some(growth) = &report.growth {
        println!(
            "\nGrowth: +{} entities, +{} relations",
            growth.new_entities, growth.new_relations
        );
    }
    for insight in &report.insights {
        println!("\n[{}] {}: {}", insight.impact, insight.title, insight.description);
    }
}

async fn cmd_layout(
    api: &KnowledgeApi,
    types: Option<String>,
    ticks: Option<usize>,
    svg: Option<PathBuf>,
    live: bool,
    out: Output,
) -> anyhow::Result<()> {
    let types = server::parse_types(types.as_deref())?;

    let state: LayoutState = if live {
        let mut config = api.layout_config().clone();
        if let Some(ticks) = ticks {
            config.ticks = ticks;
        }
        let snapshot = api.store().snapshot().await;
        let initial = LayoutState::from_graph(&snapshot, &types, &config);
        let runner = LayoutRunner::spawn(initial, config);
        let mut frames = runner.subscribe();
        let progress = tokio::spawn(async move {
            while frames.changed().await.is_ok() {
                let tick = frames.borrow().tick;
                if tick > 0 && tick % 100 == 0 {
                    info!(tick, "Layout progress");
                }
            }
        });
        let state = runner.finish().await?;
        progress.abort();
        state
    } else {
        api.layout(&types, ticks).await
    };

    if let Some(path) = &svg {
        std::fs::write(path, render_svg(&state))?;
    }
    out.emit(&state, || {
        println!(
            "{} nodes, {} edges after {} ticks",
            state.nodes.len(),
            state.edges.len(),
            state.tick
        );
        if let Some(path) = &svg {
            println!("SVG written to {}", path.display());
        }
    })
}

async fn cmd_prune(api: &KnowledgeApi, criteria: PruneCriteria, out: Output) -> anyhow::Result<()> {
    let report = api.maintenance().prune(&criteria).await?;
    out.emit(&report, || {
        let verb = if report.dry_run { "Would remove" } else { "Removed" };
        println!(
            "{} {} entities and {} relations",
            verb,
            report.removed_entities.len(),
            report.removed_relations.len()
        );
        for entity in &report.removed_entities {
            println!(
                "  [{}] {} ({})",
                entity.entity_type,
                entity.name,
                entity.reasons.join(", ")
            );
        }
    })
}

async fn cmd_doctor(api: &KnowledgeApi, out: Output) -> anyhow::Result<()> {
    let report = api.health().await;
    out.emit(&report, || {
        println!("Supportgraph Health Check");
        println!("=========================");
        for check in &report.checks {
            let tag = match check.status {
                HealthStatus::Ok => "OK",
                HealthStatus::Warning => "WARN",
                HealthStatus::Error => "FAIL",
            };
            println!(
                "[{}] {}: {}",
                tag,
                check.name,
                check.message.as_deref().unwrap_or("")
            );
        }
    })?;
    if report.overall_status == HealthStatus::Error {
        anyhow::bail!("health check failed");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.format == OutputFormat::Json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !out.quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
