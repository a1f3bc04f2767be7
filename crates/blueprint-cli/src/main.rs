//! Blueprint CLI
//!
//! Local driver for the event pipeline backed by a SQLite file.
//!
//! # Usage
//! ```bash
//! blueprint init --type projector --gate 34 --gate 20 --center sacral
//! blueprint log <BLUEPRINT_ID> --title "Deadline moved" --severity 6 --category work
//! blueprint state <BLUEPRINT_ID>
//! ```

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use blueprint_core::inversion::HttpEnricher;
use blueprint_core::prelude::*;

/// Blueprint - profile-aware event pipeline
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, value_name = "FILE", default_value = "blueprint.db")]
    db: PathBuf,

    /// Engine configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reference table replacing the built-in one (TOML)
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a Blueprint and record its baseline state
    Init {
        /// Profile type (generator, manifesting_generator, projector, manifestor, reflector)
        #[arg(short = 't', long = "type")]
        profile_type: String,

        /// Profile lines, e.g. 1/3
        #[arg(long, default_value = "1/3")]
        profile: String,

        /// Decision authority (defaults by type)
        #[arg(long)]
        authority: Option<String>,

        /// Activated gate, repeatable
        #[arg(short, long = "gate")]
        gates: Vec<u16>,

        /// Defined center, repeatable
        #[arg(long = "center")]
        centers: Vec<String>,

        /// Owning user
        #[arg(long, default_value = "local")]
        owner: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Log an event against a Blueprint
    Log {
        blueprint: BlueprintId,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// 1-10
        #[arg(short, long)]
        severity: i64,

        /// work, relationship, health, finance, family, personal or other
        #[arg(short = 'k', long)]
        category: String,

        #[arg(long, default_value = "local")]
        user: String,

        /// Preferred experiment type, repeatable
        #[arg(long = "prefer")]
        prefer: Vec<String>,

        /// warm, direct, analytical or gentle
        #[arg(long)]
        style: Option<String>,
    },

    /// Show the current state and any open SEDA protocol
    State { blueprint: BlueprintId },

    /// List state snapshots, newest first
    History {
        blueprint: BlueprintId,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Apply time-only recovery up to now
    Recover { blueprint: BlueprintId },

    /// Request de-escalation of the open SEDA protocol
    Resolve { blueprint: BlueprintId },

    /// List stored Blueprints
    List,

    /// Show the reference table
    Reference,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let pipeline = build_pipeline(&cli)?;

    match cli.command {
        Commands::Init {
            profile_type,
            profile,
            authority,
            gates,
            centers,
            owner,
            name,
        } => {
            let profile_type: ProfileType = profile_type.parse()?;
            let (conscious, unconscious) = parse_profile(&profile)?;

            let mut builder = Blueprint::builder(UserId::new(owner), profile_type)
                .profile(conscious, unconscious)
                .gates(gates);
            if let Some(authority) = authority {
                builder = builder.authority(parse_snake::<Authority>(&authority, "authority")?);
            }
            for center in &centers {
                builder = builder.defined_center(parse_snake::<Center>(center, "center")?);
            }
            if let Some(name) = name {
                builder = builder.display_name(name);
            }
            let blueprint = builder.build()?;
            let baseline = pipeline.register_blueprint(&blueprint).await?;

            if cli.json {
                print_json(&serde_json::json!({ "blueprint": blueprint, "baseline": baseline }))?;
            } else {
                println!("BLUEPRINT: {}", blueprint.id);
                println!("TYPE:      {} ({:?})", blueprint.profile_type, blueprint.definition);
                print_state(&baseline.state);
            }
        }
        Commands::Log {
            blueprint,
            title,
            description,
            severity,
            category,
            user,
            prefer,
            style,
        } => {
            let preferences = GuidancePreferences {
                experiment_types: prefer
                    .iter()
                    .map(|p| parse_snake::<ExperimentType>(p, "experiment type"))
                    .collect::<anyhow::Result<_>>()?,
                communication_style: match style {
                    Some(style) => parse_snake::<CommunicationStyle>(&style, "style")?,
                    None => CommunicationStyle::default(),
                },
            };
            let outcome = pipeline
                .process_event(
                    &UserId::new(user),
                    blueprint,
                    EventInput::new(title, description, severity, category),
                    &preferences,
                )
                .await?;

            if cli.json {
                print_json(&outcome)?;
            } else {
                let analysis = &outcome.force_analysis;
                println!(
                    "FORCE: {:.2} {} over {} day(s)",
                    analysis.final_magnitude, analysis.direction, analysis.duration
                );
                print_state(&outcome.new_state);
                if let Some(protocol) = &outcome.seda_protocol {
                    println!("SEDA:  level {} ({})", protocol.level, protocol.status);
                }
                println!();
                println!("{}", outcome.script.script);
                for note in &outcome.script.personalizations {
                    println!("  * {}", note);
                }
                for (i, experiment) in outcome.script.experiments.iter().enumerate() {
                    println!("  {}. {}", i + 1, experiment);
                }
            }
        }
        Commands::State { blueprint } => {
            let latest = pipeline
                .latest_state(blueprint)?
                .ok_or_else(|| anyhow!("blueprint {} has no state history", blueprint))?;
            let protocol = pipeline.open_protocol(blueprint)?;

            if cli.json {
                print_json(&serde_json::json!({ "snapshot": latest, "seda_protocol": protocol }))?;
            } else {
                println!("AS OF: {}", latest.recorded_at.to_rfc3339());
                print_state(&latest.state);
                match protocol {
                    Some(protocol) => println!("{}", protocol.display_text()),
                    None => println!("SEDA:  none open"),
                }
            }
        }
        Commands::History { blueprint, limit } => {
            let history = pipeline.state_history(blueprint, limit)?;
            if cli.json {
                print_json(&history)?;
            } else {
                for snapshot in &history {
                    let [x, y, z] = snapshot.state.axes();
                    println!(
                        "{}  {:<9} ({:.2}, {:.2}, {:.2})",
                        snapshot.recorded_at.to_rfc3339(),
                        source_label(&snapshot.source),
                        x,
                        y,
                        z
                    );
                }
            }
        }
        Commands::Recover { blueprint } => {
            let snapshot = pipeline.apply_recovery(blueprint, chrono::Utc::now()).await?;
            if cli.json {
                print_json(&snapshot)?;
            } else {
                print_state(&snapshot.state);
            }
        }
        Commands::Resolve { blueprint } => {
            let outcome = pipeline
                .request_de_escalation(blueprint, chrono::Utc::now())
                .await?;
            if cli.json {
                print_json(&outcome)?;
            } else if outcome.decision.eligible {
                println!("SEDA protocol {} resolved", outcome.protocol.id);
            } else {
                println!(
                    "Still {} at level {}: {}",
                    outcome.protocol.status,
                    outcome.protocol.level,
                    outcome.decision.reason.unwrap_or_default()
                );
            }
        }
        Commands::List => {
            let blueprints = pipeline.store().list_blueprints()?;
            if cli.json {
                print_json(&blueprints)?;
            } else {
                for blueprint in &blueprints {
                    println!(
                        "{}  {:<22} {}",
                        blueprint.id,
                        blueprint.profile_type.to_string(),
                        blueprint.metadata.display_name.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Reference => {
            let reference = pipeline.reference();
            if cli.json {
                let types: Vec<_> = ProfileType::ALL
                    .into_iter()
                    .filter_map(|t| reference.type_entry(t).map(|entry| (t, entry)))
                    .collect();
                let gates: Vec<_> = reference.gates().collect();
                print_json(&serde_json::json!({ "types": types, "gates": gates }))?;
            } else {
                for profile_type in ProfileType::ALL {
                    if let Some(entry) = reference.type_entry(profile_type) {
                        println!(
                            "{:<22} x{:.1}  {}",
                            profile_type.to_string(),
                            entry.exhaustion_multiplier,
                            entry.strategy
                        );
                    }
                }
                println!();
                for gate in reference.gates() {
                    let bands: Vec<&str> = gate.protocols.keys().map(|b| b.key()).collect();
                    println!("{:>2} {:<24} [{}]", gate.number, gate.name, bands.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn build_pipeline(cli: &Cli) -> anyhow::Result<PipelineOrchestrator> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let reference = match &cli.reference {
        Some(path) => ReferenceTable::from_file(path)?,
        None => ReferenceTable::builtin()?,
    };
    debug!(db = %cli.db.display(), gates = reference.gate_count(), "opening store");
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    let enrichment = config.enrichment.clone();
    let mut pipeline = PipelineOrchestrator::new(Arc::new(store), Arc::new(reference), config);
    if enrichment.enabled {
        pipeline = pipeline.with_enricher(Arc::new(HttpEnricher::from_config(&enrichment)));
    }
    Ok(pipeline)
}

fn parse_profile(raw: &str) -> anyhow::Result<(u8, u8)> {
    let Some((conscious, unconscious)) = raw.split_once('/') else {
        bail!("profile must look like 1/3, got {:?}", raw);
    };
    Ok((
        conscious.trim().parse().context("conscious line")?,
        unconscious.trim().parse().context("unconscious line")?,
    ))
}

/// Parse a snake_case enum name through its serde representation
fn parse_snake<T: DeserializeOwned>(raw: &str, what: &str) -> anyhow::Result<T> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .with_context(|| format!("unknown {}: {}", what, raw))
}

fn source_label(source: &blueprint_core::physics::SnapshotSource) -> &'static str {
    use blueprint_core::physics::SnapshotSource;
    match source {
        SnapshotSource::Baseline => "baseline",
        SnapshotSource::Event { .. } => "event",
        SnapshotSource::Recovery => "recovery",
    }
}

fn print_state(state: &VectorState) {
    let [x, y, z] = state.axes();
    println!("STATE: resilience {:.2} / autonomy {:.2} / connectivity {:.2}", x, y, z);
    if state.is_critical() {
        println!("       critical: {} is strained", state.primary_stress_axis());
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
