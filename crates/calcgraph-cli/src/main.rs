//! calcgraph command-line tool.
//!
//! Provides the `calcgraph` binary, which drives the formula engine over a
//! SQLite database. Every subcommand prints its result as pretty JSON on
//! stdout; logs go to stderr.
//!
//! Environment:
//! - `CALCGRAPH_DB_PATH`: database file (default `calcgraph.db`, `--db` wins)
//! - `CALCGRAPH_MAX_PROPAGATION`: propagation visit limit
//! - `CALCGRAPH_LOG`: log level (default `info`)

use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use serde_json::json;

use calcgraph_core::{Entity, Node, NodeId, OwnerRef};
use calcgraph_engine::{Engine, EngineConfig, EngineError, Superuser};
use calcgraph_storage::{RecordReader, SqliteStore};

/// Reactive formula graph over SQLite.
#[derive(Parser)]
#[command(name = "calcgraph", about = "Reactive formula graph over SQLite")]
struct Cli {
    /// Path to the database file.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create or update a node's formula.
    Set {
        id: String,
        formula: String,

        /// Owning slot as collection/row/field. Fixed once set.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show a node.
    Get { id: String },
    /// Delete a node, rewriting its dependents to #REF!.
    Delete { id: String },
    /// List every node.
    List,
    /// Create an entity, provisioning a node for each slot.
    EntityCreate {
        collection: String,
        id: String,

        /// Slot field name; repeatable.
        #[arg(long = "slot")]
        slots: Vec<String>,
    },
    /// Delete an entity and every node its slots link.
    EntityDelete { collection: String, id: String },
    /// Check the stored graph for cycles, dangling references and drift.
    Verify,
    /// Re-evaluate every node in dependency order.
    Recompute,
}

fn main() {
    let level = std::env::var("CALCGRAPH_LOG")
        .ok()
        .and_then(|raw| tracing::Level::from_str(&raw).ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| {
        std::env::var("CALCGRAPH_DB_PATH").unwrap_or_else(|_| "calcgraph.db".to_string())
    });

    let config = match load_config() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            process::exit(1);
        }
    };

    let store = match SqliteStore::new(&db_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db_path, e);
            process::exit(3);
        }
    };

    let mut engine = Engine::with_config(store, config);
    process::exit(run(&mut engine, cli.command));
}

/// Builds the engine configuration from the environment.
fn load_config() -> Result<EngineConfig, String> {
    let mut config = EngineConfig::default();
    if let Ok(raw) = std::env::var("CALCGRAPH_MAX_PROPAGATION") {
        config.max_propagation_visits = raw.parse().map_err(|_| {
            format!(
                "invalid CALCGRAPH_MAX_PROPAGATION '{}', expected a positive integer",
                raw
            )
        })?;
    }
    Ok(config)
}

/// Executes one subcommand.
///
/// Returns exit code: 0 = success, 1 = engine error, 3 = storage error.
fn run(engine: &mut Engine<SqliteStore>, command: Commands) -> i32 {
    match execute(engine, command) {
        Ok(output) => {
            let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize result: {}\"}}", e)
            });
            println!("{}", json);
            0
        }
        Err(EngineError::Storage(e)) => {
            eprintln!("Storage error: {}", e);
            3
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn execute(
    engine: &mut Engine<SqliteStore>,
    command: Commands,
) -> Result<serde_json::Value, EngineError> {
    let output = match command {
        Commands::Set { id, formula, owner } => {
            let id = NodeId::new(id)?;
            let owner = owner.as_deref().map(OwnerRef::from_str).transpose()?;
            let mut node = match engine.store().find_node(&id)? {
                Some(existing) => existing,
                None => Node::new(id, ""),
            };
            node.formula = formula;
            if owner.is_some() {
                node.owner = owner;
            }
            serde_json::to_value(engine.on_create_or_update(node)?)
        }
        Commands::Get { id } => {
            let node = engine.get_node(&NodeId::new(id)?)?;
            serde_json::to_value(engine.on_view_read(node, &Superuser)?)
        }
        Commands::Delete { id } => {
            let id = NodeId::new(id)?;
            engine.on_delete(&id)?;
            Ok(json!({ "deleted": id }))
        }
        Commands::List => {
            let nodes = engine.store().list_nodes()?;
            serde_json::to_value(engine.on_list_read(nodes, &Superuser)?)
        }
        Commands::EntityCreate {
            collection,
            id,
            slots,
        } => {
            let entity = slots
                .into_iter()
                .fold(Entity::new(collection, id), |entity, slot| entity.with_slot(slot));
            serde_json::to_value(engine.on_entity_create(entity)?)
        }
        Commands::EntityDelete { collection, id } => {
            engine.on_entity_delete(&collection, &id)?;
            Ok(json!({ "deleted": { "collection": collection, "id": id } }))
        }
        Commands::Verify => serde_json::to_value(engine.verify()?),
        Commands::Recompute => {
            let changed = engine.recompute_all()?;
            Ok(json!({ "changed": changed }))
        }
    };
    output.map_err(|e| EngineError::Storage(e.into()))
}
