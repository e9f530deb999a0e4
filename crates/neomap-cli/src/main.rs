//! CLI entry point for inspecting a Neo4j store through the neomap mapper.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

use neomap_core::NeomapConfig;
use neomap_graph::{
    CypherQuery, Direction, Entity, EntityDefinition, GraphClient, GremlinScript, SchemaRegistry,
};

#[derive(Parser)]
#[command(name = "neomap")]
#[command(about = "Query and inspect entities stored through the neomap object mapper")]
struct Cli {
    /// Config file prefix (default: neomap).
    #[arg(short, long, default_value = "neomap")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the REST root answers.
    Ping,

    /// Load one container by id.
    Get {
        /// Discriminator to materialize as.
        discriminator: String,
        id: String,
        /// Look the id up as a relationship instead of a node.
        #[arg(long)]
        relationship: bool,
    },

    /// Exact match on the auto index.
    Lookup {
        discriminator: String,
        key: String,
        value: String,
    },

    /// Lucene query on the auto index, restricted to one discriminator.
    Query {
        discriminator: String,
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the relationships of a node.
    Relationships {
        id: String,
        #[arg(short, long, value_enum, default_value = "all")]
        direction: DirectionArg,
        /// Relationship types to keep (all when omitted).
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
    },

    /// Run a Gremlin script and print the raw result.
    Gremlin { script: String },

    /// Run a Cypher query and print the materialized rows.
    Cypher { query: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    All,
    In,
    Out,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::All => Direction::All,
            DirectionArg::In => Direction::In,
            DirectionArg::Out => Direction::Out,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = NeomapConfig::load(&cli.config)?;
    let registry = registry_for(&config, &cli.command);
    let client = GraphClient::connect(&config, registry);
    let field = config.mapping.discriminator_field.as_str();

    match cli.command {
        Command::Ping => print(&client.ping()?)?,
        Command::Get {
            discriminator, id, ..
        } => match client.find_by_id(&discriminator, &id)? {
            Some(entity) => print(&entity.to_repr(field))?,
            None => anyhow::bail!("{discriminator} {id} not found"),
        },
        Command::Lookup {
            discriminator,
            key,
            value,
        } => print_all(&client.find_by_index(&discriminator, &key, &value)?, field)?,
        Command::Query {
            discriminator,
            query,
            limit,
        } => print_all(&client.query_index(&discriminator, &query, limit)?, field)?,
        Command::Relationships {
            id,
            direction,
            types,
        } => {
            let node = client
                .find_by_id(neomap_graph::GENERIC_NODE, &id)?
                .and_then(Entity::into_node)
                .ok_or_else(|| anyhow::anyhow!("node {id} not found"))?;
            let types: Vec<&str> = types.iter().map(String::as_str).collect();
            let found = client.relationships_of(&node, direction.into(), &types)?;
            let reprs: Vec<Value> = found.iter().map(|r| r.to_repr(field)).collect();
            print(&Value::Array(reprs))?;
        }
        Command::Gremlin { script } => print(&client.execute_script(&GremlinScript::new(script))?)?,
        Command::Cypher { query } => {
            let rows = client.query_entities(&CypherQuery::new(query), neomap_graph::GENERIC_NODE)?;
            print_all(&rows, field)?;
        }
    }

    Ok(())
}

/// Registers the discriminator named on the command line so the store's
/// containers can be materialized without compiled-in models.
fn registry_for(config: &NeomapConfig, command: &Command) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new(config.mapping.clone());
    let definition = match command {
        Command::Get {
            discriminator,
            relationship: true,
            ..
        } => Some(EntityDefinition::relationship(discriminator.as_str())),
        Command::Get { discriminator, .. }
        | Command::Lookup { discriminator, .. }
        | Command::Query { discriminator, .. } => Some(EntityDefinition::node(discriminator.as_str())),
        _ => None,
    };
    if let Some(definition) = definition {
        if !registry.contains(&definition.discriminator) {
            registry.register(definition);
        }
    }
    registry
}

fn print_all(entities: &[Entity], field: &str) -> anyhow::Result<()> {
    let reprs: Vec<Value> = entities.iter().map(|e| e.to_repr(field)).collect();
    print(&Value::Array(reprs))
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
