mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use esagg::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "esagg")]
#[command(about = "esagg - validate Elasticsearch aggregations and infer their result shapes")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.esagg/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that every aggregation selects exactly one known kind
    Validate {
        /// JSON file holding the `aggs` object of a search request
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Print the result shape of every aggregation in a request
    Infer {
        /// JSON file holding the `aggs` object of a search request
        #[arg(short, long)]
        request: PathBuf,

        /// YAML/JSON schema definition
        #[arg(short, long, conflicts_with = "mapping")]
        schema: Option<PathBuf>,

        /// Elasticsearch `_mapping` response body
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Print the JSON shape descriptor instead of the compact form
        #[arg(long)]
        json: bool,
    },

    /// List the field paths of a schema
    Paths {
        #[arg(short, long, conflicts_with = "mapping")]
        schema: Option<PathBuf>,

        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Only paths of this type: any, numeric, primitive, temporal, text, ip, geo
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Print the document shape a `_source` filter projects
    Project {
        #[arg(short, long, conflicts_with = "mapping")]
        schema: Option<PathBuf>,

        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// The `_source` filter as JSON, e.g. '["user.name"]'
        #[arg(long)]
        source: String,
    },

    /// List the known aggregation kinds
    Kinds {
        /// Only kinds of this category, e.g. bucket or pipeline
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Logs go to stderr so shapes on stdout stay pipeable
    let log_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(log_filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Validate { request } => {
            commands::run_validate(&request, &config.inference)?;
        }
        Commands::Infer {
            request,
            schema,
            mapping,
            json,
        } => {
            let schema = commands::load_schema(schema.as_deref(), mapping.as_deref())?;
            commands::run_infer(&request, &schema, &config.inference, json)?;
        }
        Commands::Paths {
            schema,
            mapping,
            filter,
        } => {
            let schema = commands::load_schema(schema.as_deref(), mapping.as_deref())?;
            commands::run_paths(&schema, filter.as_deref())?;
        }
        Commands::Project {
            schema,
            mapping,
            source,
        } => {
            let schema = commands::load_schema(schema.as_deref(), mapping.as_deref())?;
            commands::run_project(&schema, &source)?;
        }
        Commands::Kinds { category } => {
            commands::run_kinds(category.as_deref())?;
        }
    }

    Ok(())
}
