use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cproject_graph::config::Config;
use cproject_graph::db::RelationStore;
use cproject_graph::db::queries::DEFAULT_CHAIN_DEPTH;
use cproject_graph::indexer::RelationAnalyzer;
use cproject_graph::preprocess::Preprocessor;

#[derive(Parser)]
#[command(name = "cproject-graph")]
#[command(about = "Reorganise C/C++ source trees and query their call graph")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration file
    #[arg(long, default_value = "cproject-graph.json")]
    config: String,

    /// Relation store path (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair, classify and copy a source tree into the cache layout
    Preprocess {
        source: PathBuf,
        cache: PathBuf,
    },
    /// Extract definitions, calls and includes and save them for a project
    Analyze {
        root: PathBuf,
        #[arg(long)]
        project: String,
        /// Delete the project's existing rows first
        #[arg(long)]
        clear: bool,
    },
    /// Query a saved project
    Query {
        #[arg(long)]
        project: String,
        #[command(subcommand)]
        query: QueryCommands,
    },
    /// List projects in the relation store
    Projects,
}

#[derive(Subcommand)]
enum QueryCommands {
    /// Definition, call, dependency and file counts
    Stats,
    /// Caller/callee graph, optionally around one function
    Graph {
        #[arg(long)]
        function: Option<String>,
    },
    /// Tree of callees below a function
    Chain {
        function: String,
        #[arg(long, default_value_t = DEFAULT_CHAIN_DEPTH)]
        depth: usize,
    },
    /// Functions with the most call sites
    MostCalled {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Functions with the most distinct callees
    MostComplex {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// File out-degree / in-degree rankings
    Deps,
    /// Dependency edges, optionally for one file
    FileDeps {
        #[arg(long)]
        file: Option<String>,
    },
    /// Functions defined in a file and calls in and out of it
    File { path: String },
    /// Substring search over definitions and calls
    Search { keyword: String },
    /// Definitions, callers and callees of a function
    Usage { function: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialise result")?
    );
    Ok(())
}

fn open_store(config: &Config, db: Option<PathBuf>) -> Result<RelationStore> {
    let path = db.unwrap_or_else(|| PathBuf::from(&config.store.db_path));
    RelationStore::open(&path, config.store.reconnect.policy())
        .with_context(|| format!("failed to open relation store: {}", path.display()))
}

fn run_query(store: &mut RelationStore, project: &str, query: QueryCommands) -> Result<()> {
    match query {
        QueryCommands::Stats => print_json(&store.get_project_statistics(project)),
        QueryCommands::Graph { function } => {
            print_json(&store.get_function_call_graph(project, function.as_deref()))
        }
        QueryCommands::Chain { function, depth } => {
            print_json(&store.get_function_call_chain(project, &function, depth))
        }
        QueryCommands::MostCalled { limit } => {
            print_json(&store.get_most_called_functions(project, limit))
        }
        QueryCommands::MostComplex { limit } => {
            print_json(&store.get_most_complex_functions(project, limit))
        }
        QueryCommands::Deps => print_json(&store.get_file_dependency_analysis(project)),
        QueryCommands::FileDeps { file } => {
            print_json(&store.get_file_dependencies(project, file.as_deref()))
        }
        QueryCommands::File { path } => {
            print_json(&store.get_file_call_relationships(project, &path))
        }
        QueryCommands::Search { keyword } => {
            print_json(&store.search_function_usage(project, &keyword))
        }
        QueryCommands::Usage { function } => {
            print_json(&store.get_function_usage_summary(project, &function))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Preprocess { source, cache } => {
            let preprocessor = Preprocessor::new(config.preprocess)?;
            let outcome = preprocessor.preprocess(&source, &cache).await;
            print_json(&outcome.stats)?;
            if !outcome.success {
                anyhow::bail!("preprocessing failed: {}", outcome.stats.errors.join("; "));
            }
        }
        Commands::Analyze {
            root,
            project,
            clear,
        } => {
            let mut store = open_store(&config, cli.db)?;
            if clear {
                store.clear_project(&project)?;
            }
            let analyzer = RelationAnalyzer::new(root, config.analysis)?;
            let summary = analyzer.analyze_and_save(&mut store, &project)?;
            info!("Project {project} saved");
            print_json(&summary)?;
        }
        Commands::Query { project, query } => {
            let mut store = open_store(&config, cli.db)?;
            run_query(&mut store, &project, query)?;
        }
        Commands::Projects => {
            let mut store = open_store(&config, cli.db)?;
            print_json(&store.list_projects())?;
        }
    }

    Ok(())
}
