//! srcgraph CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "srcgraph")]
#[command(about = "Source unit discovery, dependency resolution and symbol graphing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Where analysis tools run
    #[arg(long, value_enum, default_value_t = SandboxKind::Local, global = true)]
    sandbox: SandboxKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SandboxKind {
    /// Host processes with tools already installed
    Local,
    /// One Docker container per tool invocation
    Docker,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover source units
    Scan {
        /// Print units as JSON and save them to the build data directory
        #[arg(long)]
        json: bool,
    },
    /// List the dependencies of source units
    Deps {
        /// Unit IDs (name@Type) or names; all units when omitted
        units: Vec<String>,

        /// Resolve dependencies into cross-repository edges
        #[arg(long)]
        resolve: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract symbols, references and docs from source units
    Graph {
        /// Unit IDs (name@Type) or names; all graphable units when omitted
        units: Vec<String>,

        /// Print the graph output as JSON
        #[arg(long)]
        json: bool,

        /// Do not print per-unit counts
        #[arg(long)]
        no_summary: bool,
    },
    /// Write and print the Makefile driving a full analysis
    Makefile {
        /// Directory for generated outputs, relative to the root
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Clear the build data directory
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "srcgraph={log_level},srcgraph_core={log_level},srcgraph_toolchain={log_level},srcgraph_build={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("srcgraph v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Scan { json } => commands::scan(cli.root, cli.sandbox, json).await,
        Commands::Deps { units, resolve, json } => {
            commands::deps(cli.root, cli.sandbox, units, resolve, json).await
        }
        Commands::Graph { units, json, no_summary } => {
            commands::graph(cli.root, cli.sandbox, units, json, !no_summary).await
        }
        Commands::Makefile { output_dir } => commands::makefile(cli.root, cli.sandbox, output_dir).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("srcgraph v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
