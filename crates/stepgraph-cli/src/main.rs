//! stepgraph CLI - validate and query state-machine graph descriptions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Validate and query state-machine graph descriptions (.json or .toml).
#[derive(Parser, Debug)]
#[command(
    name = "sg",
    author,
    version,
    about = "stepgraph: validate and query state-machine graphs",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the described graph and report its size.
    Validate {
        /// Graph description file.
        file: PathBuf,
    },

    /// Resolve the action that runs next.
    Next {
        /// Graph description file.
        file: PathBuf,

        /// Action that just ran (omit to resolve the entrypoint).
        #[arg(long)]
        from: Option<String>,

        /// Entrypoint action (defaults to the description's entrypoint).
        #[arg(short, long)]
        entrypoint: Option<String>,

        /// State as a JSON object.
        #[arg(short, long, default_value = "{}")]
        state: String,
    },

    /// List the actions carrying a tag.
    Tags {
        /// Graph description file.
        file: PathBuf,

        /// Tag to look up.
        tag: String,
    },

    /// Print the graph structure as JSON.
    Model {
        /// Graph description file.
        file: PathBuf,
    },

    /// Print the graph in Graphviz DOT format.
    Dot {
        /// Graph description file.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags.
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { file } => commands::inspect::validate(&file),
        Commands::Next {
            file,
            from,
            entrypoint,
            state,
        } => commands::resolve::next(&file, from.as_deref(), entrypoint.as_deref(), &state),
        Commands::Tags { file, tag } => commands::inspect::tags(&file, &tag),
        Commands::Model { file } => commands::inspect::model(&file),
        Commands::Dot { file } => commands::inspect::dot(&file),
    }
}
