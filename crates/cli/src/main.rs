//! hnrag CLI, the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `serve`: Start the HTTP gateway
//! - `ask`: Ask one question, optionally streaming the answer
//! - `history`: Print a conversation's messages
//! - `ingest`: Embed and index stories from a JSON file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "hnrag",
    about = "hnrag: ask questions about Hacker News articles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.hnrag/config.toml)
    #[arg(short, long, global = true, env = "HNRAG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a question
    Ask {
        /// The question
        query: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,
    },

    /// Show the messages of a conversation
    History {
        /// Conversation id
        conversation: String,
    },

    /// Index stories from a JSON file
    Ingest {
        /// JSON array of {id, title, url, text}
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init => commands::init::run(config_path).await?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ask {
            query,
            conversation,
            stream,
        } => commands::ask::run(config_path, &query, conversation, stream).await?,
        Commands::History { conversation } => {
            commands::history::run(config_path, &conversation).await?
        }
        Commands::Ingest { file } => commands::ingest::run(config_path, &file).await?,
    }

    Ok(())
}
