//! studiobot CLI, the main entry point.
//!
//! Commands:
//! - `serve`   start the HTTP gateway
//! - `chat`    stream one chat turn to stdout
//! - `ingest`  add a text file to the knowledge base
//! - `init`    write the default configuration
//! - `tools`   list the tool catalogue

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "studiobot",
    about = "studiobot: persona-driven chat backend with streaming tools",
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

    /// Config file (default: ~/.studiobot/config.toml)
    #[arg(short, long, global = true, env = "STUDIOBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message and stream the reply
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Persona to answer as
        #[arg(short, long)]
        agent: Option<String>,

        /// Project key for tools that write files
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Add a text, markdown or PDF file to the knowledge base
    Ingest {
        file: PathBuf,

        /// Source title (default: file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Restrict the source to these agents (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,

        /// Attach the source to a project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List the tools offered to the model
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat {
            message,
            agent,
            project,
        } => commands::chat::run(config_path, message, agent, project).await?,
        Commands::Ingest {
            file,
            title,
            agents,
            project,
        } => commands::ingest::run(config_path, &file, title, agents, project).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Tools => commands::tools::run(config_path)?,
    }

    Ok(())
}
