use clap::{Parser, Subcommand};
use std::path::PathBuf;

use creative_studio::generation::TaskKind;

#[derive(Parser)]
#[command(name = "creative-studio")]
#[command(about = "AI creative studio backend: chat, image, video, audio and avatar generation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "studio.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides server.bind_addr
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Print the model to tier table
    Tiers,

    /// Print the effective configuration as TOML
    Config,

    /// Wait for a task on a running server, logging progress
    Await {
        /// Base URL of the server
        #[arg(short, long, default_value = "http://127.0.0.1:8787")]
        server: String,

        /// Task kind: image, video, audio or avatar
        #[arg(short, long)]
        kind: TaskKind,

        /// Value sent as X-User-Id
        #[arg(short, long)]
        user: Option<String>,

        /// Provider task id
        task_id: String,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve { bind: None }
    }
}
