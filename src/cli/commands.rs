//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "memberqa")]
#[command(about = "Answer questions about community members from their messages")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: configured level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host address to bind to (overrides [server].host)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Answer one question and exit
    Ask {
        /// The question to ask
        question: String,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which members a question refers to, without retrieval or generation
    Resolve {
        /// The question to analyze
        question: String,
    },
    /// Build the known-identity file from a raw message dump
    BuildKnownNames {
        /// JSON dump of messages carrying `user_name`
        #[arg(short, long)]
        messages: PathBuf,
        /// Output path (default: [cache].path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
