use clap::Parser;
use memberqa::cli::handle_ask;
use memberqa::cli::handle_build_known_names;
use memberqa::cli::handle_resolve;
use memberqa::cli::handle_serve;
use memberqa::cli::load_config;
use memberqa::cli::Cli;
use memberqa::cli::Commands;
use memberqa::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize logging
    if cli.verbose {
        memberqa::logging::init_logging_with_level("debug", config.logging.file)?;
    } else {
        memberqa::logging::init_logging_with_config(&config.logging)?;
    }
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve { host, port } => handle_serve(config, host, port).await,
        Commands::Ask { question, json } => handle_ask(&config, &question, json).await,
        Commands::Resolve { question } => handle_resolve(&config, &question),
        Commands::BuildKnownNames { messages, output } => {
            handle_build_known_names(&config, &messages, output.as_deref())
        }
    }
}
