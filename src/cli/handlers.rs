//! CLI command handlers

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::api::serve_api;
use crate::cli::output::print_outcome;
use crate::cli::output::print_resolution;
use crate::config::AppConfig;
use crate::identity::builder::write_known_names;
use crate::identity::KnownIdentityCache;
use crate::rag::QaService;
use crate::resolve::CapitalizedSpanExtractor;
use crate::resolve::NameResolver;
use crate::Result;

/// Load `path`, or the default config files, or built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => match AppConfig::load() {
            Ok(config) => Ok(config),
            Err(crate::QaError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No config file found; using defaults");
                AppConfig::from_toml_str("")
            }
            Err(e) => Err(e),
        },
    }
}

/// Handle `serve`
pub async fn handle_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let qa = Arc::new(QaService::new(&config).await?);
    serve_api(qa, &config.server).await
}

/// Handle `ask`
pub async fn handle_ask(config: &AppConfig, question: &str, json: bool) -> Result<()> {
    let qa = QaService::new(config).await?;
    let outcome = qa.answer(question).await?;
    print_outcome(&outcome, json)
}

/// Handle `resolve`: only the identity cache is loaded
pub fn handle_resolve(config: &AppConfig, question: &str) -> Result<()> {
    let cache = Arc::new(KnownIdentityCache::load(&config.cache.path)?);
    let resolver = NameResolver::new(
        cache,
        Arc::new(CapitalizedSpanExtractor::new()),
        config.resolver,
    );
    print_resolution(question, &resolver.resolve(question));
    Ok(())
}

/// Handle `build-known-names`
pub fn handle_build_known_names(
    config: &AppConfig,
    messages: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let output = output.unwrap_or(&config.cache.path);
    let count = write_known_names(messages, output)?;
    info!("Known-identity file ready");
    println!("✅ Wrote {} members to {}", count, output.display());
    Ok(())
}
