//! Pitorro server
//!
//! Entry point for the text-to-LaTeX / PDF service.

use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing::info;

use pitorro::config::AppConfig;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenvy::dotenv();

    pitorro::telemetry::init();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        name: "config.loaded",
        provider = %config.ai.provider,
        model = %config.ai.model,
        port = config.server.port,
        "Configuration loaded"
    );

    pitorro::server::start_server(Arc::new(config)).await
}
