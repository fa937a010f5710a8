//! EduHub CLI - sign in, sign up or try the demo from a terminal.
//!
//! Drives the shared `SessionManager` through a small line-oriented command
//! loop. Sessions persist between runs under the platform data directory.

mod app;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eduhub_core::{
    Backend, Config, FileStore, HttpBackend, MemoryBackend, NoticeLevel, SessionManager,
};

use app::App;

// ============================================================================
// Constants
// ============================================================================

/// Overrides the configured backend URL.
const BACKEND_URL_ENV: &str = "EDUHUB_BACKEND_URL";

/// Pre-fills the identifier prompt.
const IDENTIFIER_ENV: &str = "EDUHUB_IDENTIFIER";

/// When set, logs are also written to a daily rolling file in this directory.
const LOG_DIR_ENV: &str = "EDUHUB_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "eduhub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("EduHub CLI starting");

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: eduhub [--local]");
        println!("  --local   Use an in-process backend (accounts last until exit)");
        return Ok(());
    }
    let local = args.iter().any(|a| a == "--local");

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
        config.backend_url = Some(url);
    }
    if let Ok(identifier) = std::env::var(IDENTIFIER_ENV) {
        config.last_identifier = Some(identifier);
    }

    let backend: Arc<dyn Backend> = if local || config.offline {
        info!("Using in-process backend");
        Arc::new(MemoryBackend::new())
    } else {
        match config.backend_url.as_deref() {
            Some(url) => Arc::new(HttpBackend::new(url)?),
            None => bail!(
                "No backend configured. Set {} or run with --local.",
                BACKEND_URL_ENV
            ),
        }
    };

    let store = Arc::new(FileStore::new(config.data_dir()?)?);
    let manager = SessionManager::new(backend, store, config.session_config());

    spawn_notice_printer(&manager);

    let restored = manager.restore().await;
    if let Some(profile) = restored.identity() {
        info!(role = profile.role().as_str(), "Session restored");
    }

    let mut app = App::new(manager, config);
    let result = app.run().await;

    info!("EduHub CLI exiting");
    result
}

/// Print session notices as they arrive.
fn spawn_notice_printer(manager: &SessionManager) {
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let marker = match event.level() {
                        NoticeLevel::Info => "i",
                        NoticeLevel::Success => "+",
                        NoticeLevel::Error => "!",
                    };
                    println!("\n[{}] {}", marker, event.message());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped session notices");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
