//! Taskdeck server: user-scoped task tracking over HTTP/JSON.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin taskdeck-server
//!
//! # Run on custom address with debug logs written to a file
//! cargo run --bin taskdeck-server -- --bind 127.0.0.1:3000 \
//!     --log-level debug --log-file /tmp/taskdeck.log
//!
//! # Or via environment variables
//! TASKDECK_ADDR=127.0.0.1:3000 cargo run --bin taskdeck-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use taskdeck::clock::SystemClock;
use taskdeck_server::api::{self, AppState};
use taskdeck_server::config::{ServerCliArgs, ServerConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(
        addr = %config.bind_addr,
        identity_header = %config.identity_header,
        "starting taskdeck server"
    );

    let state = Arc::new(AppState::from_config(&config, Arc::new(SystemClock)));

    match api::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskdeck server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "taskdeck server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start taskdeck server");
            std::process::exit(1);
        }
    }
}

/// Initialize logging to stdout, or to `file_path` when given.
///
/// `RUST_LOG` takes precedence over `level`. For file output the returned
/// [`WorkerGuard`] must be held until shutdown so buffered entries are
/// flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(split_log_path) else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn split_log_path(path: &Path) -> Option<(&Path, &str)> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Some((dir, path.file_name()?.to_str()?))
}
