//! Clonewatch server binary.
//!
//! Serves the registration and hit-report endpoints over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Persistent state, real mail delivery
//! clonewatch-server --listen 0.0.0.0:8080 --data /var/lib/clonewatch \
//!     --sendmail /usr/sbin/sendmail --sender canary@example.org
//!
//! # Same, from the environment
//! CLONEWATCH__LISTEN=0.0.0.0:8080 \
//! CLONEWATCH__DATA=/var/lib/clonewatch \
//! CLONEWATCH__SENDMAIL=/usr/sbin/sendmail \
//! clonewatch-server
//! ```

use std::{io::IsTerminal, net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use clonewatch_server::{Cli, LogFormat, http, shutdown};
use clonewatch_service::{CanaryService, LogNotifier, Notifier, SendmailNotifier};
use clonewatch_store::{BlobStore, FileStore, InMemoryStore, StoreError};
use clonewatch_types::ConfigError;
use snafu::{ResultExt, Snafu};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level error type for the server binary.
#[derive(Debug, Snafu)]
enum ServerError {
    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Failed to open data directory {}: {source}", path.display()))]
    OpenStore { path: PathBuf, source: StoreError },

    #[snafu(display("Failed to bind {addr}: {source}"))]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[snafu(display("Server error: {source}"))]
    Serve { source: std::io::Error },
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    let config = cli.service_config().context(ConfigSnafu)?;

    let store: Arc<dyn BlobStore> = match &cli.data_dir {
        Some(dir) => Arc::new(FileStore::open(dir).context(OpenStoreSnafu { path: dir.clone() })?),
        None => {
            tracing::warn!(
                "Running in ephemeral mode. Registrations and recorded origins will be lost on \
                 shutdown. Set --data or CLONEWATCH__DATA for persistent storage."
            );
            Arc::new(InMemoryStore::new())
        },
    };

    let notifier: Arc<dyn Notifier> = match &cli.sendmail {
        Some(program) => {
            Arc::new(SendmailNotifier::new(program).with_timeout(cli.sendmail_timeout()))
        },
        None => {
            tracing::warn!(
                "No mail transport configured. Alerts will only be logged. \
                 Set --sendmail or CLONEWATCH__SENDMAIL to deliver them."
            );
            Arc::new(LogNotifier)
        },
    };

    if cli.is_localhost_only() {
        tracing::warn!(
            "Listening on localhost only. Remote clients cannot report hits. \
             Set --listen or CLONEWATCH__LISTEN to accept remote connections."
        );
    }

    tracing::info!(
        listen_addr = %cli.listen_addr,
        data_dir = ?cli.data_dir,
        sendmail = ?cli.sendmail,
        serialize_per_token = config.serialize_per_token,
        "Starting Clonewatch"
    );

    let service = Arc::new(CanaryService::new(store, notifier, config));
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(cli.listen_addr)
        .await
        .context(BindSnafu { addr: cli.listen_addr })?;

    tracing::info!("Server ready, accepting connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .context(ServeSnafu)?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the logging system.
///
/// Supports three formats:
/// - `Text`: Human-readable format (development)
/// - `Json`: JSON structured logging (production)
/// - `Auto`: JSON for non-TTY stdout, text otherwise
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}
