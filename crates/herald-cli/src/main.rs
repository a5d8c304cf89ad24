//! herald - outbox → Matrix relay
//!
//! 設定は CLI フラグか環境変数で渡す。検証に失敗したら何も起動せずに終了する。
//! SIGINT / SIGTERM で poll loop と membership sync を止め、pool を閉じる。

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use herald_core::app::{AppBuilder, BuildError, ShutdownError};
use herald_core::config::{self, ConfigError, RelayConfig, parse_duration, split_list};
use herald_core::domain::{PlatformError, StoreError};
use herald_core::impls::{MatrixClient, PgStore};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Relay domain events from PostgreSQL outbox tables to Matrix rooms.
#[derive(Parser, Debug)]
#[command(name = "herald", version)]
struct Args {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", default_value = "", hide_default_value = true, hide_env_values = true)]
    database_url: String,

    /// Matrix homeserver base URL.
    #[arg(long, env = "MATRIX_HOMESERVER_URL", default_value = "", hide_default_value = true)]
    homeserver_url: String,

    /// Matrix user id of the relay account (@user:domain).
    #[arg(long, env = "MATRIX_USER_ID", default_value = "", hide_default_value = true)]
    user_id: String,

    /// Access token of the relay account.
    #[arg(long, env = "MATRIX_ACCESS_TOKEN", default_value = "", hide_default_value = true, hide_env_values = true)]
    access_token: String,

    /// Pause between poll cycles (500ms, 5s, 1m ...).
    #[arg(long, env = "POLL_INTERVAL", default_value = "5s", value_parser = parse_duration)]
    poll_interval: Duration,

    /// Claims per event before it is marked failed.
    #[arg(long, env = "MAX_RETRIES", default_value_t = config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Rows read per table per cycle.
    #[arg(long, env = "OUTBOX_BATCH_SIZE", default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: u32,

    /// Comma-separated room ids the relay may join.
    #[arg(long, env = "ALLOWED_ROOM_IDS", default_value = "")]
    allowed_room_ids: String,

    /// Comma-separated outbox tables to poll.
    #[arg(long, env = "OUTBOX_TABLES", default_value = "")]
    outbox_tables: String,

    /// Table that receives DeliveryFailed events.
    #[arg(long, env = "ADAPTER_OUTBOX_TABLE", default_value = config::DEFAULT_ADAPTER_OUTBOX_TABLE)]
    adapter_outbox_table: String,

    /// How long to wait for tasks on shutdown.
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    shutdown_timeout: Duration,

    /// Matrix sync long-poll timeout.
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    sync_timeout: Duration,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            database_url: self.database_url.trim().to_string(),
            homeserver_url: self.homeserver_url.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
            access_token: self.access_token.trim().to_string(),
            poll_interval: self.poll_interval,
            max_retries: self.max_retries,
            batch_size: self.batch_size,
            allowed_rooms: split_list(&self.allowed_room_ids),
            outbox_tables: split_list(&self.outbox_tables),
            adapter_outbox_table: self.adapter_outbox_table.trim().to_string(),
            shutdown_timeout: self.shutdown_timeout,
            sync_timeout: self.sync_timeout,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("database: {0}")]
    Store(#[from] StoreError),

    #[error("matrix client: {0}")]
    Platform(#[from] PlatformError),

    #[error("app init: {0}")]
    Build(#[from] BuildError),

    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),

    #[error("shutdown: {0}")]
    Shutdown(#[from] ShutdownError),
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

async fn run(config: RelayConfig) -> Result<(), CliError> {
    config.validate()?;
    info!(?config, "starting herald");

    let store = Arc::new(PgStore::connect(&config.database_url, &config.adapter_outbox_table).await?);
    store.migrate().await?;

    let matrix = MatrixClient::new(
        &config.homeserver_url,
        config.user_id.clone(),
        config.access_token.clone(),
        config.sync_timeout,
    )?;

    let app = AppBuilder::from_config(&config)
        .claim_store(store.clone())
        .outbox_source(store.clone())
        .event_sink(store.clone())
        .platform(Arc::new(matrix))
        .build()?;
    let running = app.start();

    let signal = wait_for_signal().await;
    info!("shutdown requested");
    let stopped = running.shutdown(config.shutdown_timeout).await;
    store.close().await;

    signal?;
    stopped?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args.relay_config()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "herald exited with error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_a_trimmed_config() {
        let args = Args::try_parse_from([
            "herald",
            "--database-url",
            "postgres://localhost/app",
            "--homeserver-url",
            "https://matrix.example.org",
            "--user-id",
            " @herald:example.org ",
            "--access-token",
            "t",
            "--outbox-tables",
            "outbox_events, billing.outbox",
            "--allowed-room-ids",
            "!a:x,,!b:x",
            "--poll-interval",
            "250ms",
        ])
        .unwrap();
        let config = args.relay_config();

        assert_eq!(config.user_id, "@herald:example.org");
        assert_eq!(config.outbox_tables, vec!["outbox_events", "billing.outbox"]);
        assert_eq!(config.allowed_rooms, vec!["!a:x", "!b:x"]);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.adapter_outbox_table, "adapter_outbox");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let result = Args::try_parse_from(["herald", "--poll-interval", "soon"]);
        assert!(result.is_err());
    }
}
