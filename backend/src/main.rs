//! Reddit MCP server.

use clap::Parser;
use reddit_mcp::{
    config::{CliOverrides, Config},
    create_app_with_config,
    mcp::McpSessionManager,
    operations,
    reddit::RedditClient,
    state::AppState,
};
use reddit_mcp_types::Implementation;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Reddit MCP - Model Context Protocol server for Reddit over Streamable HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Server name reported to clients
    #[arg(long, env = "MCP_SERVER_NAME")]
    name: Option<String>,

    /// Server version reported to clients
    #[arg(long = "server-version", env = "MCP_SERVER_VERSION")]
    server_version: Option<String>,

    /// User-Agent sent to the Reddit API
    #[arg(long, env = "REDDIT_USER_AGENT")]
    user_agent: Option<String>,

    /// Close sessions idle for this many seconds (disabled by default)
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Install the global subscriber. The returned guard flushes the log file on drop.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match config.log_level {
        Some(ref level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let (file_layer, guard) = match config.log_file {
        Some(ref path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_figment(CliOverrides {
        port: args.port,
        server_name: args.name,
        server_version: args.server_version,
        user_agent: args.user_agent,
        idle_timeout_secs: args.idle_timeout_secs,
        log_level: args.log_level,
    })?;

    let _log_guard = init_logging(&config)?;
    info!(
        "Starting {} v{}...",
        config.server_name, config.server_version
    );

    let sessions = McpSessionManager::with_channel_capacity(config.channel_capacity);
    let state = AppState::new(
        sessions.clone(),
        Implementation {
            name: config.server_name.clone(),
            version: config.server_version.clone(),
            title: None,
        },
        operations::catalog_factory(RedditClient::new(config.reddit.clone())),
    );

    let idle_sweep = config.idle_timeout.map(|max_idle| {
        info!("Closing MCP sessions idle for more than {:?}", max_idle);
        sessions.spawn_idle_sweep(max_idle)
    });

    let app = create_app_with_config(state, config.cors_allowed_origins.clone());

    // Bind to 0.0.0.0 to be accessible from all interfaces (Docker, network, etc.)
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MCP endpoint: http://{}/mcp", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown_sessions = sessions.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
        if let Some(sweep) = idle_sweep {
            sweep.abort();
        }
        // Ends open SSE streams so the server can drain.
        shutdown_sessions.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down");
    Ok(())
}
