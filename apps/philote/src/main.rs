use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use philote::config::Config;
use philote::gateway::fanout::RedisBroker;
use philote::gateway::Hive;
use philote::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        port,
        cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        "initializing philotic network"
    );
    tracing::debug!(
        read_buffer_size = config.read_buffer_size,
        write_buffer_size = config.write_buffer_size,
        max_connections = config.max_connections,
        inbox_capacity = config.inbox_capacity,
        "configuration options"
    );

    let hive = match config.redis_url.as_deref() {
        Some(url) => {
            let broker = RedisBroker::connect(url)
                .await
                .expect("failed to connect to redis");
            let hive = Hive::with_broker(config.max_connections, Arc::new(broker.clone()));
            broker.spawn_relay(&hive);
            tracing::info!("fan-out backed by redis");
            hive
        }
        None => Hive::new(config.max_connections),
    };

    let state = AppState::new(config, hive.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(philote::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "philote listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hive))
        .await
        .expect("server error");
}

async fn shutdown_signal(hive: Hive) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        return;
    }

    match hive.disconnect_all().await {
        Ok(n) => tracing::info!(disconnected = n, "shutting down"),
        Err(e) => tracing::warn!(error = %e, "hive already stopped"),
    }
}
