use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_gateway::config::{Config, DirectoryBackend};
use parley_gateway::directory::http::{HttpGroupDirectory, HttpIdentityDirectory};
use parley_gateway::directory::memory::{MemoryGroupDirectory, MemoryIdentityDirectory};
use parley_gateway::directory::{GroupDirectory, IdentityDirectory};
use parley_gateway::AppState;

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

    let (identities, groups): (Arc<dyn IdentityDirectory>, Arc<dyn GroupDirectory>) =
        match &config.directory {
            DirectoryBackend::Http {
                identity_url,
                group_url,
            } => {
                tracing::info!(%identity_url, %group_url, "using http directories");
                let identities: Arc<dyn IdentityDirectory> = Arc::new(
                    HttpIdentityDirectory::new(identity_url, config.directory_timeout)
                        .expect("failed to build identity directory client"),
                );
                let groups: Arc<dyn GroupDirectory> = Arc::new(
                    HttpGroupDirectory::new(group_url, config.directory_timeout)
                        .expect("failed to build group directory client"),
                );
                (identities, groups)
            }
            DirectoryBackend::Memory => {
                tracing::warn!("using in-memory directories; state is lost on restart");
                let identities: Arc<dyn IdentityDirectory> =
                    Arc::new(MemoryIdentityDirectory::new());
                let groups: Arc<dyn GroupDirectory> = Arc::new(MemoryGroupDirectory::new());
                (identities, groups)
            }
        };

    tracing::info!(
        directory_timeout_ms = config.directory_timeout.as_millis() as u64,
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        "gateway configured"
    );

    let state = AppState::new(config, identities, groups);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(parley_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
