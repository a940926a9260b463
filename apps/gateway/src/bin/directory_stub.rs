//! Serves in-memory identity and group directories over HTTP.
//!
//! Point the gateway at it with
//! `IDENTITY_DIRECTORY_URL=GROUP_DIRECTORY_URL=http://127.0.0.1:50051`.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_gateway::directory::memory::{MemoryGroupDirectory, MemoryIdentityDirectory};
use parley_gateway::directory::stub::{self, StubState};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::var("DIRECTORY_STUB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50051);

    let state = StubState {
        identities: Arc::new(MemoryIdentityDirectory::new()),
        groups: Arc::new(MemoryGroupDirectory::new()),
    };
    let app = stub::router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "directory stub listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
