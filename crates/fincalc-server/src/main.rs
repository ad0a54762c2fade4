//! fincalc service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use fincalc_core::SourceAdapter;
use fincalc_edgar::EdgarAdapter;
use fincalc_engine::Engine;
use fincalc_server::{AppState, build_router};
use fincalc_store::{FactStore, StoreConfig};

/// Default port for the service.
const DEFAULT_PORT: u16 = 8350;

/// Fallback user agent; the SEC requires a contact address, so deployments
/// should set `FINCALC_USER_AGENT`.
const DEFAULT_USER_AGENT: &str = "fincalc/0.1 (dev@fincalc.local)";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("fincalc v{}", env!("CARGO_PKG_VERSION"));

    let user_agent =
        std::env::var("FINCALC_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
    let port = std::env::var("FINCALC_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let edgar: Arc<dyn SourceAdapter> = Arc::new(EdgarAdapter::new(&user_agent)?);
    let store = Arc::new(FactStore::new(StoreConfig::default(), vec![edgar]));
    let engine = Arc::new(Engine::new(store));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = build_router(AppState::new(engine)).layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Starting HTTP server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
