//! Armory API server
//!
//! Axum router over the logistics, ledger, balance and armory workflows.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::config::ArmoryConfig;
use crate::session::SessionManager;
use crate::sheets::Connector;

/// API Server configuration
#[derive(Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub config: Arc<ArmoryConfig>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Arc<ArmoryConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions: Arc::new(SessionManager::new(connector, config.clone())),
            config,
        }
    }
}

/// Every route, with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        .route("/api/v1/sheets/:range/records", get(handlers::records))
        .route("/api/v1/logistics/:unit", get(handlers::logistics_view))
        .route("/api/v1/logistics/:unit/orders", post(handlers::submit_order))
        .route("/api/v1/logistics/:unit/transition", post(handlers::transition))
        .route("/api/v1/logistics/:unit/sign-out", post(handlers::sign_out))
        .route("/api/v1/logistics/:unit/read", post(handlers::read_flag))
        .route("/api/v1/balances", get(handlers::balances))
        .route("/api/v1/equipment/:range", get(handlers::equipment))
        .route("/api/v1/equipment/:range/sign", post(handlers::equipment_sign))
        .route("/api/v1/equipment/:range/credit", post(handlers::equipment_credit))
        .route("/api/v1/armory/issue", post(handlers::armory_issue))
        .route("/api/v1/armory/credit", post(handlers::armory_credit))
        .route("/api/v1/armory/repair", post(handlers::armory_repair))
        .route("/api/v1/armory/receive", post(handlers::armory_receive))
        .route("/api/v1/armory/add", post(handlers::armory_add))
        .route("/api/v1/armory/return-all", post(handlers::armory_return_all))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server until SIGINT/SIGTERM.
pub async fn run_api_server(config: ApiConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Armory API server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/logistics, /api/v1/balances, /api/v1/equipment, /api/v1/armory");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Armory API server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::{MemoryConnector, MemorySheetStore};

    fn state() -> AppState {
        let connector = MemoryConnector::new(Arc::new(MemorySheetStore::new()));
        AppState::new(Arc::new(ArmoryConfig::default()), Arc::new(connector))
    }

    // ==================== ApiConfig Tests ====================

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_config_address_format() {
        let config = ApiConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
        };
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    // ==================== AppState Tests ====================

    #[test]
    fn test_app_state_version() {
        assert_eq!(state().version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_app_state_shares_config() {
        let state = Arc::new(state());
        let clone = Arc::clone(&state);
        assert!(Arc::ptr_eq(&state.config, clone.sessions.config()));
        assert_eq!(Arc::strong_count(&state), 2);
    }
}
