//! HTTP API module for the DCA service.
//!
//! Provides REST endpoints for managing the caller's DCA schedule and
//! reading its purchase history.

mod errors;
mod handlers;
mod identity;
mod responses;

pub use errors::ApiError;
pub use handlers::ApiState;
pub use identity::{WALLET_ADDRESS_HEADER, WalletIdentity};
pub use responses::*;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post, put},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::manager::DcaJobManager;
use crate::scheduler::DispatcherHandle;
use crate::storage::JobStore;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Allowed cross-origin callers.
    pub cors: CorsSettings,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors: CorsSettings::default(),
        }
    }
}

impl ApiConfig {
    /// Create a new API config with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cors: CorsSettings::default(),
        }
    }

    /// Set the CORS settings.
    pub fn with_cors(mut self, cors: CorsSettings) -> Self {
        self.cors = cors;
        self
    }

    /// Get the socket address.
    pub fn socket_addr(&self) -> std::io::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address {}:{}: {}", self.host, self.port, e),
            )
        })
    }
}

/// Which browser origins may call the API.
#[derive(Debug, Clone, Default)]
pub struct CorsSettings {
    /// Domain allowed over http or https, without scheme or port.
    pub allowed_domain: Option<String>,
    /// Also allow `localhost` on any port.
    pub development: bool,
}

impl CorsSettings {
    /// Whether a request `Origin` is allowed.
    pub fn allows(&self, origin: &str) -> bool {
        let Some(host) = origin
            .strip_prefix("https://")
            .or_else(|| origin.strip_prefix("http://"))
        else {
            return false;
        };

        if self.allowed_domain.as_deref() == Some(host) {
            return true;
        }

        if self.development {
            if let Some(rest) = host.strip_prefix("localhost") {
                return rest.is_empty()
                    || rest
                        .strip_prefix(':')
                        .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
            }
        }

        false
    }

    fn layer(&self) -> CorsLayer {
        let settings = self.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin.to_str().is_ok_and(|origin| settings.allows(origin))
            }))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(WALLET_ADDRESS_HEADER),
            ])
    }
}

/// Build the API router with all endpoints.
pub fn build_router<S: JobStore + 'static>(state: ApiState<S>, cors: &CorsSettings) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::<S>))
        // Purchase history
        .route("/purchases", get(handlers::list_purchases::<S>))
        // Schedules
        .route("/schedules", get(handlers::list_schedules::<S>))
        .route("/schedule", post(handlers::create_schedule::<S>))
        .route(
            "/schedules/{schedule_id}",
            put(handlers::edit_schedule::<S>).delete(handlers::delete_schedule::<S>),
        )
        .route(
            "/schedules/{schedule_id}/enable",
            put(handlers::enable_schedule::<S>),
        )
        .route(
            "/schedules/{schedule_id}/disable",
            put(handlers::disable_schedule::<S>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors.layer())
        .with_state(state)
}

/// Create the API state from a manager and an optional dispatcher handle.
pub fn create_api_state<S: JobStore>(
    manager: DcaJobManager<S>,
    dispatcher: Option<DispatcherHandle>,
) -> ApiState<S> {
    ApiState {
        manager,
        dispatcher,
    }
}

/// Start the API server.
///
/// This function spawns the server and returns a handle to the task.
/// The server runs until the task is aborted or the process exits.
pub async fn start_server<S: JobStore + 'static>(
    config: ApiConfig,
    state: ApiState<S>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let router = build_router(state, &config.cors);
    let addr = config.socket_addr()?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(handle)
}
