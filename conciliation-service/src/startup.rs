//! Application startup and lifecycle management.

use crate::config::ConciliationConfig;
use crate::handlers::{
    assign_documents, dissolve_group, fallback, health_check, list_groups, metrics_handler,
    readiness_check,
};
use crate::services::{
    init_metrics, CacheInvalidationSink, ConciliationServices, DocumentAccessor, ErpNextClient,
    ErpNextPartyResolver, NoopCacheSink, RedisCacheSink,
};
use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub services: ConciliationServices,
    pub accessor: Arc<dyn DocumentAccessor>,
}

/// HTTP routes with tracing, request-id and metrics middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/conciliations/:family",
            get(list_groups).post(assign_documents),
        )
        .route(
            "/api/v1/conciliations/:family/:group_id",
            delete(dissolve_group),
        )
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .fallback(fallback)
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ConciliationConfig) -> Result<Self, AppError> {
        init_metrics();

        let client = ErpNextClient::new(config.erpnext.clone()).map_err(|e| {
            tracing::error!(error = %e, "Failed to create ERPNext client");
            AppError::ConfigError(e)
        })?;

        let cache: Arc<dyn CacheInvalidationSink> = match &config.cache.redis_url {
            Some(url) => match RedisCacheSink::new(url).await {
                Ok(sink) => {
                    tracing::info!("Connected to Redis for cache invalidation");
                    Arc::new(sink)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to connect to Redis - cache invalidation disabled");
                    Arc::new(NoopCacheSink)
                }
            },
            None => {
                tracing::info!("Redis URL not configured - cache invalidation disabled");
                Arc::new(NoopCacheSink)
            }
        };

        let accessor: Arc<dyn DocumentAccessor> = Arc::new(client.clone());
        let parties = Arc::new(ErpNextPartyResolver::new(client));
        let services =
            ConciliationServices::new(accessor.clone(), parties, cache, &config.cache.prefix);

        let state = AppState { services, accessor };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Conciliation service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "conciliation-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
