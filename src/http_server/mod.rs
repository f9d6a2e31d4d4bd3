//! HTTP server module: webhook ingress plus the CRUD API for rules, routing
//! rules and incidents.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{engine::pipeline::EventPipeline, persistence::sqlite::SqliteRepository};

pub mod error;
mod incidents;
mod routing_rules;
mod rules;
mod webhooks;

pub use error::ApiError;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub repo: Arc<SqliteRepository>,
    pub pipeline: Arc<EventPipeline<SqliteRepository, SqliteRepository>>,
    /// Shared secret for inbound webhook signatures. Empty disables
    /// verification.
    pub webhook_secret: Arc<String>,
}

/// Pagination query parameters shared by all list endpoints.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

impl Pagination {
    /// Resolved `(page, page_size)`, clamped to sane bounds.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).clamp(1, 100);
        (page, page_size)
    }
}

/// Builds the application router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/webhook/qubic/events", post(webhooks::receive_qubic_event))
        .route("/webhook/health", get(webhooks::health))
        .route(
            "/api/users/{user_id}/rules",
            post(rules::create_rule).get(rules::list_rules),
        )
        .route(
            "/api/users/{user_id}/rules/{rule_id}",
            get(rules::get_rule).patch(rules::update_rule).delete(rules::delete_rule),
        )
        .route(
            "/api/users/{user_id}/routing-rules",
            post(routing_rules::create_routing_rule).get(routing_rules::list_routing_rules),
        )
        .route(
            "/api/users/{user_id}/routing-rules/{routing_rule_id}",
            get(routing_rules::get_routing_rule)
                .put(routing_rules::update_routing_rule)
                .delete(routing_rules::delete_routing_rule),
        )
        .route("/api/users/{user_id}/incidents", get(incidents::list_incidents))
        .route(
            "/api/users/{user_id}/incidents/{incident_id}",
            get(incidents::get_incident).patch(incidents::update_incident),
        )
        .with_state(state)
}

/// Binds the listen address and serves requests until the process exits.
pub async fn run_server(
    listen_address: &str,
    state: ApiState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = listen_address.parse()?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "API server listening.");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
