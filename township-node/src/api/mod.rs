//! HTTP API for reports, moderation and notifications

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use township_lifecycle::{ModerationGate, ReportLifecycleEngine};

use crate::config::Config;
use crate::hub::NotificationHub;
use crate::inbox::NotificationInbox;

pub use error::ApiError;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<ReportLifecycleEngine>,
    pub gate: ModerationGate,
    pub hub: NotificationHub,
    pub inbox: Arc<NotificationInbox>,
}

impl AppState {
    /// Build the engine and wire the hub and inbox to its fan-out.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Self {
        let engine = Arc::new(ReportLifecycleEngine::with_config(config.lifecycle.clone()));
        let gate = ModerationGate::new(engine.clone());

        let inbox = Arc::new(NotificationInbox::new(config.inbox.max_per_report));
        // Lives as long as the engine's fan-out.
        let _ = inbox.attach(engine.fanout());

        let hub = NotificationHub::new(config.api.stream_capacity);
        hub.attach(engine.fanout(), config.lifecycle.fanout.delivery_timeout());

        Self {
            config: Arc::new(config),
            engine,
            gate,
            hub,
            inbox,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/reports", post(routes::submit_report).get(routes::list_reports))
        .route("/reports/:id", get(routes::get_report))
        .route("/reports/:id/votes", post(routes::cast_vote))
        .route("/reports/:id/master-vote", post(routes::master_vote))
        .route("/reports/:id/conclude", post(routes::conclude))
        .route("/reports/:id/initiative", post(routes::take_initiative))
        // Admin setters
        .route("/reports/:id/status", post(routes::update_status))
        .route("/reports/:id/priority", post(routes::update_priority))
        .route("/reports/:id/assignment", post(routes::assign))
        .route("/reports/:id/progress", post(routes::update_progress))
        // Notifications
        .route("/reports/:id/notifications", get(routes::report_notifications))
        .route("/notifications/stream", get(routes::notification_stream))
        .route("/stats", get(routes::stats))
        // Health check
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
