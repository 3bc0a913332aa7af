//! township-node: HTTP service for the TownShip report lifecycle
//!
//! Exposes the lifecycle engine over JSON, pushes notifications to
//! dashboards over Server-Sent Events and keeps a short per-report
//! notification history.

pub mod api;
pub mod config;
pub mod hub;
pub mod inbox;

pub use api::{create_router, AppState};
pub use config::Config;
