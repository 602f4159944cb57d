//! Outbound email dispatch and delivery-event reconciliation for the
//! PressHub backend: drains scheduled emails through the sender's own
//! provider (Gmail, Outlook, SMTP relay) or the shared transactional
//! provider, then folds tracker and provider webhooks back onto the rows.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub http: reqwest::Client,
    pub config: Arc<config::Config>,
    pub collaborators: Arc<services::collaborators::Collaborators>,
}
