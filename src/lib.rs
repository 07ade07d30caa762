pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod integrations;
pub mod middleware;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::integrations::{IdentityVerifier, Mailer, PaymentGateway};

/// Everything a handler needs, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityVerifier>,
}
