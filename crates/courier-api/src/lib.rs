//! Courier API - HTTP surface of the notification service
//!
//! Token authentication, the single-shot notify routes, registration,
//! campaigns, user preferences and health checks.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

use auth::TokenVerifier;
use courier_core::{
    CampaignStatusAggregator, CampaignsCollection, Notifier, PreferenceUpdater, Registrar,
    Services,
};
use courier_storage::DatabasePool;
use std::sync::Arc;

pub use error::ApiError;
pub use routes::create_router;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<Notifier>,
    pub registrar: Arc<Registrar>,
    pub campaigns: Arc<CampaignsCollection>,
    pub campaign_status: Arc<CampaignStatusAggregator>,
    pub preferences: Arc<PreferenceUpdater>,
    pub verifier: Arc<TokenVerifier>,
    /// Checked by the readiness probe when present
    pub db_pool: Option<DatabasePool>,
}

impl AppState {
    pub fn new(services: &Services, verifier: TokenVerifier, db_pool: Option<DatabasePool>) -> Self {
        Self {
            notifier: services.notifier.clone(),
            registrar: services.registrar.clone(),
            campaigns: services.campaigns.clone(),
            campaign_status: services.campaign_status.clone(),
            preferences: services.preferences.clone(),
            verifier: Arc::new(verifier),
            db_pool,
        }
    }
}
