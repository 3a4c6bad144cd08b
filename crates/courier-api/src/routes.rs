//! API routes

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::handlers::{campaigns, health, notify, preferences, registration};
use crate::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    let api = Router::new()
        .route("/notifications", put(registration::register))
        .route("/users/:guid", post(notify::notify_user))
        .route("/emails", post(notify::notify_email))
        .route("/spaces/:guid", post(notify::notify_space))
        .route("/organizations/:guid", post(notify::notify_organization))
        .route("/uaa_scopes/:scope", post(notify::notify_scope))
        .route("/everyone", post(notify::notify_everyone))
        .route("/senders/:sender_id/campaigns", post(campaigns::create_campaign))
        .route("/campaigns/:campaign_id/status", get(campaigns::campaign_status))
        .route(
            "/user_preferences",
            get(preferences::get_own_preferences).patch(preferences::update_own_preferences),
        )
        .route(
            "/user_preferences/:user_guid",
            get(preferences::get_preferences).patch(preferences::update_preferences),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
