//! Client and kind registration handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use courier_core::KindRegistration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{require_scope, AuthContext, CRITICAL_NOTIFICATIONS_WRITE, NOTIFICATIONS_WRITE};
use crate::error::{body, ApiError};
use crate::AppState;

/// Registration body: the client's display name plus its kinds keyed by id
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub notifications: BTreeMap<String, KindFields>,
}

#[derive(Debug, Deserialize)]
pub struct KindFields {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub critical: bool,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    let request = body(payload)?;

    let kinds = request
        .notifications
        .into_iter()
        .map(|(id, fields)| KindRegistration {
            id,
            description: fields.description,
            critical: fields.critical,
        })
        .collect();

    state
        .registrar
        .register(
            &auth.client_id,
            &request.source_name,
            kinds,
            auth.has_scope(CRITICAL_NOTIFICATIONS_WRITE),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
