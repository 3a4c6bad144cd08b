//! Campaign handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use courier_common::types::CampaignId;
use courier_common::Error;
use courier_core::{CampaignStatus, NewCampaign};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_scope, AuthContext, CRITICAL_NOTIFICATIONS_WRITE, NOTIFICATIONS_WRITE};
use crate::error::{body, ApiError};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignCreated {
    pub campaign_id: CampaignId,
}

/// Accept a campaign; delivery happens in the background
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(sender_id): Path<String>,
    payload: Result<Json<NewCampaign>, JsonRejection>,
) -> Result<(StatusCode, Json<CampaignCreated>), ApiError> {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    let campaign = state
        .campaigns
        .create(
            &sender_id,
            body(payload)?,
            &auth.client_id,
            auth.has_scope(CRITICAL_NOTIFICATIONS_WRITE),
            &auth.uaa_host,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CampaignCreated {
            campaign_id: campaign.id,
        }),
    ))
}

pub async fn campaign_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<String>,
) -> Result<Json<CampaignStatus>, ApiError> {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    // A malformed id cannot name a campaign.
    let id = Uuid::parse_str(&campaign_id).map_err(|_| {
        Error::NotFound(format!(
            "Campaign with id {:?} could not be found",
            campaign_id
        ))
    })?;

    let status = state.campaign_status.get(id, &auth.client_id).await?;
    Ok(Json(status))
}
