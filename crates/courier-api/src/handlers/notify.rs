//! Single-shot send handlers, one per audience

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Extension, Json,
};
use courier_common::types::Audience;
use courier_core::{Caller, NotifyRequest, Response};
use std::sync::Arc;

use crate::auth::{
    require_scope, vcap_request_id, AuthContext, CRITICAL_NOTIFICATIONS_WRITE, EMAILS_WRITE,
    NOTIFICATIONS_WRITE,
};
use crate::error::{body, ApiError};
use crate::AppState;

type Receipts = Result<Json<Vec<Response>>, ApiError>;

async fn notify(
    state: &AppState,
    auth: &AuthContext,
    headers: &HeaderMap,
    audience: Audience,
    target: &str,
    request: NotifyRequest,
) -> Receipts {
    let caller = Caller {
        client_id: auth.client_id.clone(),
        uaa_host: auth.uaa_host.clone(),
        has_critical_scope: auth.has_scope(CRITICAL_NOTIFICATIONS_WRITE),
        vcap_request_id: vcap_request_id(headers),
    };
    let responses = state
        .notifier
        .notify(audience, target, request, &caller)
        .await?;
    Ok(Json(responses))
}

/// Send to one user
pub async fn notify_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    notify(&state, &auth, &headers, Audience::User, &guid, body(payload)?).await
}

/// Send to a raw address given in `to`
pub async fn notify_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, EMAILS_WRITE)?;
    notify(&state, &auth, &headers, Audience::Email, "", body(payload)?).await
}

/// Send to every member of a space
pub async fn notify_space(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    notify(&state, &auth, &headers, Audience::Space, &guid, body(payload)?).await
}

/// Send to an organization, optionally narrowed by `role`
pub async fn notify_organization(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    notify(&state, &auth, &headers, Audience::Org, &guid, body(payload)?).await
}

/// Send to every holder of a UAA scope
pub async fn notify_scope(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(scope): Path<String>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    notify(&state, &auth, &headers, Audience::Scope, &scope, body(payload)?).await
}

pub async fn notify_everyone(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Receipts {
    require_scope(&auth, NOTIFICATIONS_WRITE)?;
    notify(&state, &auth, &headers, Audience::Everyone, "", body(payload)?).await
}
