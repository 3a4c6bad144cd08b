//! User preference handlers
//!
//! Admins address any user by guid; a user token manages its own
//! preferences through the bare `/user_preferences` routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use courier_common::Error;
use courier_core::preferences::{PreferenceUpdate, UserPreferences};
use std::sync::Arc;

use crate::auth::{
    require_scope, AuthContext, PREFERENCES_ADMIN, PREFERENCES_READ, PREFERENCES_WRITE,
};
use crate::error::{body, ApiError};
use crate::AppState;

fn own_guid(auth: &AuthContext) -> Result<&str, ApiError> {
    auth.user_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            Error::Validation("Token does not identify a user: user_id is missing".into()).into()
        })
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_guid): Path<String>,
) -> Result<Json<UserPreferences>, ApiError> {
    require_scope(&auth, PREFERENCES_ADMIN)?;
    Ok(Json(state.preferences.get(&user_guid).await?))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_guid): Path<String>,
    payload: Result<Json<PreferenceUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    require_scope(&auth, PREFERENCES_ADMIN)?;
    state
        .preferences
        .update(&user_guid, body(payload)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_own_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserPreferences>, ApiError> {
    require_scope(&auth, PREFERENCES_READ)?;
    let user_guid = own_guid(&auth)?;
    Ok(Json(state.preferences.get(user_guid).await?))
}

pub async fn update_own_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<PreferenceUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    require_scope(&auth, PREFERENCES_WRITE)?;
    let user_guid = own_guid(&auth)?;
    state.preferences.update(user_guid, body(payload)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{bearer, bearer_for, harness, Harness};
    use axum::http::{header::AUTHORIZATION, StatusCode};
    use courier_core::testing::FakeDirectory;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    async fn with_kinds() -> Harness {
        let h = harness(FakeDirectory::default());
        h.store
            .add_kind("notifications-sender", "acceptance-test", false)
            .await;
        h.store.add_kind("notifications-sender", "outage", true).await;
        h
    }

    #[tokio::test]
    async fn test_admin_updates_and_reads_preferences() {
        let h = with_kinds().await;
        let admin = bearer(&["notification_preferences.admin"]);

        let response = h
            .server
            .patch("/user_preferences/user-123")
            .add_header(AUTHORIZATION, admin.clone())
            .json(&json!({
                "global_unsubscribe": false,
                "clients": {
                    "notifications-sender": {"acceptance-test": {"email": false}}
                }
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

        let response = h
            .server
            .get("/user_preferences/user-123")
            .add_header(AUTHORIZATION, admin)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let preferences: Value = response.json();
        assert_eq!(preferences["global_unsubscribe"], false);
        assert_eq!(
            preferences["clients"]["notifications-sender"]["acceptance-test"]["email"],
            false
        );
    }

    #[tokio::test]
    async fn test_critical_opt_out_is_forbidden() {
        let h = with_kinds().await;
        let response = h
            .server
            .patch("/user_preferences/user-123")
            .add_header(AUTHORIZATION, bearer(&["notification_preferences.admin"]))
            .json(&json!({
                "clients": {"notifications-sender": {"outage": {"email": false}}}
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_own_preferences_use_token_user() {
        let h = with_kinds().await;
        let user = bearer_for(
            "notifications-sender",
            Some("user-123"),
            &["notification_preferences.read", "notification_preferences.write"],
        );

        let response = h
            .server
            .patch("/user_preferences")
            .add_header(AUTHORIZATION, user.clone())
            .json(&json!({"global_unsubscribe": true}))
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

        let preferences: Value = h
            .server
            .get("/user_preferences")
            .add_header(AUTHORIZATION, user)
            .await
            .json();
        assert_eq!(preferences["global_unsubscribe"], true);

        // Client tokens carry no user.
        let response = h
            .server
            .get("/user_preferences")
            .add_header(AUTHORIZATION, bearer(&["notification_preferences.read"]))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_admin_routes_need_admin_scope() {
        let h = with_kinds().await;
        let response = h
            .server
            .get("/user_preferences/user-123")
            .add_header(AUTHORIZATION, bearer(&["notification_preferences.read"]))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }
}
