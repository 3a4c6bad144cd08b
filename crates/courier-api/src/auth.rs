//! Authentication module
//!
//! Callers present UAA-issued bearer tokens. The token's issuer tells us
//! which UAA the caller belongs to; its scopes gate each route.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use courier_common::config::UaaConfig;
use courier_common::{Error, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub const NOTIFICATIONS_WRITE: &str = "notifications.write";
pub const EMAILS_WRITE: &str = "emails.write";
pub const CRITICAL_NOTIFICATIONS_WRITE: &str = "critical_notifications.write";
pub const PREFERENCES_ADMIN: &str = "notification_preferences.admin";
pub const PREFERENCES_READ: &str = "notification_preferences.read";
pub const PREFERENCES_WRITE: &str = "notification_preferences.write";

/// Claims read from a UAA token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub iss: String,
    pub exp: u64,
}

/// Verifies token signatures against the configured UAA key
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        // UAA audiences name resource servers, not this service.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        Self { key, validation }
    }

    pub fn from_config(config: &UaaConfig) -> Result<Self> {
        let algorithm = Algorithm::from_str(&config.verification_algorithm).map_err(|e| {
            Error::Config(format!(
                "Invalid uaa.verification_algorithm {:?}: {}",
                config.verification_algorithm, e
            ))
        })?;
        let material = config
            .verification_key
            .as_deref()
            .ok_or_else(|| Error::Config("uaa.verification_key is required".into()))?;

        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(material.as_bytes())
            }
            _ => DecodingKey::from_rsa_pem(material.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid uaa.verification_key: {}", e)))?,
        };
        Ok(Self::new(key, algorithm))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("Authorization header is invalid: {}", e)))
    }
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub client_id: String,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    /// Issuer with the token endpoint path removed
    pub uaa_host: String,
}

impl AuthContext {
    pub fn from_claims(claims: Claims) -> Self {
        let uaa_host = claims
            .iss
            .strip_suffix("/oauth/token")
            .unwrap_or(&claims.iss)
            .to_string();
        Self {
            client_id: claims.client_id,
            user_id: claims.user_id,
            scopes: claims.scope,
            uaa_host,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    let token = extract_bearer(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing bearer token");
        Error::Auth("Authorization header is invalid: missing".into())
    })?;
    let claims = state.verifier.verify(token)?;
    let context = AuthContext::from_claims(claims);
    debug!(client_id = %context.client_id, uaa_host = %context.uaa_host, "Authenticated");

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Fails with 403 unless the caller holds `scope`
pub fn require_scope(auth: &AuthContext, scope: &str) -> std::result::Result<(), ApiError> {
    if !auth.has_scope(scope) {
        warn!(client_id = %auth.client_id, scope, "Scope access denied");
        return Err(Error::Permissions(format!(
            "You are not authorized to perform the requested action: {} is required",
            scope
        ))
        .into());
    }
    Ok(())
}

/// Request id propagated from the router, or a fresh one
pub fn vcap_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-vcap-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
