//! Shared fixtures for handler tests

use axum::http::HeaderValue;
use axum_test::TestServer;
use courier_core::services::{Repositories, ServiceSettings, Services};
use courier_core::testing::{FakeDirectory, FakeTokens, MemoryStore, RecordingMailer};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use std::sync::Arc;

use crate::auth::{Claims, TokenVerifier};
use crate::{create_router, AppState};

const SECRET: &[u8] = b"secret";

pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

pub fn harness(directory: FakeDirectory) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let settings = ServiceSettings {
        default_scopes: vec!["openid".into(), "cloud_controller.read".into()],
        ..Default::default()
    };
    let services = Services::build(
        Repositories::memory(store.clone()),
        Arc::new(FakeTokens::new()),
        Arc::new(directory),
        Arc::new(RecordingMailer::new()),
        settings,
    );
    let verifier = TokenVerifier::new(DecodingKey::from_secret(SECRET), Algorithm::HS256);
    let state = AppState::new(&services, verifier, None);
    let server = TestServer::new(create_router(state)).unwrap();

    Harness {
        server,
        store,
        services,
    }
}

/// Bearer header for the `notifications-sender` client
pub fn bearer(scopes: &[&str]) -> HeaderValue {
    bearer_for("notifications-sender", None, scopes)
}

pub fn bearer_for(client_id: &str, user_id: Option<&str>, scopes: &[&str]) -> HeaderValue {
    let claims = Claims {
        client_id: client_id.into(),
        user_id: user_id.map(str::to_string),
        scope: scopes.iter().map(|s| s.to_string()).collect(),
        iss: "https://uaa.example.com/oauth/token".into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap();
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}
