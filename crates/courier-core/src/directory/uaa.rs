//! UAA client: client_credentials tokens, scope membership, users and emails

use super::TokenLoader;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::config::UaaConfig;
use courier_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Users requested per `/Users` page
const USERS_PAGE_SIZE: usize = 500;

/// Guids per `/Users?filter=` request when looking up emails
const EMAIL_LOOKUP_CHUNK: usize = 50;

/// Tokens are refreshed this long before UAA says they expire
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    resources: Vec<Group>,
}

#[derive(Debug, Deserialize)]
struct Group {
    #[serde(default)]
    members: Vec<GroupMember>,
}

#[derive(Debug, Deserialize)]
struct GroupMember {
    value: String,
    #[serde(rename = "type", default)]
    member_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserList {
    #[serde(default)]
    resources: Vec<UaaUser>,
    #[serde(default)]
    total_results: usize,
}

#[derive(Debug, Deserialize)]
struct UaaUser {
    id: String,
    #[serde(default)]
    emails: Vec<UaaEmail>,
}

#[derive(Debug, Deserialize)]
struct UaaEmail {
    value: String,
    #[serde(default)]
    primary: bool,
}

impl UaaUser {
    fn primary_email(&self) -> Option<String> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.emails.first())
            .map(|e| e.value.clone())
            .filter(|v| !v.is_empty())
    }
}

/// UAA HTTP client
pub struct UaaClient {
    url: String,
    client_id: String,
    client_secret: String,
    client: Client,
    tokens: RwLock<HashMap<String, CachedToken>>,
}

impl UaaClient {
    /// Create a new UAA client
    pub fn new(config: &UaaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            client,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    fn build_request(&self, token: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.url, path))
            .bearer_auth(token)
    }

    async fn fetch_token(&self, base: &str) -> Result<CachedToken> {
        let response = self
            .client
            .post(format!("{}/oauth/token", base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::Directory(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "UAA token request rejected");
            return Err(Error::Directory(format!(
                "Token request failed: {} {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Directory(format!("Invalid token response: {}", e)))?;

        let lifetime = (token.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }

    /// Members of the UAA group named after `scope`
    pub async fn users_with_scope(&self, token: &str, scope: &str) -> Result<Vec<String>> {
        let response = self
            .build_request(token, "/Groups")
            .query(&[("filter", format!("displayName eq \"{}\"", scope))])
            .send()
            .await
            .map_err(|e| Error::Directory(format!("Group lookup failed: {}", e)))?;

        let groups: GroupList = read_json(response, "Group lookup").await?;

        Ok(groups
            .resources
            .into_iter()
            .flat_map(|g| g.members)
            .filter(|m| m.member_type.as_deref().map_or(true, |t| t == "USER"))
            .map(|m| m.value)
            .collect())
    }

    /// Every user guid, following UAA pagination
    pub async fn all_users(&self, token: &str) -> Result<Vec<String>> {
        let mut guids = Vec::new();
        let mut start_index = 1;

        loop {
            let response = self
                .build_request(token, "/Users")
                .query(&[
                    ("attributes", "id".to_string()),
                    ("startIndex", start_index.to_string()),
                    ("count", USERS_PAGE_SIZE.to_string()),
                ])
                .send()
                .await
                .map_err(|e| Error::Directory(format!("User listing failed: {}", e)))?;

            let page: UserList = read_json(response, "User listing").await?;
            let fetched = page.resources.len();
            guids.extend(page.resources.into_iter().map(|u| u.id));

            if fetched == 0 || guids.len() >= page.total_results {
                break;
            }
            start_index += fetched;
        }

        debug!(count = guids.len(), "Loaded all UAA users");
        Ok(guids)
    }

    /// Primary email of each guid; unknown guids are left out
    pub async fn user_emails(
        &self,
        token: &str,
        guids: &[String],
    ) -> Result<HashMap<String, Option<String>>> {
        let mut emails = HashMap::with_capacity(guids.len());

        for chunk in guids.chunks(EMAIL_LOOKUP_CHUNK) {
            let filter = chunk
                .iter()
                .map(|g| format!("id eq \"{}\"", g))
                .collect::<Vec<_>>()
                .join(" or ");

            let response = self
                .build_request(token, "/Users")
                .query(&[
                    ("filter", filter),
                    ("attributes", "id,emails".to_string()),
                    ("count", chunk.len().to_string()),
                ])
                .send()
                .await
                .map_err(|e| Error::Directory(format!("Email lookup failed: {}", e)))?;

            let page: UserList = read_json(response, "Email lookup").await?;
            for user in page.resources {
                let email = user.primary_email();
                emails.insert(user.id, email);
            }
        }

        Ok(emails)
    }
}

#[async_trait]
impl TokenLoader for UaaClient {
    async fn load(&self, uaa_host: &str) -> Result<String> {
        let base = if uaa_host.is_empty() {
            self.url.clone()
        } else {
            uaa_host.trim_end_matches('/').to_string()
        };

        if let Some(cached) = self.tokens.read().await.get(&base) {
            if cached.expires_at > Utc::now() {
                return Ok(cached.value.clone());
            }
        }

        let token = self.fetch_token(&base).await?;
        let value = token.value.clone();
        self.tokens.write().await.insert(base, token);
        Ok(value)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Directory(format!("{} failed: {} {}", what, status, body)));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Directory(format!("{} returned invalid JSON: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UaaClient {
        UaaClient::new(&UaaConfig {
            url: server.uri(),
            client_id: "notifications".into(),
            client_secret: "secret".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_is_cached_per_host() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "the-token",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.load(&server.uri()).await.unwrap(), "the-token");
        assert_eq!(client.load(&server.uri()).await.unwrap(), "the-token");
    }

    #[tokio::test]
    async fn test_token_failure_is_directory_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.load("").await.unwrap_err();
        assert!(matches!(err, Error::Directory(_)));
    }

    #[tokio::test]
    async fn test_users_with_scope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Groups"))
            .and(query_param("filter", "displayName eq \"cloud_controller.admin\""))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [{
                    "displayName": "cloud_controller.admin",
                    "members": [
                        {"value": "user-1", "type": "USER"},
                        {"value": "group-9", "type": "GROUP"},
                        {"value": "user-2", "type": "USER"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let users = client_for(&server)
            .users_with_scope("tok", "cloud_controller.admin")
            .await
            .unwrap();
        assert_eq!(users, vec!["user-1".to_string(), "user-2".to_string()]);
    }

    #[tokio::test]
    async fn test_all_users_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(query_param("startIndex", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [{"id": "user-1"}, {"id": "user-2"}],
                "totalResults": 3
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(query_param("startIndex", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [{"id": "user-3"}],
                "totalResults": 3
            })))
            .mount(&server)
            .await;

        let users = client_for(&server).all_users("tok").await.unwrap();
        assert_eq!(users, vec!["user-1", "user-2", "user-3"]);
    }

    #[tokio::test]
    async fn test_user_emails_distinguishes_missing_and_addressless() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(query_param(
                "filter",
                "id eq \"user-1\" or id eq \"user-2\" or id eq \"ghost\"",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [
                    {"id": "user-1", "emails": [
                        {"value": "alt@example.com", "primary": false},
                        {"value": "user-1@example.com", "primary": true}
                    ]},
                    {"id": "user-2", "emails": []}
                ],
                "totalResults": 2
            })))
            .mount(&server)
            .await;

        let guids = vec!["user-1".to_string(), "user-2".to_string(), "ghost".to_string()];
        let emails = client_for(&server).user_emails("tok", &guids).await.unwrap();

        assert_eq!(emails.get("user-1"), Some(&Some("user-1@example.com".to_string())));
        assert_eq!(emails.get("user-2"), Some(&None));
        assert_eq!(emails.get("ghost"), None);
    }
}
