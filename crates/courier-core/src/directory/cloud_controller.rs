//! Cloud Controller v2 client: spaces, organizations and their members

use super::{Organization, Space};
use courier_common::config::CloudControllerConfig;
use courier_common::types::OrganizationRole;
use courier_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const RESULTS_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    next_url: Option<String>,
    #[serde(default)]
    resources: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct Resource<E> {
    metadata: Metadata,
    entity: E,
}

#[derive(Debug, Deserialize)]
struct MemberEntity {}

#[derive(Debug, Deserialize)]
struct SpaceEntity {
    name: String,
    organization_guid: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationEntity {
    name: String,
}

/// Cloud Controller HTTP client
pub struct CloudControllerClient {
    url: String,
    client: Client,
}

impl CloudControllerClient {
    /// Create a new Cloud Controller client
    pub fn new(config: &CloudControllerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, path: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.url, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Directory(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{} not found", what)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Directory(format!("{} failed: {} {}", what, status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Directory(format!("{} returned invalid JSON: {}", what, e)))
    }

    /// Collect member guids across every page starting at `path`
    async fn members(&self, token: &str, path: String, what: &str) -> Result<Vec<String>> {
        let mut guids = Vec::new();
        let mut next = Some(format!("{}?results-per-page={}", path, RESULTS_PER_PAGE));

        while let Some(path) = next {
            let page: Page<Resource<MemberEntity>> = self.get(token, &path, what).await?;
            guids.extend(page.resources.into_iter().map(|r| r.metadata.guid));
            next = page.next_url;
        }

        debug!(count = guids.len(), what, "Loaded members");
        Ok(guids)
    }

    pub async fn users_in_space(&self, token: &str, space_guid: &str) -> Result<Vec<String>> {
        self.members(token, format!("/v2/spaces/{}/users", space_guid), "Space")
            .await
    }

    pub async fn users_in_org(
        &self,
        token: &str,
        org_guid: &str,
        role: Option<OrganizationRole>,
    ) -> Result<Vec<String>> {
        let collection = match role {
            None => "users",
            Some(OrganizationRole::OrgManager) => "managers",
            Some(OrganizationRole::OrgAuditor) => "auditors",
            Some(OrganizationRole::BillingManager) => "billing_managers",
        };
        self.members(
            token,
            format!("/v2/organizations/{}/{}", org_guid, collection),
            "Organization",
        )
        .await
    }

    pub async fn space(&self, token: &str, guid: &str) -> Result<Space> {
        let resource: Resource<SpaceEntity> = self
            .get(token, &format!("/v2/spaces/{}", guid), "Space")
            .await?;
        Ok(Space {
            guid: resource.metadata.guid,
            name: resource.entity.name,
            organization_guid: resource.entity.organization_guid,
        })
    }

    pub async fn organization(&self, token: &str, guid: &str) -> Result<Organization> {
        let resource: Resource<OrganizationEntity> = self
            .get(token, &format!("/v2/organizations/{}", guid), "Organization")
            .await?;
        Ok(Organization {
            guid: resource.metadata.guid,
            name: resource.entity.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CloudControllerClient {
        CloudControllerClient::new(&CloudControllerConfig {
            url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn member(guid: &str) -> serde_json::Value {
        json!({"metadata": {"guid": guid}, "entity": {"username": guid}})
    }

    #[tokio::test]
    async fn test_space_users_follow_next_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-1/users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next_url": null,
                "resources": [member("user-3")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-1/users"))
            .and(query_param("results-per-page", "100"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next_url": "/v2/spaces/space-1/users?page=2",
                "resources": [member("user-1"), member("user-2")]
            })))
            .mount(&server)
            .await;

        let users = client_for(&server)
            .users_in_space("tok", "space-1")
            .await
            .unwrap();
        assert_eq!(users, vec!["user-1", "user-2", "user-3"]);
    }

    #[tokio::test]
    async fn test_page_without_resources_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/organizations/org-empty/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"next_url": null})))
            .mount(&server)
            .await;

        let users = client_for(&server)
            .users_in_org("tok", "org-empty", None)
            .await
            .unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_org_role_selects_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/organizations/org-123/managers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next_url": null,
                "resources": [member("user-456")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let users = client_for(&server)
            .users_in_org("tok", "org-123", Some(OrganizationRole::OrgManager))
            .await
            .unwrap();
        assert_eq!(users, vec!["user-456"]);
    }

    #[tokio::test]
    async fn test_space_metadata_and_missing_org() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/spaces/space-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"guid": "space-1"},
                "entity": {"name": "production", "organization_guid": "org-1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/organizations/org-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let space = client.space("tok", "space-1").await.unwrap();
        assert_eq!(space.name, "production");
        assert_eq!(space.organization_guid, "org-1");

        let err = client.organization("tok", "org-1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_directory_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/organizations/org-1/users"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .users_in_org("tok", "org-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Directory(_)));
    }
}
