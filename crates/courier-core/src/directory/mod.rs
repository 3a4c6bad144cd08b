//! Identity directories: UAA (users, groups, emails) and the Cloud Controller
//! (spaces, organizations, memberships)

pub mod cloud_controller;
pub mod uaa;

use async_trait::async_trait;
use courier_common::types::OrganizationRole;
use courier_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use cloud_controller::CloudControllerClient;
pub use uaa::UaaClient;

/// Space metadata used for endorsements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

/// Organization metadata used for endorsements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub guid: String,
    pub name: String,
}

/// Supplies a bearer token for the given UAA host
#[async_trait]
pub trait TokenLoader: Send + Sync {
    async fn load(&self, uaa_host: &str) -> Result<String>;
}

/// Identity queries. Every call takes the bearer token to present.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn users_in_space(&self, token: &str, space_guid: &str) -> Result<Vec<String>>;

    /// Members of an organization, narrowed to a role when one is given
    async fn users_in_org(
        &self,
        token: &str,
        org_guid: &str,
        role: Option<OrganizationRole>,
    ) -> Result<Vec<String>>;

    async fn users_with_scope(&self, token: &str, scope: &str) -> Result<Vec<String>>;

    async fn all_users(&self, token: &str) -> Result<Vec<String>>;

    async fn space(&self, token: &str, guid: &str) -> Result<Space>;

    async fn organization(&self, token: &str, guid: &str) -> Result<Organization>;

    /// Primary email per user guid. Unknown guids are absent from the map;
    /// known users without an address map to `None`.
    async fn user_emails(
        &self,
        token: &str,
        guids: &[String],
    ) -> Result<HashMap<String, Option<String>>>;
}

/// Directory backed by a UAA and a Cloud Controller over HTTP
pub struct HttpDirectory {
    uaa: Arc<UaaClient>,
    cloud_controller: CloudControllerClient,
}

impl HttpDirectory {
    pub fn new(uaa: Arc<UaaClient>, cloud_controller: CloudControllerClient) -> Self {
        Self {
            uaa,
            cloud_controller,
        }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn users_in_space(&self, token: &str, space_guid: &str) -> Result<Vec<String>> {
        self.cloud_controller.users_in_space(token, space_guid).await
    }

    async fn users_in_org(
        &self,
        token: &str,
        org_guid: &str,
        role: Option<OrganizationRole>,
    ) -> Result<Vec<String>> {
        self.cloud_controller
            .users_in_org(token, org_guid, role)
            .await
    }

    async fn users_with_scope(&self, token: &str, scope: &str) -> Result<Vec<String>> {
        self.uaa.users_with_scope(token, scope).await
    }

    async fn all_users(&self, token: &str) -> Result<Vec<String>> {
        self.uaa.all_users(token).await
    }

    async fn space(&self, token: &str, guid: &str) -> Result<Space> {
        self.cloud_controller.space(token, guid).await
    }

    async fn organization(&self, token: &str, guid: &str) -> Result<Organization> {
        self.cloud_controller.organization(token, guid).await
    }

    async fn user_emails(
        &self,
        token: &str,
        guids: &[String],
    ) -> Result<HashMap<String, Option<String>>> {
        self.uaa.user_emails(token, guids).await
    }
}
