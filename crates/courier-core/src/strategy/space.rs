//! Members of a space

use super::{AudienceResolver, Resolution, Target};
use crate::directory::{Directory, TokenLoader};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::Result;
use std::sync::Arc;

const ENDORSEMENT: &str = "You received this message because you belong to the \"{{.Space}}\" space in the \"{{.Organization}}\" organization.";

pub struct SpaceResolver {
    tokens: Arc<dyn TokenLoader>,
    directory: Arc<dyn Directory>,
}

impl SpaceResolver {
    pub fn new(tokens: Arc<dyn TokenLoader>, directory: Arc<dyn Directory>) -> Self {
        Self { tokens, directory }
    }
}

#[async_trait]
impl AudienceResolver for SpaceResolver {
    fn audience(&self) -> Audience {
        Audience::Space
    }

    async fn resolve(&self, target: &Target, uaa_host: &str) -> Result<Resolution> {
        let token = self.tokens.load(uaa_host).await?;

        let space = self.directory.space(&token, &target.id).await?;
        let organization = self
            .directory
            .organization(&token, &space.organization_guid)
            .await?;
        let users = self.directory.users_in_space(&token, &target.id).await?;

        Ok(Resolution {
            recipients: users.into_iter().map(Recipient::user).collect(),
            endorsement: ENDORSEMENT.to_string(),
            space: Some(space),
            organization: Some(organization),
            scope: None,
        })
    }
}
