//! Every UAA user

use super::{AudienceResolver, Resolution, Target};
use crate::directory::{Directory, TokenLoader};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::Result;
use std::sync::Arc;

const ENDORSEMENT: &str = "This message was sent to everyone.";

pub struct EveryoneResolver {
    tokens: Arc<dyn TokenLoader>,
    directory: Arc<dyn Directory>,
}

impl EveryoneResolver {
    pub fn new(tokens: Arc<dyn TokenLoader>, directory: Arc<dyn Directory>) -> Self {
        Self { tokens, directory }
    }
}

#[async_trait]
impl AudienceResolver for EveryoneResolver {
    fn audience(&self) -> Audience {
        Audience::Everyone
    }

    async fn resolve(&self, _target: &Target, uaa_host: &str) -> Result<Resolution> {
        let token = self.tokens.load(uaa_host).await?;
        let users = self.directory.all_users(&token).await?;

        Ok(Resolution {
            recipients: users.into_iter().map(Recipient::user).collect(),
            endorsement: ENDORSEMENT.to_string(),
            ..Default::default()
        })
    }
}
