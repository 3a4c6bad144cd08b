//! Holders of a UAA scope

use super::{AudienceResolver, Resolution, Target};
use crate::directory::{Directory, TokenLoader};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

const ENDORSEMENT: &str = "You received this message because you have the {{.Scope}} scope.";

/// Refuses scopes every user holds before touching the directory
pub struct ScopeResolver {
    tokens: Arc<dyn TokenLoader>,
    directory: Arc<dyn Directory>,
    default_scopes: HashSet<String>,
}

impl ScopeResolver {
    pub fn new(
        tokens: Arc<dyn TokenLoader>,
        directory: Arc<dyn Directory>,
        default_scopes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            tokens,
            directory,
            default_scopes: default_scopes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AudienceResolver for ScopeResolver {
    fn audience(&self) -> Audience {
        Audience::Scope
    }

    async fn resolve(&self, target: &Target, uaa_host: &str) -> Result<Resolution> {
        if self.default_scopes.contains(&target.id) {
            warn!(scope = %target.id, "Refusing to send to a default scope");
            return Err(Error::DefaultScope(target.id.clone()));
        }

        let token = self.tokens.load(uaa_host).await?;
        let users = self.directory.users_with_scope(&token, &target.id).await?;

        Ok(Resolution {
            recipients: users.into_iter().map(Recipient::user).collect(),
            endorsement: ENDORSEMENT.to_string(),
            space: None,
            organization: None,
            scope: Some(target.id.clone()),
        })
    }
}
