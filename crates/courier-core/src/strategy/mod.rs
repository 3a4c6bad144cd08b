//! Audience strategies
//!
//! Each audience kind has an [`AudienceResolver`] that turns a target into a
//! recipient list plus an endorsement. [`AudienceStrategy`] pairs a resolver
//! with the [`Enqueuer`] to serve synchronous sends; the delivery worker uses
//! the same resolvers to expand campaigns.

mod email;
mod everyone;
mod organization;
mod scope;
mod space;
mod user;

pub use email::EmailResolver;
pub use everyone::EveryoneResolver;
pub use organization::OrganizationResolver;
pub use scope::ScopeResolver;
pub use space::SpaceResolver;
pub use user::UserResolver;

use crate::directory::{Directory, Organization, Space, TokenLoader};
use crate::dispatch::{Dispatch, Options, Recipient, Response};
use crate::enqueuer::{EnqueueRequest, Enqueuer};
use async_trait::async_trait;
use courier_common::types::{Audience, OrganizationRole};
use courier_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// What a resolver is asked to expand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub role: Option<OrganizationRole>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: Option<OrganizationRole>) -> Self {
        self.role = role;
        self
    }
}

/// Recipients and context produced by a resolver
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub recipients: Vec<Recipient>,
    pub endorsement: String,
    pub space: Option<Space>,
    pub organization: Option<Organization>,
    /// Scope or role string recorded on each message
    pub scope: Option<String>,
}

/// Expands one audience kind into recipients
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    fn audience(&self) -> Audience;

    async fn resolve(&self, target: &Target, uaa_host: &str) -> Result<Resolution>;
}

/// Turns a dispatch into per-recipient receipts
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn dispatch(&self, dispatch: Dispatch) -> Result<Vec<Response>>;
}

/// Resolve, then enqueue. No retry at this layer.
pub struct AudienceStrategy {
    resolver: Arc<dyn AudienceResolver>,
    enqueuer: Arc<Enqueuer>,
}

impl AudienceStrategy {
    pub fn new(resolver: Arc<dyn AudienceResolver>, enqueuer: Arc<Enqueuer>) -> Self {
        Self { resolver, enqueuer }
    }
}

#[async_trait]
impl Strategy for AudienceStrategy {
    async fn dispatch(&self, dispatch: Dispatch) -> Result<Vec<Response>> {
        let target = Target::new(dispatch.guid.clone()).with_role(dispatch.role);
        let resolution = self.resolver.resolve(&target, &dispatch.uaa_host).await?;

        info!(
            audience = %self.resolver.audience(),
            target = %dispatch.guid,
            client_id = %dispatch.client.id,
            recipients = resolution.recipients.len(),
            vcap_request_id = %dispatch.vcap_request_id,
            "Resolved audience"
        );

        let options = Options::from_dispatch(&dispatch, resolution.endorsement);
        self.enqueuer
            .enqueue(EnqueueRequest {
                recipients: resolution.recipients,
                options,
                space: resolution.space,
                organization: resolution.organization,
                client_id: dispatch.client.id,
                uaa_host: dispatch.uaa_host,
                scope: resolution.scope,
                vcap_request_id: dispatch.vcap_request_id,
                received_at: dispatch.received_at,
                campaign_id: None,
            })
            .await
    }
}

/// Strategies and resolvers keyed by audience
#[derive(Default)]
pub struct StrategyRegistry {
    resolvers: HashMap<Audience, Arc<dyn AudienceResolver>>,
    strategies: HashMap<Audience, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one resolver per audience kind
    pub fn standard(
        tokens: Arc<dyn TokenLoader>,
        directory: Arc<dyn Directory>,
        default_scopes: Vec<String>,
        enqueuer: Arc<Enqueuer>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UserResolver), enqueuer.clone());
        registry.register(Arc::new(EmailResolver), enqueuer.clone());
        registry.register(
            Arc::new(SpaceResolver::new(tokens.clone(), directory.clone())),
            enqueuer.clone(),
        );
        registry.register(
            Arc::new(OrganizationResolver::new(tokens.clone(), directory.clone())),
            enqueuer.clone(),
        );
        registry.register(
            Arc::new(ScopeResolver::new(
                tokens.clone(),
                directory.clone(),
                default_scopes,
            )),
            enqueuer.clone(),
        );
        registry.register(
            Arc::new(EveryoneResolver::new(tokens, directory)),
            enqueuer,
        );
        registry
    }

    /// Register a resolver and the strategy built on it
    pub fn register(&mut self, resolver: Arc<dyn AudienceResolver>, enqueuer: Arc<Enqueuer>) {
        let audience = resolver.audience();
        self.strategies.insert(
            audience,
            Arc::new(AudienceStrategy::new(resolver.clone(), enqueuer)),
        );
        self.resolvers.insert(audience, resolver);
    }

    pub fn strategy(&self, audience: Audience) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(&audience)
            .cloned()
            .ok_or_else(|| Error::Unknown(format!("No strategy registered for {}", audience)))
    }

    pub fn resolver(&self, audience: Audience) -> Result<Arc<dyn AudienceResolver>> {
        self.resolvers
            .get(&audience)
            .cloned()
            .ok_or_else(|| Error::Unknown(format!("No resolver registered for {}", audience)))
    }
}
