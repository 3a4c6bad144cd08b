//! Campaign creation
//!
//! A campaign is validated and persisted on the request path; its audience
//! is resolved later by the delivery worker.

use crate::jobs::{encode, CampaignJob};
use courier_common::types::{Audience, CampaignId, EmailAddress};
use courier_common::{Error, Result};
use courier_storage::models::{Campaign, CreateCampaign, JobType};
use courier_storage::repository::{
    CampaignRepository, CampaignTypeRepository, JobQueue, SenderRepository, TemplateRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Campaign as submitted by a sender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub campaign_type_id: String,
    /// Exactly one of `user`, `email`, `emails`, `space`, `org`, `scope`, `everyone`
    pub audience: Value,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// Validate an audience map and split it into the audience kind and its
/// targets. `emails` may carry several addresses; `everyone` has a single
/// empty target.
pub fn parse_audience(audience: &Value) -> Result<(Audience, Vec<String>)> {
    let map = audience
        .as_object()
        .ok_or_else(|| Error::Validation("audience must be an object".into()))?;
    if map.len() != 1 {
        return Err(Error::Validation(
            "audience must name exactly one of user, email, emails, space, org, scope, everyone"
                .into(),
        ));
    }
    let Some((key, value)) = map.iter().next() else {
        return Err(Error::Validation("audience is empty".into()));
    };

    let single = |audience: Audience| -> Result<(Audience, Vec<String>)> {
        match value.as_str() {
            Some(id) if !id.trim().is_empty() => Ok((audience, vec![id.to_string()])),
            _ => Err(Error::Validation(format!(
                "audience {:?} must be a non-empty string",
                key
            ))),
        }
    };

    match key.as_str() {
        "user" => single(Audience::User),
        "space" => single(Audience::Space),
        "org" => single(Audience::Org),
        "scope" => single(Audience::Scope),
        "email" => {
            let (audience, targets) = single(Audience::Email)?;
            for target in &targets {
                target.parse::<EmailAddress>()?;
            }
            Ok((audience, targets))
        }
        "emails" => {
            let addresses = value
                .as_array()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    Error::Validation("audience \"emails\" must be a non-empty list".into())
                })?;
            let mut targets = Vec::with_capacity(addresses.len());
            for address in addresses {
                let address = address.as_str().ok_or_else(|| {
                    Error::Validation("audience \"emails\" must contain strings".into())
                })?;
                address.parse::<EmailAddress>()?;
                targets.push(address.to_string());
            }
            Ok((Audience::Email, targets))
        }
        "everyone" => match value.as_bool() {
            Some(true) => Ok((Audience::Everyone, vec![String::new()])),
            _ => Err(Error::Validation(
                "audience \"everyone\" must be true".into(),
            )),
        },
        other => Err(Error::Validation(format!("{} is not a valid audience", other))),
    }
}

/// Creates campaigns and hands them to the worker
pub struct CampaignsCollection {
    senders: Arc<dyn SenderRepository>,
    campaign_types: Arc<dyn CampaignTypeRepository>,
    templates: Arc<dyn TemplateRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    queue: Arc<dyn JobQueue>,
    default_scopes: Vec<String>,
}

impl CampaignsCollection {
    pub fn new(
        senders: Arc<dyn SenderRepository>,
        campaign_types: Arc<dyn CampaignTypeRepository>,
        templates: Arc<dyn TemplateRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            senders,
            campaign_types,
            templates,
            campaigns,
            queue,
            default_scopes: Vec::new(),
        }
    }

    /// Scopes every token carries; campaigns may not target them
    pub fn with_default_scopes(mut self, default_scopes: Vec<String>) -> Self {
        self.default_scopes = default_scopes;
        self
    }

    pub async fn create(
        &self,
        sender_id: &str,
        new: NewCampaign,
        client_id: &str,
        has_critical_scope: bool,
        uaa_host: &str,
    ) -> Result<Campaign> {
        let sender = self
            .senders
            .get(sender_id)
            .await?
            .filter(|s| s.client_id == client_id)
            .ok_or_else(|| Error::NotFound(format!("Sender with id {:?} could not be found", sender_id)))?;

        let campaign_type = self
            .campaign_types
            .get(&new.campaign_type_id)
            .await?
            .filter(|t| t.sender_id == sender.id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Campaign type with id {:?} could not be found",
                    new.campaign_type_id
                ))
            })?;

        let template_id = new
            .template_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| campaign_type.template_id.clone())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Campaign type {:?} has no template and none was given",
                    campaign_type.id
                ))
            })?;
        if self.templates.get(&template_id).await?.is_none() {
            return Err(Error::NotFound(format!(
                "Template with id {:?} could not be found",
                template_id
            )));
        }

        if campaign_type.critical && !has_critical_scope {
            return Err(Error::Permissions(
                "Scope critical_notifications.write is required".into(),
            ));
        }

        let (audience, targets) = parse_audience(&new.audience)?;
        if audience == Audience::Scope {
            if let Some(scope) = targets.iter().find(|t| self.default_scopes.contains(t)) {
                return Err(Error::DefaultScope(scope.clone()));
            }
        }
        if new.text.is_empty() && new.html.is_empty() {
            return Err(Error::Validation("missing either campaign text or html".into()));
        }

        let id: CampaignId = Uuid::now_v7();
        let campaign = self
            .campaigns
            .create(CreateCampaign {
                id,
                sender_id: sender.id.clone(),
                campaign_type_id: campaign_type.id.clone(),
                client_id: client_id.to_string(),
                audience: new.audience,
                subject: new.subject,
                text: new.text,
                html: new.html,
                template_id,
                reply_to: new.reply_to,
            })
            .await?;

        let job = CampaignJob {
            campaign: campaign.clone(),
            critical: campaign_type.critical,
            campaign_type_name: campaign_type.name,
            sender_name: sender.name,
            uaa_host: uaa_host.to_string(),
        };
        let queued = match encode(&job) {
            Ok(payload) => self.queue.enqueue(JobType::Campaign, payload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = queued {
            // An unqueued campaign would report "sending" forever.
            if let Err(cleanup) = self.campaigns.delete(campaign.id).await {
                warn!(campaign_id = %campaign.id, error = %cleanup, "Failed to remove unqueued campaign");
            }
            return Err(match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            });
        }

        info!(
            campaign_id = %campaign.id,
            sender_id = %campaign.sender_id,
            client_id,
            "Campaign created"
        );
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobPayload;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store
            .add_sender("sender-1", "Ops Team", "notifications-sender")
            .await;
        store
            .add_campaign_type(
                "type-1",
                "sender-1",
                false,
                Some("campaign-type-template-id"),
            )
            .await;
        store.add_campaign_type("type-critical", "sender-1", true, None).await;
        store
            .add_template("campaign-type-template-id", "{{.Subject}}")
            .await;
        store
    }

    fn collection(store: &Arc<MemoryStore>) -> CampaignsCollection {
        CampaignsCollection::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )
        .with_default_scopes(vec!["openid".into(), "cloud_controller.read".into()])
    }

    fn campaign(audience: Value) -> NewCampaign {
        NewCampaign {
            campaign_type_id: "type-1".into(),
            audience,
            subject: "subject".into(),
            text: "text".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_audience() {
        assert_eq!(
            parse_audience(&json!({"user": "some-guid"})).unwrap(),
            (Audience::User, vec!["some-guid".to_string()])
        );
        assert_eq!(
            parse_audience(&json!({"emails": ["a@example.com", "b@example.com"]})).unwrap().1,
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert_eq!(
            parse_audience(&json!({"everyone": true})).unwrap().0,
            Audience::Everyone
        );

        for bad in [
            json!({}),
            json!({"user": "a", "space": "b"}),
            json!({"team": "x"}),
            json!({"user": ""}),
            json!({"email": "not-an-address"}),
            json!({"everyone": false}),
            json!(["user"]),
        ] {
            assert!(matches!(parse_audience(&bad), Err(Error::Validation(_))), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_template_inherited_from_campaign_type() {
        let store = store().await;
        let created = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"user": "some-guid"})),
                "notifications-sender",
                false,
                "https://uaa.example.com",
            )
            .await
            .unwrap();
        assert_eq!(created.template_id, "campaign-type-template-id");

        let jobs = store.jobs_of_type(JobType::Campaign).await;
        assert_eq!(jobs.len(), 1);
        match JobPayload::decode(&jobs[0]).unwrap() {
            JobPayload::Campaign(job) => {
                assert_eq!(job.campaign.id, created.id);
                assert_eq!(job.campaign.template_id, "campaign-type-template-id");
                assert_eq!(job.sender_name, "Ops Team");
                assert_eq!(job.uaa_host, "https://uaa.example.com");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sender_of_other_client_is_not_found() {
        let store = store().await;
        let err = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"user": "some-guid"})),
                "someone-else",
                false,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_template_is_not_found() {
        let store = store().await;
        let mut new = campaign(json!({"user": "some-guid"}));
        new.template_id = Some("nope".into());
        let err = collection(&store)
            .create("sender-1", new, "notifications-sender", false, "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.jobs_of_type(JobType::Campaign).await.is_empty());
    }

    #[tokio::test]
    async fn test_critical_type_requires_scope() {
        let store = store().await;
        let mut new = campaign(json!({"user": "some-guid"}));
        new.campaign_type_id = "type-critical".into();
        new.template_id = Some("campaign-type-template-id".into());

        let err = collection(&store)
            .create("sender-1", new.clone(), "notifications-sender", false, "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permissions(_)));

        collection(&store)
            .create("sender-1", new, "notifications-sender", true, "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_audience_rejected() {
        let store = store().await;
        let err = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"user": "a", "org": "b"})),
                "notifications-sender",
                false,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_queue_failure_is_persistence_error() {
        let store = store().await;
        store.fail_queue(true);
        let err = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"user": "some-guid"})),
                "notifications-sender",
                false,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn test_queue_failure_leaves_no_campaign() {
        let store = store().await;
        store.fail_queue(true);

        let err = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"user": "some-guid"})),
                "notifications-sender",
                false,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(store.campaign_count().await, 0);
        assert!(store.jobs_of_type(JobType::Campaign).await.is_empty());
    }

    #[tokio::test]
    async fn test_default_scope_audience_is_rejected_up_front() {
        let store = store().await;

        let err = collection(&store)
            .create(
                "sender-1",
                campaign(json!({"scope": "cloud_controller.read"})),
                "notifications-sender",
                false,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DefaultScope(ref s) if s == "cloud_controller.read"));
        assert_eq!(store.campaign_count().await, 0);
        assert!(store.jobs_of_type(JobType::Campaign).await.is_empty());

        collection(&store)
            .create(
                "sender-1",
                campaign(json!({"scope": "cloud_controller.admin"})),
                "notifications-sender",
                false,
                "",
            )
            .await
            .unwrap();
        assert_eq!(store.campaign_count().await, 1);
    }
}
