//! Campaign expansion: audience resolution deferred to the worker

use crate::campaigns::parse_audience;
use crate::dispatch::{Html, Options};
use crate::enqueuer::{EnqueueRequest, Enqueuer};
use crate::jobs::CampaignJob;
use crate::strategy::{StrategyRegistry, Target};
use courier_common::Result;
use std::sync::Arc;
use tracing::info;

/// Resolves a campaign's audience and enqueues one message per recipient
pub struct CampaignExpander {
    registry: Arc<StrategyRegistry>,
    enqueuer: Arc<Enqueuer>,
}

impl CampaignExpander {
    pub fn new(registry: Arc<StrategyRegistry>, enqueuer: Arc<Enqueuer>) -> Self {
        Self { registry, enqueuer }
    }

    /// Returns the number of messages recorded. Re-running a campaign reuses
    /// messages already recorded for the same recipient.
    pub async fn expand(&self, job: &CampaignJob) -> Result<usize> {
        let campaign = &job.campaign;
        let (audience, targets) = parse_audience(&campaign.audience)?;
        let resolver = self.registry.resolver(audience)?;

        let mut recorded = 0;
        for target in targets {
            let resolution = resolver
                .resolve(&Target::new(target), &job.uaa_host)
                .await?;

            let options = Options {
                to: None,
                reply_to: campaign.reply_to.clone(),
                subject: campaign.subject.clone(),
                text: campaign.text.clone(),
                html: Html {
                    body_content: campaign.html.clone(),
                    ..Default::default()
                },
                kind_id: Some(campaign.campaign_type_id.clone()),
                kind_description: job.campaign_type_name.clone(),
                source_description: job.sender_name.clone(),
                critical: job.critical,
                role: None,
                endorsement: resolution.endorsement,
                template_id: Some(campaign.template_id.clone()),
            };

            let responses = self
                .enqueuer
                .enqueue(EnqueueRequest {
                    recipients: resolution.recipients,
                    options,
                    space: resolution.space,
                    organization: resolution.organization,
                    client_id: campaign.client_id.clone(),
                    uaa_host: job.uaa_host.clone(),
                    scope: resolution.scope,
                    vcap_request_id: campaign.id.to_string(),
                    received_at: campaign.created_at,
                    campaign_id: Some(campaign.id),
                })
                .await?;
            recorded += responses.len();
        }

        info!(
            campaign_id = %campaign.id,
            audience = %audience,
            messages = recorded,
            "Expanded campaign"
        );
        Ok(recorded)
    }
}
