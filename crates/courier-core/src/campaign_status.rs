//! Campaign progress, derived from message counts

use chrono::{DateTime, Utc};
use courier_common::types::CampaignId;
use courier_common::{Error, Result};
use courier_storage::repository::{CampaignRepository, MessageRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignLifecycle {
    Sending,
    Completed,
}

/// Snapshot of one campaign's delivery progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatus {
    pub id: CampaignId,
    pub status: CampaignLifecycle,
    pub total_messages: i64,
    pub sent_messages: i64,
    pub retry_messages: i64,
    pub failed_messages: i64,
    pub queued_messages: i64,
    pub undeliverable_messages: i64,
    pub start_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
}

/// Read-only view over campaigns and their messages
pub struct CampaignStatusAggregator {
    campaigns: Arc<dyn CampaignRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl CampaignStatusAggregator {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            campaigns,
            messages,
        }
    }

    /// A campaign is completed once every message is delivered or failed.
    /// Undeliverable messages keep it sending, as does an empty campaign.
    pub async fn get(&self, campaign_id: CampaignId, client_id: &str) -> Result<CampaignStatus> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .filter(|c| c.client_id == client_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Campaign with id {:?} could not be found",
                    campaign_id.to_string()
                ))
            })?;

        let counts = self
            .messages
            .count_by_campaign(campaign.id)
            .await
            .map_err(|e| Error::Unknown(format!("Failed to count campaign messages: {}", e)))?;

        let total = counts.total();
        let completed = total > 0 && counts.delivered + counts.failed == total;

        Ok(CampaignStatus {
            id: campaign.id,
            status: if completed {
                CampaignLifecycle::Completed
            } else {
                CampaignLifecycle::Sending
            },
            total_messages: total,
            sent_messages: counts.delivered,
            retry_messages: counts.retry,
            failed_messages: counts.failed,
            queued_messages: counts.queued,
            undeliverable_messages: counts.undeliverable,
            start_time: campaign.created_at,
            completed_time: if completed {
                counts.last_updated_at
            } else {
                None
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use courier_storage::models::{CreateCampaign, CreateMessage, MessageStatus};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    async fn campaign(store: &MemoryStore) -> CampaignId {
        let id = Uuid::now_v7();
        CampaignRepository::create(
            store,
            CreateCampaign {
                id,
                sender_id: "sender-1".into(),
                campaign_type_id: "type-1".into(),
                client_id: "notifications-sender".into(),
                audience: serde_json::json!({"space": "space-1"}),
                subject: "s".into(),
                text: "t".into(),
                html: String::new(),
                template_id: "tpl".into(),
                reply_to: None,
            },
        )
        .await
        .unwrap();
        id
    }

    async fn message(store: &MemoryStore, campaign_id: CampaignId, recipient: &str, status: MessageStatus) -> Uuid {
        MessageRepository::create(
            store,
            CreateMessage {
                id: Uuid::now_v7(),
                campaign_id: Some(campaign_id),
                recipient: recipient.into(),
                email: Some(format!("{}@example.com", recipient)),
                status,
                client_id: "notifications-sender".into(),
                kind_id: None,
                scope: None,
                vcap_request_id: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn aggregator(store: &Arc<MemoryStore>) -> CampaignStatusAggregator {
        CampaignStatusAggregator::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_counts_and_sending_state() {
        let store = Arc::new(MemoryStore::default());
        let id = campaign(&store).await;
        message(&store, id, "u1", MessageStatus::Delivered).await;
        message(&store, id, "u2", MessageStatus::Retry).await;
        message(&store, id, "u3", MessageStatus::Queued).await;
        message(&store, id, "u4", MessageStatus::NoAddress).await;
        message(&store, id, "u5", MessageStatus::Failed).await;

        let status = aggregator(&store).get(id, "notifications-sender").await.unwrap();
        assert_eq!(status.status, CampaignLifecycle::Sending);
        assert_eq!(status.total_messages, 5);
        assert_eq!(status.sent_messages, 1);
        assert_eq!(status.retry_messages, 1);
        assert_eq!(status.queued_messages, 1);
        assert_eq!(status.undeliverable_messages, 1);
        assert_eq!(status.failed_messages, 1);
        assert_eq!(status.completed_time, None);
    }

    #[tokio::test]
    async fn test_completed_once_all_delivered_or_failed() {
        let store = Arc::new(MemoryStore::default());
        let id = campaign(&store).await;
        message(&store, id, "u1", MessageStatus::Delivered).await;
        let pending = message(&store, id, "u2", MessageStatus::Retry).await;

        let aggregator = aggregator(&store);
        assert_eq!(
            aggregator.get(id, "notifications-sender").await.unwrap().status,
            CampaignLifecycle::Sending
        );

        MessageRepository::update_status(store.as_ref(), pending, MessageStatus::Failed)
            .await
            .unwrap();
        let status = aggregator.get(id, "notifications-sender").await.unwrap();
        assert_eq!(status.status, CampaignLifecycle::Completed);
        assert!(status.completed_time.is_some());
        assert_eq!(status.sent_messages + status.failed_messages, status.total_messages);
    }

    #[tokio::test]
    async fn test_empty_campaign_is_sending() {
        let store = Arc::new(MemoryStore::default());
        let id = campaign(&store).await;
        let status = aggregator(&store).get(id, "notifications-sender").await.unwrap();
        assert_eq!(status.status, CampaignLifecycle::Sending);
        assert_eq!(status.total_messages, 0);
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let store = Arc::new(MemoryStore::default());
        let id = campaign(&store).await;
        message(&store, id, "u1", MessageStatus::Delivered).await;
        let aggregator = aggregator(&store);

        let first = aggregator.get(id, "notifications-sender").await.unwrap();
        let second = aggregator.get(id, "notifications-sender").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_other_clients_campaign_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let id = campaign(&store).await;
        let aggregator = aggregator(&store);

        for (campaign_id, client) in [(id, "someone-else"), (Uuid::now_v7(), "notifications-sender")] {
            let err = aggregator.get(campaign_id, client).await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));
        }
    }
}
