//! Persists one message per recipient and submits its delivery job

use crate::directory::{Directory, Organization, Space, TokenLoader};
use crate::dispatch::{Options, Recipient, Response};
use crate::jobs::{encode, DeliveryJob};
use crate::preferences::PreferenceFilter;
use chrono::{DateTime, Utc};
use courier_common::types::CampaignId;
use courier_common::{Error, Result};
use courier_storage::models::{CreateMessage, JobType, MessageStatus};
use courier_storage::repository::{JobQueue, MessageRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the enqueuer needs for one resolved dispatch
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub recipients: Vec<Recipient>,
    pub options: Options,
    pub space: Option<Space>,
    pub organization: Option<Organization>,
    pub client_id: String,
    pub uaa_host: String,
    pub scope: Option<String>,
    pub vcap_request_id: String,
    pub received_at: DateTime<Utc>,
    pub campaign_id: Option<CampaignId>,
}

/// Turns recipients into message rows and delivery jobs
pub struct Enqueuer {
    messages: Arc<dyn MessageRepository>,
    queue: Arc<dyn JobQueue>,
    filter: PreferenceFilter,
    tokens: Arc<dyn TokenLoader>,
    directory: Arc<dyn Directory>,
}

impl Enqueuer {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        queue: Arc<dyn JobQueue>,
        filter: PreferenceFilter,
        tokens: Arc<dyn TokenLoader>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            messages,
            queue,
            filter,
            tokens,
            directory,
        }
    }

    /// Returns exactly one receipt per recipient. Address lookup, persistence
    /// and queue failures abort the whole call.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Vec<Response>> {
        let addresses = self.lookup_addresses(&request).await?;
        let mut responses = Vec::with_capacity(request.recipients.len());

        for recipient in &request.recipients {
            responses.push(self.enqueue_one(&request, recipient, &addresses).await?);
        }

        info!(
            client_id = %request.client_id,
            campaign_id = ?request.campaign_id,
            messages = responses.len(),
            vcap_request_id = %request.vcap_request_id,
            "Enqueued messages"
        );
        Ok(responses)
    }

    /// One batch lookup for every guid recipient
    async fn lookup_addresses(
        &self,
        request: &EnqueueRequest,
    ) -> Result<HashMap<String, Option<String>>> {
        let guids: Vec<String> = request
            .recipients
            .iter()
            .filter_map(|r| r.guid.clone())
            .collect();
        if guids.is_empty() {
            return Ok(HashMap::new());
        }

        let token = self
            .tokens
            .load(&request.uaa_host)
            .await
            .map_err(|e| Error::Unknown(format!("Failed to load token: {}", e)))?;
        self.directory
            .user_emails(&token, &guids)
            .await
            .map_err(|e| Error::Unknown(format!("Failed to look up user emails: {}", e)))
    }

    async fn enqueue_one(
        &self,
        request: &EnqueueRequest,
        recipient: &Recipient,
        addresses: &HashMap<String, Option<String>>,
    ) -> Result<Response> {
        let id = Uuid::now_v7();

        let deliver = match &recipient.guid {
            Some(guid) => {
                self.filter
                    .should_deliver(
                        guid,
                        &request.client_id,
                        request.options.kind_id.as_deref(),
                        request.options.critical,
                    )
                    .await?
            }
            None => true,
        };

        let (status, email) = if !deliver {
            (MessageStatus::Undeliverable, None)
        } else {
            match &recipient.guid {
                Some(guid) => match addresses.get(guid) {
                    None => (MessageStatus::NotFound, None),
                    Some(None) => (MessageStatus::NoAddress, None),
                    Some(Some(address)) => (MessageStatus::Queued, Some(address.clone())),
                },
                None => (MessageStatus::Queued, recipient.email.clone()),
            }
        };

        let message = self
            .messages
            .create(CreateMessage {
                id,
                campaign_id: request.campaign_id,
                recipient: recipient.identifier().to_string(),
                email: email.clone(),
                status,
                client_id: request.client_id.clone(),
                kind_id: request.options.kind_id.clone(),
                scope: request.scope.clone(),
                vcap_request_id: Some(request.vcap_request_id.clone()),
            })
            .await?;

        let existing = message.id != id;
        let current = message.status();
        if existing {
            debug!(message_id = %message.id, status = %current, "Message already recorded");
        }

        if !current.is_terminal() {
            let address = message.email.clone().or(email).unwrap_or_default();
            if let Err(e) = self.submit(request, recipient, message.id, address).await {
                // A queued row without a job would never settle.
                if !existing {
                    if let Err(cleanup) = self.messages.delete(message.id).await {
                        warn!(message_id = %message.id, error = %cleanup, "Failed to remove unsubmitted message");
                    }
                }
                return Err(e);
            }
        }

        // Suppressed sends still report queued to the caller.
        let reported = if !deliver && !existing {
            MessageStatus::Queued
        } else {
            current
        };

        Ok(Response {
            status: reported.to_string(),
            recipient: recipient.identifier().to_string(),
            notification_id: message.id,
            vcap_request_id: request.vcap_request_id.clone(),
        })
    }

    async fn submit(
        &self,
        request: &EnqueueRequest,
        recipient: &Recipient,
        message_id: Uuid,
        email: String,
    ) -> Result<()> {
        let job = DeliveryJob {
            message_id,
            recipient: recipient.clone(),
            email,
            options: request.options.clone(),
            space: request.space.clone(),
            organization: request.organization.clone(),
            client_id: request.client_id.clone(),
            uaa_host: request.uaa_host.clone(),
            scope: request.scope.clone(),
            vcap_request_id: request.vcap_request_id.clone(),
            received_at: request.received_at,
            campaign_id: request.campaign_id,
        };

        self.queue
            .enqueue(JobType::Delivery, encode(&job)?)
            .await
            .map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, FakeTokens, MemoryStore};
    use courier_storage::repository::PreferenceRepository;
    use pretty_assertions::assert_eq;

    fn request(recipients: Vec<Recipient>) -> EnqueueRequest {
        EnqueueRequest {
            recipients,
            options: Options {
                subject: "my-special-subject".into(),
                text: "hello".into(),
                kind_id: Some("acceptance-test".into()),
                ..Default::default()
            },
            space: None,
            organization: None,
            client_id: "notifications-sender".into(),
            uaa_host: String::new(),
            scope: None,
            vcap_request_id: "req-1".into(),
            received_at: Utc::now(),
            campaign_id: None,
        }
    }

    fn enqueuer(store: &Arc<MemoryStore>, directory: FakeDirectory) -> Enqueuer {
        Enqueuer::new(
            store.clone(),
            store.clone(),
            PreferenceFilter::new(store.clone()),
            Arc::new(FakeTokens::new()),
            Arc::new(directory),
        )
    }

    #[tokio::test]
    async fn test_one_response_per_recipient_with_address_outcomes() {
        let store = Arc::new(MemoryStore::default());
        let directory = FakeDirectory::default()
            .with_email("user-1", Some("user-1@example.com"))
            .with_email("user-2", None);
        let recipients = vec![
            Recipient::user("user-1"),
            Recipient::user("user-2"),
            Recipient::user("ghost"),
            Recipient::email("direct@example.com"),
        ];

        let responses = enqueuer(&store, directory)
            .enqueue(request(recipients.clone()))
            .await
            .unwrap();

        assert_eq!(responses.len(), recipients.len());
        let statuses: Vec<&str> = responses.iter().map(|r| r.status.as_str()).collect();
        assert_eq!(statuses, vec!["queued", "noaddress", "notfound", "queued"]);
        assert_eq!(responses[3].recipient, "direct@example.com");
        assert!(responses.iter().all(|r| r.vcap_request_id == "req-1"));
        assert_eq!(store.jobs_of_type(JobType::Delivery).await.len(), 2);
        assert_eq!(store.message_count().await, 4);
    }

    #[tokio::test]
    async fn test_unsubscribed_user_is_recorded_but_not_queued() {
        let store = Arc::new(MemoryStore::default());
        store.add_kind("notifications-sender", "acceptance-test", false).await;
        store
            .upsert("user-1", "notifications-sender", "acceptance-test", false)
            .await
            .unwrap();
        let directory = FakeDirectory::default().with_email("user-1", Some("user-1@example.com"));

        let responses = enqueuer(&store, directory)
            .enqueue(request(vec![Recipient::user("user-1")]))
            .await
            .unwrap();

        assert_eq!(responses[0].status, "queued");
        let message = store.message(responses[0].notification_id).await.unwrap();
        assert_eq!(message.status(), MessageStatus::Undeliverable);
        assert!(store.jobs_of_type(JobType::Delivery).await.is_empty());
    }

    #[tokio::test]
    async fn test_critical_kind_bypasses_global_unsubscribe() {
        let store = Arc::new(MemoryStore::default());
        store.set_global_unsubscribe("user-1", true).await.unwrap();
        let directory = FakeDirectory::default().with_email("user-1", Some("user-1@example.com"));
        let mut req = request(vec![Recipient::user("user-1")]);
        req.options.critical = true;

        let responses = enqueuer(&store, directory).enqueue(req).await.unwrap();
        let message = store.message(responses[0].notification_id).await.unwrap();
        assert_eq!(message.status(), MessageStatus::Queued);
        assert_eq!(store.jobs_of_type(JobType::Delivery).await.len(), 1);
    }

    #[tokio::test]
    async fn test_address_lookup_failure_is_fatal() {
        let store = Arc::new(MemoryStore::default());
        let directory = FakeDirectory::default().failing_emails();

        let err = enqueuer(&store, directory)
            .enqueue(request(vec![Recipient::user("user-1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unknown(_)));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_queue_failure_is_persistence_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_queue(true);

        let err = enqueuer(&store, FakeDirectory::default())
            .enqueue(request(vec![Recipient::email("direct@example.com")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn test_queue_failure_leaves_no_messages() {
        let store = Arc::new(MemoryStore::default());
        store.fail_queue(true);

        let err = enqueuer(&store, FakeDirectory::default())
            .enqueue(request(vec![
                Recipient::email("a@example.com"),
                Recipient::email("b@example.com"),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(store.message_count().await, 0);
        assert!(store.jobs_of_type(JobType::Delivery).await.is_empty());
    }

    #[tokio::test]
    async fn test_campaign_reexpansion_reuses_message() {
        let store = Arc::new(MemoryStore::default());
        let directory = FakeDirectory::default().with_email("user-1", Some("user-1@example.com"));
        let enqueuer = enqueuer(&store, directory);
        let mut req = request(vec![Recipient::user("user-1")]);
        req.campaign_id = Some(Uuid::now_v7());

        let first = enqueuer.enqueue(req.clone()).await.unwrap();
        let second = enqueuer.enqueue(req).await.unwrap();

        assert_eq!(first[0].notification_id, second[0].notification_id);
        assert_eq!(store.message_count().await, 1);
        // The pending row gets its job resubmitted.
        assert_eq!(store.jobs_of_type(JobType::Delivery).await.len(), 2);
    }
}
