//! Delivery worker
//!
//! Polls the job queue, renders and sends delivery jobs, and expands
//! campaign jobs into messages. Jobs are processed at least once; message
//! status writes only move forward, so a redelivered job is harmless.

pub mod campaign;
pub mod mailer;

pub use campaign::CampaignExpander;

use crate::jobs::{CampaignJob, DeliveryJob, JobPayload};
use crate::preferences::PreferenceFilter;
use crate::templates::MessageComposer;
use chrono::Duration;
use courier_common::config::WorkerConfig;
use courier_common::{Error, Result};
use courier_storage::models::{Job, MessageStatus};
use courier_storage::repository::{JobQueue, MessageRepository};
use mailer::{Mailer, SendOutcome};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

/// What to do with a job after one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retry(String),
    Failed(String),
}

/// Background worker draining the job queue
pub struct DeliveryWorker {
    queue: Arc<dyn JobQueue>,
    messages: Arc<dyn MessageRepository>,
    filter: PreferenceFilter,
    composer: MessageComposer,
    mailer: Arc<dyn Mailer>,
    expander: CampaignExpander,
    settings: WorkerConfig,
}

impl DeliveryWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        messages: Arc<dyn MessageRepository>,
        filter: PreferenceFilter,
        composer: MessageComposer,
        mailer: Arc<dyn Mailer>,
        expander: CampaignExpander,
        settings: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            messages,
            filter,
            composer,
            mailer,
            expander,
            settings,
        }
    }

    /// Run until the shutdown flag flips or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(TokioDuration::from_secs(self.settings.poll_interval_secs.max(1)));
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        info!(
            concurrency = self.settings.concurrency,
            batch_size = self.settings.batch_size,
            poll_interval_secs = self.settings.poll_interval_secs,
            "Delivery worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("Delivery worker stopping");
                    return;
                }
            }
            if *shutdown.borrow() {
                info!("Delivery worker stopping");
                return;
            }

            if let Err(e) = self.tick(&semaphore).await {
                error!(error = %e, "Error processing jobs");
            }
        }
    }

    /// One poll: return expired leases, reserve a batch and process it.
    /// Returns the number of jobs processed.
    pub async fn tick(self: &Arc<Self>, semaphore: &Arc<Semaphore>) -> Result<usize> {
        let lease = Duration::seconds(self.settings.lease_secs);
        let requeued = self.queue.requeue_expired(lease).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued jobs with expired leases");
        }

        let jobs = self.queue.reserve(self.settings.batch_size).await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        debug!(jobs = jobs.len(), "Processing jobs");

        let count = jobs.len();
        let mut handles = Vec::with_capacity(count);
        for job in jobs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::Unknown(format!("Worker semaphore closed: {}", e)))?;
            let worker = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                worker.process_job(job).await;
                drop(permit);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Job task panicked");
            }
        }

        Ok(count)
    }

    pub async fn process_job(&self, job: Job) {
        let attempts = job.attempts + 1;
        let final_attempt = attempts >= job.max_attempts;

        let mut message_id = None;
        let outcome = match JobPayload::decode(&job) {
            Ok(JobPayload::Delivery(delivery)) => {
                message_id = Some(delivery.message_id);
                self.deliver(&delivery, final_attempt)
                    .await
                    .unwrap_or_else(|e| JobOutcome::Retry(e.to_string()))
            }
            Ok(JobPayload::Campaign(campaign)) => self.expand(&campaign).await,
            Err(e) => JobOutcome::Failed(e.to_string()),
        };

        let result = match &outcome {
            JobOutcome::Completed => self.queue.complete(job.id).await,
            JobOutcome::Retry(reason) if !final_attempt => {
                let delay = calculate_backoff(job.attempts);
                warn!(job_id = %job.id, attempts, error = %reason, "Job will be retried");
                self.queue.retry(job.id, attempts, reason, delay).await
            }
            JobOutcome::Retry(reason) | JobOutcome::Failed(reason) => {
                error!(job_id = %job.id, attempts, error = %reason, "Job failed");
                // Settle the message so its campaign can complete.
                if let Some(id) = message_id {
                    if let Err(e) = self.messages.update_status(id, MessageStatus::Failed).await {
                        warn!(message_id = %id, error = %e, "Failed to mark message failed");
                    }
                }
                self.queue.fail(job.id, reason).await
            }
        };

        if let Err(e) = result {
            error!(job_id = %job.id, error = %e, "Failed to record job outcome");
        }
    }

    async fn deliver(&self, job: &DeliveryJob, final_attempt: bool) -> Result<JobOutcome> {
        let Some(message) = self.messages.get(job.message_id).await? else {
            return Ok(JobOutcome::Failed(format!(
                "Message {} not found",
                job.message_id
            )));
        };
        if message.status().is_terminal() {
            debug!(message_id = %message.id, status = %message.status, "Message already settled");
            return Ok(JobOutcome::Completed);
        }

        // Preferences may have changed since the message was queued.
        if let Some(guid) = &job.recipient.guid {
            let deliver = self
                .filter
                .should_deliver(
                    guid,
                    &job.client_id,
                    job.options.kind_id.as_deref(),
                    job.options.critical,
                )
                .await?;
            if !deliver {
                info!(message_id = %message.id, user_guid = %guid, "Recipient unsubscribed");
                self.messages
                    .update_status(message.id, MessageStatus::Undeliverable)
                    .await?;
                return Ok(JobOutcome::Completed);
            }
        }

        let composed = match self.composer.compose(job).await {
            Ok(composed) => composed,
            Err(e @ (Error::NotFound(_) | Error::Validation(_))) => {
                self.messages
                    .update_status(message.id, MessageStatus::Failed)
                    .await?;
                return Ok(JobOutcome::Failed(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        match self.mailer.send(&composed).await {
            SendOutcome::Sent => {
                info!(message_id = %message.id, client_id = %job.client_id, "Message delivered");
                self.messages
                    .update_status(message.id, MessageStatus::Delivered)
                    .await?;
                Ok(JobOutcome::Completed)
            }
            SendOutcome::TemporaryFailure { error } if !final_attempt => {
                self.messages
                    .update_status(message.id, MessageStatus::Retry)
                    .await?;
                Ok(JobOutcome::Retry(error))
            }
            SendOutcome::TemporaryFailure { error } | SendOutcome::PermanentFailure { error } => {
                self.messages
                    .update_status(message.id, MessageStatus::Failed)
                    .await?;
                Ok(JobOutcome::Failed(error))
            }
        }
    }

    async fn expand(&self, job: &CampaignJob) -> JobOutcome {
        match self.expander.expand(job).await {
            Ok(_) => JobOutcome::Completed,
            Err(e) if e.is_transient() => JobOutcome::Retry(e.to_string()),
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}

/// Exponential backoff: 1 minute doubling, capped at 4 hours
fn calculate_backoff(attempts: i32) -> Duration {
    let minutes = std::cmp::min(2_i64.pow(attempts.clamp(0, 8) as u32), 240);
    Duration::minutes(minutes)
}
