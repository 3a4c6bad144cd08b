//! Payloads carried by queued jobs

use crate::directory::{Organization, Space};
use crate::dispatch::{Options, Recipient};
use chrono::{DateTime, Utc};
use courier_common::types::{CampaignId, MessageId};
use courier_common::{Error, Result};
use courier_storage::models::{Campaign, Job, JobType};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Deliver one persisted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub message_id: MessageId,
    pub recipient: Recipient,
    /// Resolved address
    pub email: String,
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

/// Expand one campaign into messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignJob {
    pub campaign: Campaign,
    pub critical: bool,
    pub campaign_type_name: String,
    pub sender_name: String,
    pub uaa_host: String,
}

/// A reserved job with its payload decoded
#[derive(Debug, Clone)]
pub enum JobPayload {
    Delivery(Box<DeliveryJob>),
    Campaign(Box<CampaignJob>),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Delivery(_) => JobType::Delivery,
            JobPayload::Campaign(_) => JobType::Campaign,
        }
    }

    /// Decode a reserved job. Unknown types and malformed payloads are
    /// validation errors so the job is failed rather than retried.
    pub fn decode(job: &Job) -> Result<Self> {
        let job_type: JobType = job.job_type.parse().map_err(Error::Validation)?;
        match job_type {
            JobType::Delivery => Ok(JobPayload::Delivery(Box::new(decode(&job.payload)?))),
            JobType::Campaign => Ok(JobPayload::Campaign(Box::new(decode(&job.payload)?))),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::Validation(format!("Invalid job payload: {}", e)))
}

pub(crate) fn encode<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| Error::Persistence(format!("Failed to encode job payload: {}", e)))
}
