//! Database models

use chrono::{DateTime, Utc};
use courier_common::types::{CampaignId, JobId, MessageId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registered client (a notification source)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub description: String,
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notification kind registered by a client
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Kind {
    pub id: String,
    pub client_id: String,
    pub description: String,
    pub critical: bool,
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert kind input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertKind {
    pub id: String,
    pub client_id: String,
    pub description: String,
    pub critical: bool,
}

/// Message template
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub metadata: serde_json::Value,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Campaign sender
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

/// Campaign type, owned by a sender
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub critical: bool,
    pub template_id: Option<String>,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub sender_id: String,
    pub campaign_type_id: String,
    pub client_id: String,
    /// Audience map with exactly one key, e.g. `{"space": "guid"}`
    pub audience: serde_json::Value,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub template_id: String,
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub id: CampaignId,
    pub sender_id: String,
    pub campaign_type_id: String,
    pub client_id: String,
    pub audience: serde_json::Value,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub template_id: String,
    pub reply_to: Option<String>,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Retry,
    Delivered,
    Failed,
    Undeliverable,
    NoAddress,
    NotFound,
}

impl MessageStatus {
    /// Terminal statuses are never rewritten
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Queued | MessageStatus::Retry)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Queued => write!(f, "queued"),
            MessageStatus::Retry => write!(f, "retry"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Failed => write!(f, "failed"),
            MessageStatus::Undeliverable => write!(f, "undeliverable"),
            MessageStatus::NoAddress => write!(f, "noaddress"),
            MessageStatus::NotFound => write!(f, "notfound"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "retry" => Ok(MessageStatus::Retry),
            "delivered" => Ok(MessageStatus::Delivered),
            "failed" => Ok(MessageStatus::Failed),
            "undeliverable" => Ok(MessageStatus::Undeliverable),
            "noaddress" => Ok(MessageStatus::NoAddress),
            "notfound" => Ok(MessageStatus::NotFound),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// One delivery record for one recipient of one dispatch
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub campaign_id: Option<CampaignId>,
    /// User guid, or the raw address for email sends
    pub recipient: String,
    pub email: Option<String>,
    pub status: String,
    pub client_id: String,
    pub kind_id: Option<String>,
    pub scope: Option<String>,
    pub vcap_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Parsed status; unknown values are treated as failed
    pub fn status(&self) -> MessageStatus {
        self.status.parse().unwrap_or(MessageStatus::Failed)
    }
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub id: MessageId,
    pub campaign_id: Option<CampaignId>,
    pub recipient: String,
    pub email: Option<String>,
    pub status: MessageStatus,
    pub client_id: String,
    pub kind_id: Option<String>,
    pub scope: Option<String>,
    pub vcap_request_id: Option<String>,
}

/// Per-bucket message counts of one campaign, read in one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMessageCounts {
    pub queued: i64,
    pub retry: i64,
    pub delivered: i64,
    pub failed: i64,
    /// Includes `noaddress` and `notfound`
    pub undeliverable: i64,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl CampaignMessageCounts {
    pub fn total(&self) -> i64 {
        self.queued + self.retry + self.delivered + self.failed + self.undeliverable
    }
}

/// Per-(user, client, kind) preference row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Preference {
    pub user_guid: String,
    pub client_id: String,
    pub kind_id: String,
    pub email: bool,
    pub count: i64,
    pub updated_at: DateTime<Utc>,
}

/// A non-critical kind joined with one user's preference for it
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct KindPreference {
    pub client_id: String,
    pub source_description: String,
    pub kind_id: String,
    pub kind_description: String,
    pub email: bool,
    pub count: i64,
}

/// Queue a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Delivery,
    Campaign,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Delivery => write!(f, "delivery"),
            JobType::Campaign => write!(f, "campaign"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivery" => Ok(JobType::Delivery),
            "campaign" => Ok(JobType::Campaign),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Job in the durable queue
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_status_terminality() {
        assert!(!MessageStatus::Queued.is_terminal());
        assert!(!MessageStatus::Retry.is_terminal());
        for status in [
            MessageStatus::Delivered,
            MessageStatus::Failed,
            MessageStatus::Undeliverable,
            MessageStatus::NoAddress,
            MessageStatus::NotFound,
        ] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_message_status_strings() {
        assert_eq!(MessageStatus::NoAddress.to_string(), "noaddress");
        assert_eq!("notfound".parse::<MessageStatus>(), Ok(MessageStatus::NotFound));
        assert!("sent".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn test_counts_total() {
        let counts = CampaignMessageCounts {
            queued: 1,
            retry: 2,
            delivered: 3,
            failed: 4,
            undeliverable: 5,
            last_updated_at: None,
        };
        assert_eq!(counts.total(), 15);
    }
}
