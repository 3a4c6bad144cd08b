//! Message repository

use crate::db::DatabasePool;
use crate::models::{CampaignMessageCounts, CreateMessage, Message, MessageStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::types::{CampaignId, MessageId};
use courier_common::{Error, Result};

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message. For campaign messages an existing row for the same
    /// recipient is returned unchanged instead, so callers compare ids.
    async fn create(&self, input: CreateMessage) -> Result<Message>;

    async fn get(&self, id: MessageId) -> Result<Option<Message>>;

    /// Move a non-terminal message to `status`. Returns false when the row is
    /// already terminal (or missing) and nothing was written.
    async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<bool>;

    /// Remove a message whose delivery job could not be submitted
    async fn delete(&self, id: MessageId) -> Result<()>;

    /// Bucket counts for a campaign, read in a single statement
    async fn count_by_campaign(&self, campaign_id: CampaignId) -> Result<CampaignMessageCounts>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let inserted = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, campaign_id, recipient, email, status, client_id,
                kind_id, scope, vcap_request_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (campaign_id, recipient) WHERE campaign_id IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(input.id)
        .bind(input.campaign_id)
        .bind(&input.recipient)
        .bind(&input.email)
        .bind(input.status.to_string())
        .bind(&input.client_id)
        .bind(&input.kind_id)
        .bind(&input.scope)
        .bind(&input.vcap_request_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        if let Some(message) = inserted {
            return Ok(message);
        }

        sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE campaign_id = $1 AND recipient = $2",
        )
        .bind(input.campaign_id)
        .bind(&input.recipient)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?
        .ok_or_else(|| Error::Persistence("Failed to create message".to_string()))
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'retry')
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn count_by_campaign(&self, campaign_id: CampaignId) -> Result<CampaignMessageCounts> {
        let row: (i64, i64, i64, i64, i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'queued'),
                COUNT(*) FILTER (WHERE status = 'retry'),
                COUNT(*) FILTER (WHERE status = 'delivered'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status IN ('undeliverable', 'noaddress', 'notfound')),
                MAX(updated_at)
            FROM messages
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        Ok(CampaignMessageCounts {
            queued: row.0,
            retry: row.1,
            delivered: row.2,
            failed: row.3,
            undeliverable: row.4,
            last_updated_at: row.5,
        })
    }
}
