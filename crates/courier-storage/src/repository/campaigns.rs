//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CreateCampaign};
use async_trait::async_trait;
use courier_common::types::CampaignId;
use courier_common::{Error, Result};

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn delete(&self, id: CampaignId) -> Result<()>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, sender_id, campaign_type_id, client_id, audience,
                subject, text, html, template_id, reply_to, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING *
            "#,
        )
        .bind(input.id)
        .bind(&input.sender_id)
        .bind(&input.campaign_type_id)
        .bind(&input.client_id)
        .bind(&input.audience)
        .bind(&input.subject)
        .bind(&input.text)
        .bind(&input.html)
        .bind(&input.template_id)
        .bind(&input.reply_to)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn delete(&self, id: CampaignId) -> Result<()> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}
