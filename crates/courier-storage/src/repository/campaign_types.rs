//! Campaign type repository (read-only)

use crate::db::DatabasePool;
use crate::models::CampaignType;
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Campaign type repository trait
#[async_trait]
pub trait CampaignTypeRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<CampaignType>>;
}

/// Database campaign type repository
pub struct DbCampaignTypeRepository {
    pool: DatabasePool,
}

impl DbCampaignTypeRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignTypeRepository for DbCampaignTypeRepository {
    async fn get(&self, id: &str) -> Result<Option<CampaignType>> {
        sqlx::query_as::<_, CampaignType>("SELECT * FROM campaign_types WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}
