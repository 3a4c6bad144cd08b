//! Sender repository (read-only)

use crate::db::DatabasePool;
use crate::models::Sender;
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Sender repository trait
#[async_trait]
pub trait SenderRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Sender>>;
}

/// Database sender repository
pub struct DbSenderRepository {
    pool: DatabasePool,
}

impl DbSenderRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SenderRepository for DbSenderRepository {
    async fn get(&self, id: &str) -> Result<Option<Sender>> {
        sqlx::query_as::<_, Sender>("SELECT * FROM senders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}
