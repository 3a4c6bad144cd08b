//! Client repository

use crate::db::DatabasePool;
use crate::models::Client;
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Client repository trait
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Insert the client or refresh its description
    async fn upsert(&self, id: &str, description: &str) -> Result<Client>;
    async fn get(&self, id: &str) -> Result<Option<Client>>;
}

/// Database client repository
pub struct DbClientRepository {
    pool: DatabasePool,
}

impl DbClientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for DbClientRepository {
    async fn upsert(&self, id: &str, description: &str) -> Result<Client> {
        sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (id, description, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                description = EXCLUDED.description,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(description)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<Client>> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}
