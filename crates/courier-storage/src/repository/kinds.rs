//! Kind repository

use crate::db::DatabasePool;
use crate::models::{Kind, UpsertKind};
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Kind repository trait
#[async_trait]
pub trait KindRepository: Send + Sync {
    async fn upsert(&self, input: UpsertKind) -> Result<Kind>;
    async fn get(&self, client_id: &str, kind_id: &str) -> Result<Option<Kind>>;
    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Kind>>;
}

/// Database kind repository
pub struct DbKindRepository {
    pool: DatabasePool,
}

impl DbKindRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KindRepository for DbKindRepository {
    async fn upsert(&self, input: UpsertKind) -> Result<Kind> {
        sqlx::query_as::<_, Kind>(
            r#"
            INSERT INTO kinds (id, client_id, description, critical, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (client_id, id) DO UPDATE SET
                description = EXCLUDED.description,
                critical = EXCLUDED.critical,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&input.id)
        .bind(&input.client_id)
        .bind(&input.description)
        .bind(input.critical)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn get(&self, client_id: &str, kind_id: &str) -> Result<Option<Kind>> {
        sqlx::query_as::<_, Kind>("SELECT * FROM kinds WHERE client_id = $1 AND id = $2")
            .bind(client_id)
            .bind(kind_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Kind>> {
        sqlx::query_as::<_, Kind>("SELECT * FROM kinds WHERE client_id = $1 ORDER BY id ASC")
            .bind(client_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}
