//! Preference and global unsubscribe repository

use crate::db::DatabasePool;
use crate::models::{KindPreference, Preference};
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Preference repository trait
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn global_unsubscribe(&self, user_guid: &str) -> Result<bool>;
    async fn set_global_unsubscribe(&self, user_guid: &str, unsubscribed: bool) -> Result<()>;
    async fn find(&self, user_guid: &str, client_id: &str, kind_id: &str)
        -> Result<Option<Preference>>;
    async fn upsert(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: &str,
        email: bool,
    ) -> Result<Preference>;

    /// Every non-critical kind, with this user's email flag (default true)
    async fn find_non_critical(&self, user_guid: &str) -> Result<Vec<KindPreference>>;
}

/// Database preference repository
pub struct DbPreferenceRepository {
    pool: DatabasePool,
}

impl DbPreferenceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceRepository for DbPreferenceRepository {
    async fn global_unsubscribe(&self, user_guid: &str) -> Result<bool> {
        let result: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM global_unsubscribes WHERE user_guid = $1)",
        )
        .bind(user_guid)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        Ok(result.0)
    }

    async fn set_global_unsubscribe(&self, user_guid: &str, unsubscribed: bool) -> Result<()> {
        let query = if unsubscribed {
            "INSERT INTO global_unsubscribes (user_guid, created_at) VALUES ($1, NOW()) ON CONFLICT (user_guid) DO NOTHING"
        } else {
            "DELETE FROM global_unsubscribes WHERE user_guid = $1"
        };

        sqlx::query(query)
            .bind(user_guid)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn find(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: &str,
    ) -> Result<Option<Preference>> {
        sqlx::query_as::<_, Preference>(
            "SELECT * FROM preferences WHERE user_guid = $1 AND client_id = $2 AND kind_id = $3",
        )
        .bind(user_guid)
        .bind(client_id)
        .bind(kind_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn upsert(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: &str,
        email: bool,
    ) -> Result<Preference> {
        sqlx::query_as::<_, Preference>(
            r#"
            INSERT INTO preferences (user_guid, client_id, kind_id, email, count, updated_at)
            VALUES ($1, $2, $3, $4, 1, NOW())
            ON CONFLICT (user_guid, client_id, kind_id) DO UPDATE SET
                email = EXCLUDED.email,
                count = preferences.count + 1,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_guid)
        .bind(client_id)
        .bind(kind_id)
        .bind(email)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn find_non_critical(&self, user_guid: &str) -> Result<Vec<KindPreference>> {
        sqlx::query_as::<_, KindPreference>(
            r#"
            SELECT
                k.client_id AS client_id,
                c.description AS source_description,
                k.id AS kind_id,
                k.description AS kind_description,
                COALESCE(p.email, TRUE) AS email,
                COALESCE(p.count, 0) AS count
            FROM kinds k
            JOIN clients c ON c.id = k.client_id
            LEFT JOIN preferences p
                ON p.client_id = k.client_id AND p.kind_id = k.id AND p.user_guid = $1
            WHERE k.critical = FALSE
            ORDER BY k.client_id ASC, k.id ASC
            "#,
        )
        .bind(user_guid)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }
}
