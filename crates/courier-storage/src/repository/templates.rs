//! Template repository (read-only)

use crate::db::DatabasePool;
use crate::models::Template;
use async_trait::async_trait;
use courier_common::{Error, Result};

/// Template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Template>>;
}

/// Database template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for DbTemplateRepository {
    async fn get(&self, id: &str) -> Result<Option<Template>> {
        sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}
