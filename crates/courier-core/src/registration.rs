//! Client and kind registration

use courier_common::{Error, Result};
use courier_storage::models::UpsertKind;
use courier_storage::repository::{ClientRepository, KindRepository};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One kind in a registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRegistration {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub critical: bool,
}

pub struct Registrar {
    clients: Arc<dyn ClientRepository>,
    kinds: Arc<dyn KindRepository>,
    kind_id: Regex,
}

impl Registrar {
    pub fn new(clients: Arc<dyn ClientRepository>, kinds: Arc<dyn KindRepository>) -> Self {
        Self {
            clients,
            kinds,
            kind_id: Regex::new(r"^[0-9a-z_\-.]+$").expect("kind id pattern is valid"),
        }
    }

    /// Upsert the client and its kinds. Nothing is written when any kind is
    /// invalid or critical without the critical scope.
    pub async fn register(
        &self,
        client_id: &str,
        source_description: &str,
        kinds: Vec<KindRegistration>,
        has_critical_scope: bool,
    ) -> Result<()> {
        if source_description.trim().is_empty() {
            return Err(Error::Validation(
                "\"source_description\" is a required field".into(),
            ));
        }
        for kind in &kinds {
            if !self.kind_id.is_match(&kind.id) {
                return Err(Error::Validation(format!(
                    "notification id {:?} is improperly formatted",
                    kind.id
                )));
            }
            if kind.critical && !has_critical_scope {
                return Err(Error::Permissions(format!(
                    "Insufficient privileges to register critical notification {:?}",
                    kind.id
                )));
            }
        }

        self.clients.upsert(client_id, source_description).await?;
        for kind in &kinds {
            self.kinds
                .upsert(UpsertKind {
                    id: kind.id.clone(),
                    client_id: client_id.to_string(),
                    description: kind.description.clone(),
                    critical: kind.critical,
                })
                .await?;
        }

        info!(client_id, kinds = kinds.len(), "Registered notifications");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;

    fn kind(id: &str, critical: bool) -> KindRegistration {
        KindRegistration {
            id: id.into(),
            description: format!("{} kind", id),
            critical,
        }
    }

    #[tokio::test]
    async fn test_register_upserts_client_and_kinds() {
        let store = Arc::new(MemoryStore::default());
        let registrar = Registrar::new(store.clone(), store.clone());

        registrar
            .register(
                "notifications-sender",
                "Acceptance",
                vec![kind("acceptance-test", false), kind("outage", true)],
                true,
            )
            .await
            .unwrap();
        registrar
            .register("notifications-sender", "Renamed", vec![], false)
            .await
            .unwrap();

        let client = ClientRepository::get(store.as_ref(), "notifications-sender")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.description, "Renamed");
        let kinds = store.list_by_client("notifications-sender").await.unwrap();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.iter().any(|k| k.id == "outage" && k.critical));
    }

    #[tokio::test]
    async fn test_critical_kind_needs_scope_and_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let registrar = Registrar::new(store.clone(), store.clone());

        let err = registrar
            .register(
                "notifications-sender",
                "Acceptance",
                vec![kind("acceptance-test", false), kind("outage", true)],
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Permissions(_)));
        assert!(ClientRepository::get(store.as_ref(), "notifications-sender")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_kind_id_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        let err = Registrar::new(store.clone(), store.clone())
            .register("client", "Client", vec![kind("Bad Kind!", false)], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
