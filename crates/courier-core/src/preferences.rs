//! Unsubscribe filtering and user preference management

use courier_common::{Error, Result};
use courier_storage::repository::{ClientRepository, KindRepository, PreferenceRepository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Decides whether a message may be delivered to a user
#[derive(Clone)]
pub struct PreferenceFilter {
    preferences: Arc<dyn PreferenceRepository>,
}

impl PreferenceFilter {
    pub fn new(preferences: Arc<dyn PreferenceRepository>) -> Self {
        Self { preferences }
    }

    /// Critical kinds always deliver. Otherwise a global unsubscribe or a
    /// per-(client, kind) `email = false` suppresses the message.
    pub async fn should_deliver(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: Option<&str>,
        critical: bool,
    ) -> Result<bool> {
        if critical {
            return Ok(true);
        }

        if self.preferences.global_unsubscribe(user_guid).await? {
            return Ok(false);
        }

        let Some(kind_id) = kind_id else {
            return Ok(true);
        };

        Ok(self
            .preferences
            .find(user_guid, client_id, kind_id)
            .await?
            .map_or(true, |p| p.email))
    }
}

/// One kind's setting as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSetting {
    pub email: bool,
    pub count: i64,
    pub kind_description: String,
    pub source_description: String,
}

/// Everything a user can opt out of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub global_unsubscribe: bool,
    /// client id -> kind id -> setting
    pub clients: BTreeMap<String, BTreeMap<String, KindSetting>>,
}

/// Requested change for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSetting {
    pub email: bool,
}

/// Body of a preference update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub global_unsubscribe: Option<bool>,
    #[serde(default)]
    pub clients: BTreeMap<String, BTreeMap<String, EmailSetting>>,
}

/// Reads and writes user preferences
pub struct PreferenceUpdater {
    preferences: Arc<dyn PreferenceRepository>,
    clients: Arc<dyn ClientRepository>,
    kinds: Arc<dyn KindRepository>,
}

impl PreferenceUpdater {
    pub fn new(
        preferences: Arc<dyn PreferenceRepository>,
        clients: Arc<dyn ClientRepository>,
        kinds: Arc<dyn KindRepository>,
    ) -> Self {
        Self {
            preferences,
            clients,
            kinds,
        }
    }

    pub async fn get(&self, user_guid: &str) -> Result<UserPreferences> {
        let global_unsubscribe = self.preferences.global_unsubscribe(user_guid).await?;
        let mut clients: BTreeMap<String, BTreeMap<String, KindSetting>> = BTreeMap::new();

        for row in self.preferences.find_non_critical(user_guid).await? {
            clients.entry(row.client_id).or_default().insert(
                row.kind_id,
                KindSetting {
                    email: row.email,
                    count: row.count,
                    kind_description: row.kind_description,
                    source_description: row.source_description,
                },
            );
        }

        Ok(UserPreferences {
            global_unsubscribe,
            clients,
        })
    }

    /// Validates every entry before writing any of them
    pub async fn update(&self, user_guid: &str, update: PreferenceUpdate) -> Result<()> {
        for (client_id, kinds) in &update.clients {
            if self.clients.get(client_id).await?.is_none() {
                return Err(Error::NotFound(format!("Client {:?} not found", client_id)));
            }
            for (kind_id, setting) in kinds {
                let kind = self
                    .kinds
                    .get(client_id, kind_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "Kind {:?} for client {:?} not found",
                            kind_id, client_id
                        ))
                    })?;
                if kind.critical && !setting.email {
                    return Err(Error::Permissions(format!(
                        "Cannot unsubscribe from critical notification {:?}",
                        kind_id
                    )));
                }
            }
        }

        if let Some(unsubscribed) = update.global_unsubscribe {
            self.preferences
                .set_global_unsubscribe(user_guid, unsubscribed)
                .await?;
        }

        for (client_id, kinds) in &update.clients {
            for (kind_id, setting) in kinds {
                self.preferences
                    .upsert(user_guid, client_id, kind_id, setting.email)
                    .await?;
            }
        }

        info!(user_guid, "Updated user preferences");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_kind("notifications-sender", "acceptance-test", false).await;
        store.add_kind("notifications-sender", "outage", true).await;
        store
    }

    fn updater(store: &Arc<MemoryStore>) -> PreferenceUpdater {
        PreferenceUpdater::new(store.clone(), store.clone(), store.clone())
    }

    fn opt(client: &str, kind: &str, email: bool) -> PreferenceUpdate {
        let mut kinds = BTreeMap::new();
        kinds.insert(kind.to_string(), EmailSetting { email });
        let mut clients = BTreeMap::new();
        clients.insert(client.to_string(), kinds);
        PreferenceUpdate {
            global_unsubscribe: None,
            clients,
        }
    }

    #[tokio::test]
    async fn test_global_unsubscribe_spares_only_critical() {
        let store = store().await;
        let filter = PreferenceFilter::new(store.clone());
        store.set_global_unsubscribe("user-1", true).await.unwrap();

        for kind in ["acceptance-test", "anything-else"] {
            assert!(!filter
                .should_deliver("user-1", "notifications-sender", Some(kind), false)
                .await
                .unwrap());
        }
        assert!(filter
            .should_deliver("user-1", "notifications-sender", Some("outage"), true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_kind_unsubscribe_then_resubscribe() {
        let store = store().await;
        let filter = PreferenceFilter::new(store.clone());
        let updater = updater(&store);

        updater
            .update("user-1", opt("notifications-sender", "acceptance-test", false))
            .await
            .unwrap();
        assert!(!filter
            .should_deliver("user-1", "notifications-sender", Some("acceptance-test"), false)
            .await
            .unwrap());

        updater
            .update("user-1", opt("notifications-sender", "acceptance-test", true))
            .await
            .unwrap();
        assert!(filter
            .should_deliver("user-1", "notifications-sender", Some("acceptance-test"), false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cannot_opt_out_of_critical_kind() {
        let store = store().await;
        let err = updater(&store)
            .update("user-1", opt("notifications-sender", "outage", false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permissions(_)));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_not_found_and_nothing_written() {
        let store = store().await;
        let mut update = opt("notifications-sender", "acceptance-test", false);
        update
            .clients
            .get_mut("notifications-sender")
            .unwrap()
            .insert("missing".into(), EmailSetting { email: false });
        update.global_unsubscribe = Some(true);

        let err = updater(&store).update("user-1", update).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!store.global_unsubscribe("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_lists_non_critical_kinds() {
        let store = store().await;
        let updater = updater(&store);
        updater
            .update("user-1", opt("notifications-sender", "acceptance-test", false))
            .await
            .unwrap();

        let prefs = updater.get("user-1").await.unwrap();
        assert!(!prefs.global_unsubscribe);
        let kinds = &prefs.clients["notifications-sender"];
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds["acceptance-test"].email, false);
        assert_eq!(kinds["acceptance-test"].count, 1);
    }
}
