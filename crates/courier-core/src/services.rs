//! Wiring of the core services over a set of repositories

use crate::campaign_status::CampaignStatusAggregator;
use crate::campaigns::CampaignsCollection;
use crate::delivery::mailer::Mailer;
use crate::delivery::{CampaignExpander, DeliveryWorker};
use crate::directory::{Directory, TokenLoader};
use crate::enqueuer::Enqueuer;
use crate::notify::Notifier;
use crate::preferences::{PreferenceFilter, PreferenceUpdater};
use crate::registration::Registrar;
use crate::strategy::StrategyRegistry;
use crate::templates::{MessageComposer, TemplateResolver};
use courier_common::config::WorkerConfig;
use courier_storage::repository::{
    CampaignRepository, CampaignTypeRepository, ClientRepository, JobQueue, KindRepository,
    MessageRepository, PreferenceRepository, SenderRepository, TemplateRepository,
};
use courier_storage::DatabasePool;
use courier_storage::{
    DbCampaignRepository, DbCampaignTypeRepository, DbClientRepository, DbJobQueue,
    DbKindRepository, DbMessageRepository, DbPreferenceRepository, DbSenderRepository,
    DbTemplateRepository,
};
use std::sync::Arc;

/// Every store the core reads or writes
#[derive(Clone)]
pub struct Repositories {
    pub clients: Arc<dyn ClientRepository>,
    pub kinds: Arc<dyn KindRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub senders: Arc<dyn SenderRepository>,
    pub campaign_types: Arc<dyn CampaignTypeRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub queue: Arc<dyn JobQueue>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool, max_attempts: i32) -> Self {
        Self {
            clients: Arc::new(DbClientRepository::new(pool.clone())),
            kinds: Arc::new(DbKindRepository::new(pool.clone())),
            templates: Arc::new(DbTemplateRepository::new(pool.clone())),
            senders: Arc::new(DbSenderRepository::new(pool.clone())),
            campaign_types: Arc::new(DbCampaignTypeRepository::new(pool.clone())),
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            preferences: Arc::new(DbPreferenceRepository::new(pool.clone())),
            queue: Arc::new(DbJobQueue::new(pool, max_attempts)),
        }
    }
}

/// Settings that shape the services
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub default_scopes: Vec<String>,
    pub worker: WorkerConfig,
}

/// The request-path services plus the background worker
pub struct Services {
    pub notifier: Arc<Notifier>,
    pub registrar: Arc<Registrar>,
    pub campaigns: Arc<CampaignsCollection>,
    pub campaign_status: Arc<CampaignStatusAggregator>,
    pub preferences: Arc<PreferenceUpdater>,
    pub worker: Arc<DeliveryWorker>,
}

impl Services {
    pub fn build(
        repos: Repositories,
        tokens: Arc<dyn TokenLoader>,
        directory: Arc<dyn Directory>,
        mailer: Arc<dyn Mailer>,
        settings: ServiceSettings,
    ) -> Self {
        let filter = PreferenceFilter::new(repos.preferences.clone());
        let enqueuer = Arc::new(Enqueuer::new(
            repos.messages.clone(),
            repos.queue.clone(),
            filter.clone(),
            tokens.clone(),
            directory.clone(),
        ));
        let registry = Arc::new(StrategyRegistry::standard(
            tokens,
            directory,
            settings.default_scopes.clone(),
            enqueuer.clone(),
        ));

        let composer = MessageComposer::new(TemplateResolver::new(
            repos.templates.clone(),
            repos.clients.clone(),
            repos.kinds.clone(),
        ));
        let worker = Arc::new(DeliveryWorker::new(
            repos.queue.clone(),
            repos.messages.clone(),
            filter,
            composer,
            mailer,
            CampaignExpander::new(registry.clone(), enqueuer),
            settings.worker,
        ));

        Self {
            notifier: Arc::new(Notifier::new(
                registry,
                repos.clients.clone(),
                repos.kinds.clone(),
            )),
            registrar: Arc::new(Registrar::new(repos.clients.clone(), repos.kinds.clone())),
            campaigns: Arc::new(CampaignsCollection::new(
                repos.senders,
                repos.campaign_types,
                repos.templates,
                repos.campaigns.clone(),
                repos.queue,
            )
            .with_default_scopes(settings.default_scopes)),
            campaign_status: Arc::new(CampaignStatusAggregator::new(
                repos.campaigns,
                repos.messages,
            )),
            preferences: Arc::new(PreferenceUpdater::new(
                repos.preferences,
                repos.clients,
                repos.kinds,
            )),
            worker,
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Repositories {
    /// Every repository backed by the same in-memory store
    pub fn memory(store: Arc<crate::testing::MemoryStore>) -> Self {
        Self {
            clients: store.clone(),
            kinds: store.clone(),
            templates: store.clone(),
            senders: store.clone(),
            campaign_types: store.clone(),
            campaigns: store.clone(),
            messages: store.clone(),
            preferences: store.clone(),
            queue: store,
        }
    }
}
