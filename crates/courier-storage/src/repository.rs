//! Repository layer for data access

pub mod campaign_types;
pub mod campaigns;
pub mod clients;
pub mod jobs;
pub mod kinds;
pub mod messages;
pub mod preferences;
pub mod senders;
pub mod templates;

pub use campaign_types::{CampaignTypeRepository, DbCampaignTypeRepository};
pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use clients::{ClientRepository, DbClientRepository};
pub use jobs::{DbJobQueue, JobQueue};
pub use kinds::{DbKindRepository, KindRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use preferences::{DbPreferenceRepository, PreferenceRepository};
pub use senders::{DbSenderRepository, SenderRepository};
pub use templates::{DbTemplateRepository, TemplateRepository};
