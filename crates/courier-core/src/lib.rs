//! Courier Core - Notification dispatch engine
//!
//! This crate turns an audience (a user, an email address, a space, an
//! organization, a UAA scope or everyone) into per-recipient messages, and
//! delivers them asynchronously:
//! - Directory clients for UAA and the Cloud Controller
//! - Audience strategies and the enqueuer
//! - Preference filtering, registration and template rendering
//! - Campaign creation and status aggregation
//! - The delivery worker

pub mod campaign_status;
pub mod campaigns;
pub mod delivery;
pub mod directory;
pub mod dispatch;
pub mod enqueuer;
pub mod jobs;
pub mod notify;
pub mod preferences;
pub mod registration;
pub mod services;
pub mod strategy;
pub mod templates;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use campaign_status::{CampaignLifecycle, CampaignStatus, CampaignStatusAggregator};
pub use campaigns::{CampaignsCollection, NewCampaign};
pub use delivery::mailer::{ComposedMessage, Mailer, SendOutcome, SmtpMailer};
pub use delivery::DeliveryWorker;
pub use directory::{Directory, HttpDirectory, TokenLoader};
pub use dispatch::{Dispatch, Options, Recipient, Response};
pub use enqueuer::{EnqueueRequest, Enqueuer};
pub use notify::{Caller, NotifyRequest, Notifier};
pub use preferences::{PreferenceFilter, PreferenceUpdater};
pub use registration::{KindRegistration, Registrar};
pub use services::{Repositories, ServiceSettings, Services};
pub use strategy::{AudienceResolver, Strategy, StrategyRegistry};
