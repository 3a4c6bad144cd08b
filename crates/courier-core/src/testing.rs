//! In-memory repositories and fake collaborators for tests

use crate::delivery::mailer::{ComposedMessage, Mailer, SendOutcome};
use crate::directory::{Directory, Organization, Space, TokenLoader};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use courier_common::types::{CampaignId, JobId, MessageId, OrganizationRole};
use courier_common::{Error, Result};
use courier_storage::models::{
    Campaign, CampaignMessageCounts, CampaignType, Client, CreateCampaign, CreateMessage, Job,
    JobStatus, JobType, Kind, KindPreference, Message, MessageStatus, Preference, Sender,
    Template, UpsertKind,
};
use courier_storage::repository::{
    CampaignRepository, CampaignTypeRepository, ClientRepository, JobQueue, KindRepository,
    MessageRepository, PreferenceRepository, SenderRepository, TemplateRepository,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    clients: HashMap<String, Client>,
    kinds: HashMap<(String, String), Kind>,
    templates: HashMap<String, Template>,
    senders: HashMap<String, Sender>,
    campaign_types: HashMap<String, CampaignType>,
    campaigns: HashMap<CampaignId, Campaign>,
    messages: Vec<Message>,
    preferences: HashMap<(String, String, String), Preference>,
    unsubscribed: HashSet<String>,
    jobs: Vec<Job>,
}

/// Every repository and the job queue, held in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_queue: AtomicBool,
}

impl MemoryStore {
    /// Registers the kind, creating its client when needed
    pub async fn add_kind(&self, client_id: &str, kind_id: &str, critical: bool) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| Client {
                id: client_id.to_string(),
                description: format!("{} description", client_id),
                template_id: None,
                created_at: now,
                updated_at: now,
            });
        state.kinds.insert(
            (client_id.to_string(), kind_id.to_string()),
            Kind {
                id: kind_id.to_string(),
                client_id: client_id.to_string(),
                description: format!("{} description", kind_id),
                critical,
                template_id: None,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn add_template(&self, id: &str, subject: &str) {
        self.state.lock().await.templates.insert(
            id.to_string(),
            Template {
                id: id.to_string(),
                name: id.to_string(),
                subject: subject.to_string(),
                text: "{{.Text}}".to_string(),
                html: "{{.HTML}}".to_string(),
                metadata: serde_json::json!({}),
                client_id: None,
                created_at: Utc::now(),
            },
        );
    }

    pub async fn assign_client_template(&self, client_id: &str, template_id: &str) {
        if let Some(client) = self.state.lock().await.clients.get_mut(client_id) {
            client.template_id = Some(template_id.to_string());
        }
    }

    pub async fn assign_kind_template(&self, client_id: &str, kind_id: &str, template_id: &str) {
        let key = (client_id.to_string(), kind_id.to_string());
        if let Some(kind) = self.state.lock().await.kinds.get_mut(&key) {
            kind.template_id = Some(template_id.to_string());
        }
    }

    pub async fn add_sender(&self, id: &str, name: &str, client_id: &str) {
        self.state.lock().await.senders.insert(
            id.to_string(),
            Sender {
                id: id.to_string(),
                name: name.to_string(),
                client_id: client_id.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub async fn add_campaign_type(
        &self,
        id: &str,
        sender_id: &str,
        critical: bool,
        template_id: Option<&str>,
    ) {
        self.state.lock().await.campaign_types.insert(
            id.to_string(),
            CampaignType {
                id: id.to_string(),
                name: format!("{} name", id),
                description: format!("{} description", id),
                critical,
                template_id: template_id.map(str::to_string),
                sender_id: sender_id.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn jobs_of_type(&self, job_type: JobType) -> Vec<Job> {
        let job_type = job_type.to_string();
        self.state
            .lock()
            .await
            .jobs
            .iter()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect()
    }

    pub async fn campaign_count(&self) -> usize {
        self.state.lock().await.campaigns.len()
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn message(&self, id: MessageId) -> Option<Message> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Makes every job submission fail until switched off
    pub fn fail_queue(&self, fail: bool) {
        self.fail_queue.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientRepository for MemoryStore {
    async fn upsert(&self, id: &str, description: &str) -> Result<Client> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let client = state.clients.entry(id.to_string()).or_insert_with(|| Client {
            id: id.to_string(),
            description: String::new(),
            template_id: None,
            created_at: now,
            updated_at: now,
        });
        client.description = description.to_string();
        client.updated_at = now;
        Ok(client.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Client>> {
        Ok(self.state.lock().await.clients.get(id).cloned())
    }
}

#[async_trait]
impl KindRepository for MemoryStore {
    async fn upsert(&self, input: UpsertKind) -> Result<Kind> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let kind = state
            .kinds
            .entry((input.client_id.clone(), input.id.clone()))
            .or_insert_with(|| Kind {
                id: input.id.clone(),
                client_id: input.client_id.clone(),
                description: String::new(),
                critical: false,
                template_id: None,
                created_at: now,
                updated_at: now,
            });
        kind.description = input.description;
        kind.critical = input.critical;
        kind.updated_at = now;
        Ok(kind.clone())
    }

    async fn get(&self, client_id: &str, kind_id: &str) -> Result<Option<Kind>> {
        let key = (client_id.to_string(), kind_id.to_string());
        Ok(self.state.lock().await.kinds.get(&key).cloned())
    }

    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Kind>> {
        let mut kinds: Vec<Kind> = self
            .state
            .lock()
            .await
            .kinds
            .values()
            .filter(|k| k.client_id == client_id)
            .cloned()
            .collect();
        kinds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(kinds)
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Template>> {
        Ok(self.state.lock().await.templates.get(id).cloned())
    }
}

#[async_trait]
impl SenderRepository for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Sender>> {
        Ok(self.state.lock().await.senders.get(id).cloned())
    }
}

#[async_trait]
impl CampaignTypeRepository for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<CampaignType>> {
        Ok(self.state.lock().await.campaign_types.get(id).cloned())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let campaign = Campaign {
            id: input.id,
            sender_id: input.sender_id,
            campaign_type_id: input.campaign_type_id,
            client_id: input.client_id,
            audience: input.audience,
            subject: input.subject,
            text: input.text,
            html: input.html,
            template_id: input.template_id,
            reply_to: input.reply_to,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn delete(&self, id: CampaignId) -> Result<()> {
        self.state.lock().await.campaigns.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let mut state = self.state.lock().await;
        if let Some(campaign_id) = input.campaign_id {
            if let Some(existing) = state
                .messages
                .iter()
                .find(|m| m.campaign_id == Some(campaign_id) && m.recipient == input.recipient)
            {
                return Ok(existing.clone());
            }
        }

        let now = Utc::now();
        let message = Message {
            id: input.id,
            campaign_id: input.campaign_id,
            recipient: input.recipient,
            email: input.email,
            status: input.status.to_string(),
            client_id: input.client_id,
            kind_id: input.kind_id,
            scope: input.scope,
            vcap_request_id: input.vcap_request_id,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.message(id).await)
    }

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .messages
            .iter_mut()
            .find(|m| m.id == id && !m.status().is_terminal())
        {
            Some(message) => {
                message.status = status.to_string();
                message.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        self.state.lock().await.messages.retain(|m| m.id != id);
        Ok(())
    }

    async fn count_by_campaign(&self, campaign_id: CampaignId) -> Result<CampaignMessageCounts> {
        let state = self.state.lock().await;
        let mut counts = CampaignMessageCounts::default();
        for message in state
            .messages
            .iter()
            .filter(|m| m.campaign_id == Some(campaign_id))
        {
            match message.status() {
                MessageStatus::Queued => counts.queued += 1,
                MessageStatus::Retry => counts.retry += 1,
                MessageStatus::Delivered => counts.delivered += 1,
                MessageStatus::Failed => counts.failed += 1,
                MessageStatus::Undeliverable
                | MessageStatus::NoAddress
                | MessageStatus::NotFound => counts.undeliverable += 1,
            }
            counts.last_updated_at = counts.last_updated_at.max(Some(message.updated_at));
        }
        Ok(counts)
    }
}

#[async_trait]
impl PreferenceRepository for MemoryStore {
    async fn global_unsubscribe(&self, user_guid: &str) -> Result<bool> {
        Ok(self.state.lock().await.unsubscribed.contains(user_guid))
    }

    async fn set_global_unsubscribe(&self, user_guid: &str, unsubscribed: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if unsubscribed {
            state.unsubscribed.insert(user_guid.to_string());
        } else {
            state.unsubscribed.remove(user_guid);
        }
        Ok(())
    }

    async fn find(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: &str,
    ) -> Result<Option<Preference>> {
        let key = (
            user_guid.to_string(),
            client_id.to_string(),
            kind_id.to_string(),
        );
        Ok(self.state.lock().await.preferences.get(&key).cloned())
    }

    async fn upsert(
        &self,
        user_guid: &str,
        client_id: &str,
        kind_id: &str,
        email: bool,
    ) -> Result<Preference> {
        let key = (
            user_guid.to_string(),
            client_id.to_string(),
            kind_id.to_string(),
        );
        let mut state = self.state.lock().await;
        let preference = state.preferences.entry(key).or_insert_with(|| Preference {
            user_guid: user_guid.to_string(),
            client_id: client_id.to_string(),
            kind_id: kind_id.to_string(),
            email,
            count: 0,
            updated_at: Utc::now(),
        });
        preference.email = email;
        preference.count += 1;
        preference.updated_at = Utc::now();
        Ok(preference.clone())
    }

    async fn find_non_critical(&self, user_guid: &str) -> Result<Vec<KindPreference>> {
        let state = self.state.lock().await;
        let mut rows: Vec<KindPreference> = state
            .kinds
            .values()
            .filter(|k| !k.critical)
            .map(|kind| {
                let key = (
                    user_guid.to_string(),
                    kind.client_id.clone(),
                    kind.id.clone(),
                );
                let preference = state.preferences.get(&key);
                KindPreference {
                    client_id: kind.client_id.clone(),
                    source_description: state
                        .clients
                        .get(&kind.client_id)
                        .map(|c| c.description.clone())
                        .unwrap_or_default(),
                    kind_id: kind.id.clone(),
                    kind_description: kind.description.clone(),
                    email: preference.map_or(true, |p| p.email),
                    count: preference.map_or(0, |p| p.count),
                }
            })
            .collect();
        rows.sort_by(|a, b| (&a.client_id, &a.kind_id).cmp(&(&b.client_id, &b.kind_id)));
        Ok(rows)
    }
}

#[async_trait]
impl JobQueue for MemoryStore {
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> Result<JobId> {
        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(Error::Persistence("queue unavailable".into()));
        }
        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7(),
            job_type: job_type.to_string(),
            payload,
            status: JobStatus::Pending.to_string(),
            attempts: 0,
            max_attempts: 3,
            last_error: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            created_at: now,
        };
        let id = job.id;
        self.state.lock().await.jobs.push(job);
        Ok(id)
    }

    async fn reserve(&self, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let pending = JobStatus::Pending.to_string();
        let mut state = self.state.lock().await;
        let mut reserved = Vec::new();
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.status == pending && j.scheduled_at <= now)
            .take(limit.max(0) as usize)
        {
            job.status = JobStatus::Processing.to_string();
            job.started_at = Some(now);
            reserved.push(job.clone());
        }
        Ok(reserved)
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Completed.to_string();
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn retry(&self, id: JobId, attempts: i32, error: &str, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Pending.to_string();
            job.attempts = attempts;
            job.last_error = Some(error.to_string());
            job.scheduled_at = Utc::now() + delay;
            job.started_at = None;
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed.to_string();
            job.last_error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn requeue_expired(&self, lease: Duration) -> Result<u64> {
        let cutoff = Utc::now() - lease;
        let processing = JobStatus::Processing.to_string();
        let mut state = self.state.lock().await;
        let mut requeued = 0;
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.status == processing && j.started_at.map_or(false, |s| s < cutoff))
        {
            job.status = JobStatus::Pending.to_string();
            job.started_at = None;
            requeued += 1;
        }
        Ok(requeued)
    }
}

/// Token loader that counts calls
#[derive(Default)]
pub struct FakeTokens {
    failing: bool,
    calls: AtomicUsize,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenLoader for FakeTokens {
    async fn load(&self, _uaa_host: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::Directory("token endpoint unavailable".into()));
        }
        Ok("fake-token".to_string())
    }
}

/// Directory answering from fixed fixtures
#[derive(Default)]
pub struct FakeDirectory {
    spaces: HashMap<String, (Space, Vec<String>)>,
    organizations: HashMap<String, Organization>,
    org_members: HashMap<(String, Option<OrganizationRole>), Vec<String>>,
    scope_members: HashMap<String, Vec<String>>,
    users: Vec<String>,
    emails: HashMap<String, Option<String>>,
    failing_emails: bool,
    calls: AtomicUsize,
}

fn owned(guids: &[&str]) -> Vec<String> {
    guids.iter().map(|g| g.to_string()).collect()
}

impl FakeDirectory {
    pub fn with_space(mut self, space: Space, members: &[&str]) -> Self {
        self.spaces
            .insert(space.guid.clone(), (space, owned(members)));
        self
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organizations
            .insert(organization.guid.clone(), organization);
        self
    }

    pub fn with_org_members(
        mut self,
        org_guid: &str,
        role: Option<OrganizationRole>,
        members: &[&str],
    ) -> Self {
        self.org_members
            .insert((org_guid.to_string(), role), owned(members));
        self
    }

    pub fn with_scope_members(mut self, scope: &str, members: &[&str]) -> Self {
        self.scope_members.insert(scope.to_string(), owned(members));
        self
    }

    pub fn with_users(mut self, users: &[&str]) -> Self {
        self.users = owned(users);
        self
    }

    pub fn with_email(mut self, guid: &str, email: Option<&str>) -> Self {
        self.emails
            .insert(guid.to_string(), email.map(str::to_string));
        self
    }

    pub fn failing_emails(mut self) -> Self {
        self.failing_emails = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn users_in_space(&self, _token: &str, space_guid: &str) -> Result<Vec<String>> {
        self.record();
        self.spaces
            .get(space_guid)
            .map(|(_, members)| members.clone())
            .ok_or_else(|| Error::NotFound(format!("Space {:?} not found", space_guid)))
    }

    async fn users_in_org(
        &self,
        _token: &str,
        org_guid: &str,
        role: Option<OrganizationRole>,
    ) -> Result<Vec<String>> {
        self.record();
        if !self.organizations.contains_key(org_guid) {
            return Err(Error::NotFound(format!("Organization {:?} not found", org_guid)));
        }
        Ok(self
            .org_members
            .get(&(org_guid.to_string(), role))
            .cloned()
            .unwrap_or_default())
    }

    async fn users_with_scope(&self, _token: &str, scope: &str) -> Result<Vec<String>> {
        self.record();
        Ok(self.scope_members.get(scope).cloned().unwrap_or_default())
    }

    async fn all_users(&self, _token: &str) -> Result<Vec<String>> {
        self.record();
        Ok(self.users.clone())
    }

    async fn space(&self, _token: &str, guid: &str) -> Result<Space> {
        self.record();
        self.spaces
            .get(guid)
            .map(|(space, _)| space.clone())
            .ok_or_else(|| Error::NotFound(format!("Space {:?} not found", guid)))
    }

    async fn organization(&self, _token: &str, guid: &str) -> Result<Organization> {
        self.record();
        self.organizations
            .get(guid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Organization {:?} not found", guid)))
    }

    async fn user_emails(
        &self,
        _token: &str,
        guids: &[String],
    ) -> Result<HashMap<String, Option<String>>> {
        self.record();
        if self.failing_emails {
            return Err(Error::Directory("UAA unavailable".into()));
        }
        Ok(guids
            .iter()
            .filter_map(|g| self.emails.get(g).map(|e| (g.clone(), e.clone())))
            .collect())
    }
}

/// Mailer that records every message and answers from a script
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<ComposedMessage>>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes returned in order; `Sent` once exhausted
    pub fn with_outcomes(outcomes: Vec<SendOutcome>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(outcomes.into()),
        }
    }

    pub async fn sent(&self) -> Vec<ComposedMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &ComposedMessage) -> SendOutcome {
        self.sent.lock().await.push(message.clone());
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(SendOutcome::Sent)
    }
}
