//! Single-shot sends: validate a request, build the dispatch and hand it to
//! the strategy for its audience

use crate::dispatch::{ClientInfo, Dispatch, Html, KindInfo, MessagePayload, Response};
use crate::strategy::StrategyRegistry;
use chrono::Utc;
use courier_common::types::{Audience, EmailAddress, OrganizationRole};
use courier_common::{Error, Result};
use courier_storage::repository::{ClientRepository, KindRepository};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Body of a notify call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub kind_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Address for email sends
    #[serde(default)]
    pub to: Option<String>,
    /// Organization sends only
    #[serde(default)]
    pub role: Option<String>,
}

/// Who is calling, taken from the verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub client_id: String,
    pub uaa_host: String,
    pub has_critical_scope: bool,
    pub vcap_request_id: String,
}

/// Splits a caller's HTML into doctype, head, body attributes and content
struct HtmlParts {
    doctype: Regex,
    head: Regex,
    body: Regex,
}

impl HtmlParts {
    fn new() -> Self {
        Self {
            doctype: Regex::new(r"(?is)<!doctype[^>]*>").expect("doctype pattern is valid"),
            head: Regex::new(r"(?is)<head[^>]*>(.*?)</head>").expect("head pattern is valid"),
            body: Regex::new(r"(?is)<body([^>]*)>(.*?)</body>").expect("body pattern is valid"),
        }
    }

    fn split(&self, raw: &str) -> Html {
        let doctype = self
            .doctype
            .find(raw)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let head = self
            .head
            .captures(raw)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        match self.body.captures(raw) {
            Some(body) => Html {
                body_content: body[2].trim().to_string(),
                body_attributes: body[1].trim().to_string(),
                head,
                doctype,
            },
            None => Html {
                body_content: raw.trim().to_string(),
                body_attributes: String::new(),
                head,
                doctype,
            },
        }
    }
}

/// Entry point for every single-shot audience
pub struct Notifier {
    registry: Arc<StrategyRegistry>,
    clients: Arc<dyn ClientRepository>,
    kinds: Arc<dyn KindRepository>,
    html: HtmlParts,
}

impl Notifier {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        clients: Arc<dyn ClientRepository>,
        kinds: Arc<dyn KindRepository>,
    ) -> Self {
        Self {
            registry,
            clients,
            kinds,
            html: HtmlParts::new(),
        }
    }

    /// `target` is the guid or scope from the path; ignored for email and
    /// everyone sends.
    pub async fn notify(
        &self,
        audience: Audience,
        target: &str,
        request: NotifyRequest,
        caller: &Caller,
    ) -> Result<Vec<Response>> {
        let role = self.validate(audience, &request)?;

        let guid = match audience {
            Audience::Email => request.to.clone().unwrap_or_default(),
            Audience::Everyone => String::new(),
            _ => target.to_string(),
        };

        let client = self.clients.get(&caller.client_id).await?;
        let kind = match &request.kind_id {
            Some(kind_id) => {
                let kind = self
                    .kinds
                    .get(&caller.client_id, kind_id)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "Notification {:?} for client {:?} could not be found",
                            kind_id, caller.client_id
                        ))
                    })?;
                if kind.critical && !caller.has_critical_scope {
                    return Err(Error::Permissions(
                        "Insufficient privileges to send a critical notification".into(),
                    ));
                }
                KindInfo {
                    id: Some(kind.id),
                    description: kind.description,
                    critical: kind.critical,
                }
            }
            None => KindInfo::default(),
        };

        let dispatch = Dispatch {
            guid,
            role,
            message: MessagePayload {
                to: request.to,
                reply_to: request.reply_to,
                subject: request.subject,
                text: request.text,
                html: self.html.split(&request.html),
            },
            kind,
            client: ClientInfo {
                id: caller.client_id.clone(),
                description: client.map(|c| c.description).unwrap_or_default(),
            },
            uaa_host: caller.uaa_host.clone(),
            vcap_request_id: caller.vcap_request_id.clone(),
            received_at: Utc::now(),
        };

        debug!(audience = %audience, target = %dispatch.guid, client_id = %caller.client_id, "Dispatching");
        self.registry.strategy(audience)?.dispatch(dispatch).await
    }

    fn validate(
        &self,
        audience: Audience,
        request: &NotifyRequest,
    ) -> Result<Option<OrganizationRole>> {
        if audience == Audience::Email {
            match request.to.as_deref() {
                Some(to) if !to.trim().is_empty() => {
                    to.parse::<EmailAddress>()
                        .map_err(|_| Error::Validation("\"to\" is improperly formatted".into()))?;
                }
                _ => return Err(Error::Validation("\"to\" is a required field".into())),
            }
        } else if request.kind_id.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(Error::Validation("\"kind_id\" is a required field".into()));
        }

        if request.text.trim().is_empty() && request.html.trim().is_empty() {
            return Err(Error::Validation(
                "\"text\" or \"html\" fields must be supplied".into(),
            ));
        }

        match (&request.role, audience) {
            (None, _) => Ok(None),
            (Some(role), Audience::Org) => role.parse().map(Some),
            (Some(_), _) => Err(Error::Validation(
                "\"role\" is only valid for organization sends".into(),
            )),
        }
    }
}
