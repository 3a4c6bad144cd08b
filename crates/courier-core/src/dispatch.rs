//! Request-scoped values passed from the HTTP boundary to the strategies

use chrono::{DateTime, Utc};
use courier_common::types::{MessageId, OrganizationRole};
use serde::{Deserialize, Serialize};

/// HTML part of a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Html {
    #[serde(default)]
    pub body_content: String,
    #[serde(default)]
    pub body_attributes: String,
    #[serde(default)]
    pub head: String,
    #[serde(default)]
    pub doctype: String,
}

impl Html {
    pub fn is_empty(&self) -> bool {
        self.body_content.trim().is_empty()
    }
}

/// Caller-supplied message payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub to: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: Html,
}

/// Kind the dispatch is sent as
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindInfo {
    pub id: Option<String>,
    pub description: String,
    pub critical: bool,
}

/// Client the dispatch is sent by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub description: String,
}

/// One send request. Built once at the HTTP boundary and handed by value to
/// exactly one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Target identifier: a guid, a scope, or the address of an email send.
    /// Empty for everyone.
    pub guid: String,
    pub role: Option<OrganizationRole>,
    pub message: MessagePayload,
    pub kind: KindInfo,
    pub client: ClientInfo,
    pub uaa_host: String,
    pub vcap_request_id: String,
    pub received_at: DateTime<Utc>,
}

/// Render-ready projection of a dispatch plus what the strategy contributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub to: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: Html,
    pub kind_id: Option<String>,
    pub kind_description: String,
    pub source_description: String,
    pub critical: bool,
    pub role: Option<OrganizationRole>,
    /// Set by the strategy, never by the caller
    pub endorsement: String,
    /// Explicit template; campaigns always carry one
    pub template_id: Option<String>,
}

impl Options {
    pub fn from_dispatch(dispatch: &Dispatch, endorsement: impl Into<String>) -> Self {
        Self {
            to: dispatch.message.to.clone(),
            reply_to: dispatch.message.reply_to.clone(),
            subject: dispatch.message.subject.clone(),
            text: dispatch.message.text.clone(),
            html: dispatch.message.html.clone(),
            kind_id: dispatch.kind.id.clone(),
            kind_description: dispatch.kind.description.clone(),
            source_description: dispatch.client.description.clone(),
            critical: dispatch.kind.critical,
            role: dispatch.role,
            endorsement: endorsement.into(),
            template_id: None,
        }
    }
}

/// A resolved identity. Email recipients carry no guid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub guid: Option<String>,
    pub email: Option<String>,
}

impl Recipient {
    pub fn user(guid: impl Into<String>) -> Self {
        Self {
            guid: Some(guid.into()),
            email: None,
        }
    }

    pub fn email(address: impl Into<String>) -> Self {
        Self {
            guid: None,
            email: Some(address.into()),
        }
    }

    /// Guid for users, address for email recipients
    pub fn identifier(&self) -> &str {
        self.guid
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or_default()
    }
}

/// Per-recipient receipt returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
    pub recipient: String,
    pub notification_id: MessageId,
    pub vcap_request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_identifier() {
        assert_eq!(Recipient::user("user-123").identifier(), "user-123");
        assert_eq!(
            Recipient::email("someone@example.com").identifier(),
            "someone@example.com"
        );
    }

    #[test]
    fn test_options_take_endorsement_from_strategy() {
        let dispatch = Dispatch {
            guid: "org-123".into(),
            role: Some(OrganizationRole::OrgManager),
            message: MessagePayload {
                subject: "hello".into(),
                text: "body".into(),
                ..Default::default()
            },
            kind: KindInfo {
                id: Some("acceptance-test".into()),
                description: "Acceptance".into(),
                critical: false,
            },
            client: ClientInfo {
                id: "notifications-sender".into(),
                description: "Sender".into(),
            },
            uaa_host: "https://uaa.example.com".into(),
            vcap_request_id: "req-1".into(),
            received_at: Utc::now(),
        };

        let options = Options::from_dispatch(&dispatch, "endorsed");
        assert_eq!(options.endorsement, "endorsed");
        assert_eq!(options.kind_id.as_deref(), Some("acceptance-test"));
        assert_eq!(options.source_description, "Sender");
        assert_eq!(options.role, Some(OrganizationRole::OrgManager));
        assert!(options.template_id.is_none());
    }
}
