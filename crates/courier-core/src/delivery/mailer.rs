//! Outbound mail transport

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::config::SmtpConfig;
use courier_common::types::MessageId;
use courier_common::{Error, Result};
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// A rendered notification addressed to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub client_id: String,
    pub notification_id: MessageId,
    pub request_received: Option<DateTime<Utc>>,
}

/// Result of a delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the relay
    Sent,
    /// Should retry
    TemporaryFailure { error: String },
    /// Should not retry
    PermanentFailure { error: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &ComposedMessage) -> SendOutcome;
}

macro_rules! text_header {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

text_header!(ClientIdHeader, "X-CF-Client-ID");
text_header!(NotificationIdHeader, "X-CF-Notification-ID");
text_header!(RequestReceivedHeader, "X-CF-Notification-Request-Received");

/// SMTP relay mailer
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| Error::Config(format!("Invalid smtp.sender: {}", e)))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Config(format!("Invalid SMTP relay: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Config(format!("Invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    /// Build the MIME message, including the X-CF headers
    pub fn build_email(&self, message: &ComposedMessage) -> Result<Message> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| Error::Validation(format!("Invalid recipient address: {}", e)))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ClientIdHeader(message.client_id.clone()))
            .header(NotificationIdHeader(message.notification_id.to_string()));

        if let Some(received) = message.request_received {
            builder = builder.header(RequestReceivedHeader(received.to_rfc3339()));
        }
        if let Some(reply_to) = &message.reply_to {
            let reply_to: Mailbox = reply_to
                .parse()
                .map_err(|e| Error::Validation(format!("Invalid reply_to address: {}", e)))?;
            builder = builder.reply_to(reply_to);
        }

        let email = match (&message.text, &message.html) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text.clone()))
                    .singlepart(SinglePart::html(html.clone())),
            ),
            (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, None) => builder.body(String::new()),
        };

        email.map_err(|e| Error::Validation(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &ComposedMessage) -> SendOutcome {
        let email = match self.build_email(message) {
            Ok(email) => email,
            Err(e) => {
                return SendOutcome::PermanentFailure {
                    error: e.to_string(),
                }
            }
        };

        match self.transport.send(email).await {
            Ok(response) => {
                debug!(notification_id = %message.notification_id, code = %response.code(), "Email accepted");
                SendOutcome::Sent
            }
            Err(e) if e.is_permanent() => SendOutcome::PermanentFailure {
                error: e.to_string(),
            },
            Err(e) => SendOutcome::TemporaryFailure {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(&SmtpConfig {
            sender: "no-reply@example.com".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn message() -> ComposedMessage {
        ComposedMessage {
            to: "user-123@example.com".into(),
            reply_to: Some("ops@example.com".into()),
            subject: "my-special-subject".into(),
            text: Some("hello".into()),
            html: None,
            client_id: "notifications-sender".into(),
            notification_id: Uuid::now_v7(),
            request_received: None,
        }
    }

    #[tokio::test]
    async fn test_build_email_carries_cf_headers() {
        let message = message();
        let raw = String::from_utf8(mailer().build_email(&message).unwrap().formatted()).unwrap();

        assert!(raw.contains("X-CF-Client-ID: notifications-sender"));
        assert!(raw.contains(&format!("X-CF-Notification-ID: {}", message.notification_id)));
        assert!(raw.contains("To: user-123@example.com"));
        assert!(raw.contains("Reply-To: ops@example.com"));
        assert!(raw.contains("Subject: my-special-subject"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let mut message = message();
        message.to = "not an address".into();
        assert!(matches!(
            mailer().build_email(&message),
            Err(Error::Validation(_))
        ));
    }
}
