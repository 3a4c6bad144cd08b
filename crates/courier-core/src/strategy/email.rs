//! Direct send to a raw email address

use super::{AudienceResolver, Resolution, Target};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::Result;

/// Single address recipient without a guid
pub struct EmailResolver;

#[async_trait]
impl AudienceResolver for EmailResolver {
    fn audience(&self) -> Audience {
        Audience::Email
    }

    async fn resolve(&self, target: &Target, _uaa_host: &str) -> Result<Resolution> {
        Ok(Resolution {
            recipients: vec![Recipient::email(target.id.clone())],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_email_recipient_has_no_guid() {
        let resolution = EmailResolver
            .resolve(&Target::new("someone@example.com"), "")
            .await
            .unwrap();
        assert_eq!(resolution.recipients.len(), 1);
        assert!(resolution.recipients[0].guid.is_none());
        assert_eq!(resolution.recipients[0].identifier(), "someone@example.com");
    }
}
