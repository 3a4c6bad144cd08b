//! Direct send to one user guid

use super::{AudienceResolver, Resolution, Target};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::Result;

/// Single recipient, no directory lookup and no endorsement
pub struct UserResolver;

#[async_trait]
impl AudienceResolver for UserResolver {
    fn audience(&self) -> Audience {
        Audience::User
    }

    async fn resolve(&self, target: &Target, _uaa_host: &str) -> Result<Resolution> {
        Ok(Resolution {
            recipients: vec![Recipient::user(target.id.clone())],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_resolves_to_itself() {
        let resolution = UserResolver
            .resolve(&Target::new("user-123"), "")
            .await
            .unwrap();
        assert_eq!(resolution.recipients, vec![Recipient::user("user-123")]);
        assert!(resolution.endorsement.is_empty());
    }
}
