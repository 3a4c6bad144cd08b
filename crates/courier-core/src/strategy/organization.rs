//! Members of an organization, optionally narrowed to a role

use super::{AudienceResolver, Resolution, Target};
use crate::directory::{Directory, TokenLoader};
use crate::dispatch::Recipient;
use async_trait::async_trait;
use courier_common::types::Audience;
use courier_common::Result;
use std::sync::Arc;

const ENDORSEMENT: &str =
    "You received this message because you belong to the \"{{.Organization}}\" organization.";
const ROLE_ENDORSEMENT: &str = "You received this message because you are an {{.OrganizationRole}} in the \"{{.Organization}}\" organization.";

pub struct OrganizationResolver {
    tokens: Arc<dyn TokenLoader>,
    directory: Arc<dyn Directory>,
}

impl OrganizationResolver {
    pub fn new(tokens: Arc<dyn TokenLoader>, directory: Arc<dyn Directory>) -> Self {
        Self { tokens, directory }
    }
}

#[async_trait]
impl AudienceResolver for OrganizationResolver {
    fn audience(&self) -> Audience {
        Audience::Org
    }

    async fn resolve(&self, target: &Target, uaa_host: &str) -> Result<Resolution> {
        let token = self.tokens.load(uaa_host).await?;

        let organization = self.directory.organization(&token, &target.id).await?;
        let users = self
            .directory
            .users_in_org(&token, &target.id, target.role)
            .await?;

        let endorsement = match target.role {
            Some(_) => ROLE_ENDORSEMENT,
            None => ENDORSEMENT,
        };

        Ok(Resolution {
            recipients: users.into_iter().map(Recipient::user).collect(),
            endorsement: endorsement.to_string(),
            space: None,
            organization: Some(organization),
            scope: target.role.map(|r| r.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Organization;
    use crate::testing::{FakeDirectory, FakeTokens};
    use courier_common::types::OrganizationRole;
    use pretty_assertions::assert_eq;

    fn resolver() -> OrganizationResolver {
        let directory = FakeDirectory::default()
            .with_organization(Organization {
                guid: "org-123".into(),
                name: "acme".into(),
            })
            .with_org_members("org-123", None, &["user-123", "user-456"])
            .with_org_members("org-123", Some(OrganizationRole::OrgManager), &["user-456"]);
        OrganizationResolver::new(Arc::new(FakeTokens::new()), Arc::new(directory))
    }

    #[tokio::test]
    async fn test_all_members_without_role() {
        let resolution = resolver()
            .resolve(&Target::new("org-123"), "")
            .await
            .unwrap();
        assert_eq!(resolution.recipients.len(), 2);
        assert_eq!(resolution.endorsement, ENDORSEMENT);
        assert_eq!(resolution.scope, None);
    }

    #[tokio::test]
    async fn test_role_narrows_members_and_endorsement() {
        let target = Target::new("org-123").with_role(Some(OrganizationRole::OrgManager));
        let resolution = resolver().resolve(&target, "").await.unwrap();

        assert_eq!(resolution.recipients, vec![Recipient::user("user-456")]);
        assert_eq!(
            resolution.endorsement,
            "You received this message because you are an {{.OrganizationRole}} in the \"{{.Organization}}\" organization."
        );
        assert_eq!(resolution.scope.as_deref(), Some("OrgManager"));
    }
}
