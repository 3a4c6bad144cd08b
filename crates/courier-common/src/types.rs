//! Common types for Courier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for messages (the `notification_id` callers see)
pub type MessageId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for queued jobs
pub type JobId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string, tolerating a `Name <addr>` wrapper
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = match (s.rfind('<'), s.rfind('>')) {
            (Some(start), Some(end)) if start < end => &s[start + 1..end],
            _ => s,
        };
        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(local, domain))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Audience kinds a notification can be addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    User,
    Email,
    Space,
    Org,
    Scope,
    Everyone,
}

impl Audience {
    pub const ALL: [Audience; 6] = [
        Audience::User,
        Audience::Email,
        Audience::Space,
        Audience::Org,
        Audience::Scope,
        Audience::Everyone,
    ];
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::User => write!(f, "user"),
            Audience::Email => write!(f, "email"),
            Audience::Space => write!(f, "space"),
            Audience::Org => write!(f, "org"),
            Audience::Scope => write!(f, "scope"),
            Audience::Everyone => write!(f, "everyone"),
        }
    }
}

impl std::str::FromStr for Audience {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Audience::User),
            "email" => Ok(Audience::Email),
            "space" => Ok(Audience::Space),
            "org" => Ok(Audience::Org),
            "scope" => Ok(Audience::Scope),
            "everyone" => Ok(Audience::Everyone),
            other => Err(crate::Error::Validation(format!(
                "{} is not a valid audience",
                other
            ))),
        }
    }
}

/// Organization roles a notification can be narrowed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrganizationRole {
    OrgManager,
    OrgAuditor,
    BillingManager,
}

impl std::fmt::Display for OrganizationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrganizationRole::OrgManager => write!(f, "OrgManager"),
            OrganizationRole::OrgAuditor => write!(f, "OrgAuditor"),
            OrganizationRole::BillingManager => write!(f, "BillingManager"),
        }
    }
}

impl std::str::FromStr for OrganizationRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OrgManager" => Ok(OrganizationRole::OrgManager),
            "OrgAuditor" => Ok(OrganizationRole::OrgAuditor),
            "BillingManager" => Ok(OrganizationRole::BillingManager),
            other => Err(crate::Error::Validation(format!(
                "{:?} is not a valid role",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");

        let named = EmailAddress::parse("Jane Doe <jane@example.com>").unwrap();
        assert_eq!(named.to_string(), "jane@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_audience_keys() {
        for audience in Audience::ALL {
            assert_eq!(audience.to_string().parse::<Audience>().unwrap(), audience);
        }
        assert!("orgs".parse::<Audience>().is_err());
    }

    #[test]
    fn test_organization_role_parse() {
        assert_eq!(
            "OrgManager".parse::<OrganizationRole>().unwrap(),
            OrganizationRole::OrgManager
        );
        let err = "SpaceDeveloper".parse::<OrganizationRole>().unwrap_err();
        assert_eq!(err.status_code(), 422);
    }
}
