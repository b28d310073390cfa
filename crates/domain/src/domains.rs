use std::str::FromStr;

use dmarq_core::{AppError, AppResult, DomainId, GroupId, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Published DMARC policy level of a monitored domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Monitoring only (`p=none`).
    None,
    /// Suspicious mail is quarantined (`p=quarantine`).
    Quarantine,
    /// Failing mail is rejected outright (`p=reject`).
    Reject,
}

impl EnforcementLevel {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Quarantine => "quarantine",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for EnforcementLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "quarantine" => Ok(Self::Quarantine),
            "reject" => Ok(Self::Reject),
            _ => Err(AppError::Validation(format!(
                "unknown enforcement level '{value}'"
            ))),
        }
    }
}

/// A monitored sending domain.
///
/// Owned by the ingestion side; the query engine references it read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredDomain {
    id: DomainId,
    name: NonEmptyString,
    enforcement_level: EnforcementLevel,
    ownership_contact: Option<String>,
}

impl MonitoredDomain {
    /// Creates a validated monitored domain.
    pub fn new(
        id: DomainId,
        name: impl Into<String>,
        enforcement_level: EnforcementLevel,
        ownership_contact: Option<String>,
    ) -> AppResult<Self> {
        let name = name.into().trim().to_ascii_lowercase();

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            enforcement_level,
            ownership_contact: ownership_contact.and_then(|value| {
                let trimmed = value.trim().to_owned();
                (!trimmed.is_empty()).then_some(trimmed)
            }),
        })
    }

    /// Returns the stable identifier.
    #[must_use]
    pub fn id(&self) -> DomainId {
        self.id
    }

    /// Returns the unique lowercased domain name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the published DMARC policy level.
    #[must_use]
    pub fn enforcement_level(&self) -> EnforcementLevel {
        self.enforcement_level
    }

    /// Returns the owning contact, if recorded.
    #[must_use]
    pub fn ownership_contact(&self) -> Option<&str> {
        self.ownership_contact.as_deref()
    }
}

/// A named collection of monitored domains.
///
/// Membership is many-to-many; granting a group grants every member domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainGroup {
    id: GroupId,
    name: NonEmptyString,
}

impl DomainGroup {
    /// Creates a validated domain group.
    pub fn new(id: GroupId, name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
        })
    }

    /// Returns the stable identifier.
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use dmarq_core::DomainId;

    use super::{EnforcementLevel, MonitoredDomain};

    #[test]
    fn enforcement_level_roundtrip_storage_value() {
        for level in [
            EnforcementLevel::None,
            EnforcementLevel::Quarantine,
            EnforcementLevel::Reject,
        ] {
            let restored = EnforcementLevel::from_str(level.as_str());
            assert_eq!(restored.unwrap_or(EnforcementLevel::None), level);
        }
    }

    #[test]
    fn domain_name_is_lowercased() {
        let domain = MonitoredDomain::new(
            DomainId::new(1),
            "Example.COM",
            EnforcementLevel::Reject,
            None,
        );
        assert!(domain.is_ok());
        assert_eq!(
            domain.map(|d| d.name().as_str().to_owned()).as_deref(),
            Ok("example.com")
        );
    }

    #[test]
    fn blank_ownership_contact_is_dropped() {
        let domain = MonitoredDomain::new(
            DomainId::new(1),
            "example.com",
            EnforcementLevel::None,
            Some("   ".to_owned()),
        );
        assert!(domain.is_ok_and(|d| d.ownership_contact().is_none()));
    }
}
