use std::str::FromStr;

use chrono::{DateTime, Utc};
use dmarq_core::{AppError, AppResult, DomainId, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Policy action a receiver applied to a set of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// No action taken.
    None,
    /// Messages were quarantined.
    Quarantine,
    /// Messages were rejected.
    Reject,
}

impl Disposition {
    /// Returns a stable storage value for this disposition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Quarantine => "quarantine",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for Disposition {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "quarantine" => Ok(Self::Quarantine),
            "reject" => Ok(Self::Reject),
            _ => Err(AppError::Validation(format!(
                "unknown disposition '{value}'"
            ))),
        }
    }
}

/// Per-mechanism authentication outcome reported for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthResult {
    /// The mechanism passed.
    Pass,
    /// The mechanism failed.
    Fail,
    /// SPF soft-fail.
    SoftFail,
    /// Neutral result.
    Neutral,
    /// Temporary evaluation error.
    TempError,
    /// Permanent evaluation error.
    PermError,
    /// No result was produced.
    None,
}

impl AuthResult {
    /// Returns a stable storage value for this result.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::SoftFail => "softfail",
            Self::Neutral => "neutral",
            Self::TempError => "temperror",
            Self::PermError => "permerror",
            Self::None => "none",
        }
    }
}

impl FromStr for AuthResult {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "softfail" => Ok(Self::SoftFail),
            "neutral" => Ok(Self::Neutral),
            "temperror" => Ok(Self::TempError),
            "permerror" => Ok(Self::PermError),
            "none" => Ok(Self::None),
            _ => Err(AppError::Validation(format!(
                "unknown authentication result '{value}'"
            ))),
        }
    }
}

/// One ingested DMARC aggregate report.
///
/// Immutable once stored; only the processed marker changes after ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    domain_id: DomainId,
    org_name: NonEmptyString,
    reporter_email: Option<String>,
    external_report_id: NonEmptyString,
    range_begin: DateTime<Utc>,
    range_end: DateTime<Utc>,
    received_at: DateTime<Utc>,
    is_processed: bool,
}

impl AggregateReport {
    /// Creates a validated aggregate report.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domain_id: DomainId,
        org_name: impl Into<String>,
        reporter_email: Option<String>,
        external_report_id: impl Into<String>,
        range_begin: DateTime<Utc>,
        range_end: DateTime<Utc>,
        received_at: DateTime<Utc>,
        is_processed: bool,
    ) -> AppResult<Self> {
        if range_end < range_begin {
            return Err(AppError::Validation(
                "report range end must not precede range begin".to_owned(),
            ));
        }

        Ok(Self {
            domain_id,
            org_name: NonEmptyString::new(org_name)?,
            reporter_email: reporter_email.and_then(|value| {
                let trimmed = value.trim().to_owned();
                (!trimmed.is_empty()).then_some(trimmed)
            }),
            external_report_id: NonEmptyString::new(external_report_id)?,
            range_begin,
            range_end,
            received_at,
            is_processed,
        })
    }

    /// Returns the monitored domain this report describes.
    #[must_use]
    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    /// Returns the reporting organization name.
    #[must_use]
    pub fn org_name(&self) -> &NonEmptyString {
        &self.org_name
    }

    /// Returns the reporter contact email, if provided.
    #[must_use]
    pub fn reporter_email(&self) -> Option<&str> {
        self.reporter_email.as_deref()
    }

    /// Returns the reporter-assigned report identifier.
    #[must_use]
    pub fn external_report_id(&self) -> &NonEmptyString {
        &self.external_report_id
    }

    /// Returns the inclusive start of the reported range.
    #[must_use]
    pub fn range_begin(&self) -> DateTime<Utc> {
        self.range_begin
    }

    /// Returns the inclusive end of the reported range.
    #[must_use]
    pub fn range_end(&self) -> DateTime<Utc> {
        self.range_end
    }

    /// Returns the receipt timestamp.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns whether post-ingest processing has run.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.is_processed
    }
}

/// One row within an aggregate report.
///
/// Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    source_ip: NonEmptyString,
    message_count: u64,
    disposition: Disposition,
    dkim_result: AuthResult,
    spf_result: AuthResult,
    header_from: Option<String>,
    envelope_from: Option<String>,
    envelope_to: Option<String>,
}

impl AggregateRecord {
    /// Creates a validated aggregate record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_ip: impl Into<String>,
        message_count: u64,
        disposition: Disposition,
        dkim_result: AuthResult,
        spf_result: AuthResult,
        header_from: Option<String>,
        envelope_from: Option<String>,
        envelope_to: Option<String>,
    ) -> AppResult<Self> {
        if message_count == 0 {
            return Err(AppError::Validation(
                "record message count must be at least one".to_owned(),
            ));
        }

        Ok(Self {
            source_ip: NonEmptyString::new(source_ip)?,
            message_count,
            disposition,
            dkim_result,
            spf_result,
            header_from: trimmed_identifier(header_from),
            envelope_from: trimmed_identifier(envelope_from),
            envelope_to: trimmed_identifier(envelope_to),
        })
    }

    /// Returns the sending IP address.
    #[must_use]
    pub fn source_ip(&self) -> &NonEmptyString {
        &self.source_ip
    }

    /// Returns the number of messages this row covers.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Returns the applied policy action.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Returns the DKIM outcome.
    #[must_use]
    pub fn dkim_result(&self) -> AuthResult {
        self.dkim_result
    }

    /// Returns the SPF outcome.
    #[must_use]
    pub fn spf_result(&self) -> AuthResult {
        self.spf_result
    }

    /// Returns the RFC5322.From domain, if reported.
    #[must_use]
    pub fn header_from(&self) -> Option<&str> {
        self.header_from.as_deref()
    }

    /// Returns the envelope sender, if reported.
    #[must_use]
    pub fn envelope_from(&self) -> Option<&str> {
        self.envelope_from.as_deref()
    }

    /// Returns the envelope recipient, if reported.
    #[must_use]
    pub fn envelope_to(&self) -> Option<&str> {
        self.envelope_to.as_deref()
    }

    /// Returns whether this row counts toward failure volume.
    ///
    /// A row is non-compliant when it was quarantined or rejected, or when
    /// either DKIM or SPF reported an outright failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self.disposition, Disposition::None)
            || self.dkim_result == AuthResult::Fail
            || self.spf_result == AuthResult::Fail
    }
}

fn trimmed_identifier(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{AggregateRecord, AuthResult, Disposition};

    #[test]
    fn auth_result_roundtrip_storage_value() {
        for value in [
            AuthResult::Pass,
            AuthResult::Fail,
            AuthResult::SoftFail,
            AuthResult::Neutral,
            AuthResult::TempError,
            AuthResult::PermError,
            AuthResult::None,
        ] {
            let restored = AuthResult::from_str(value.as_str());
            assert_eq!(restored.unwrap_or(AuthResult::Pass), value);
        }
    }

    #[test]
    fn zero_message_count_is_rejected() {
        let record = AggregateRecord::new(
            "192.0.2.10",
            0,
            Disposition::None,
            AuthResult::Pass,
            AuthResult::Pass,
            None,
            None,
            None,
        );
        assert!(record.is_err());
    }

    #[test]
    fn quarantined_record_counts_as_failure() {
        let record = AggregateRecord::new(
            "192.0.2.10",
            3,
            Disposition::Quarantine,
            AuthResult::Pass,
            AuthResult::Pass,
            None,
            None,
            None,
        );
        assert!(record.is_ok_and(|r| r.is_failure()));
    }

    #[test]
    fn passing_record_is_not_a_failure() {
        let record = AggregateRecord::new(
            "192.0.2.10",
            3,
            Disposition::None,
            AuthResult::Pass,
            AuthResult::SoftFail,
            None,
            None,
            None,
        );
        assert!(record.is_ok_and(|r| !r.is_failure()));
    }
}
