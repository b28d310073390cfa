use chrono::{DateTime, Utc};
use dmarq_core::DomainId;
use dmarq_domain::{AuthResult, Disposition, EnforcementLevel};

use crate::access_policy::AccessScope;

/// Sort targets a caller may request by logical name.
///
/// Anything outside this allow-list falls back to [`SortField::ReceivedAt`];
/// the mapping to SQL expressions lives with the store adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Report receipt time.
    ReceivedAt,
    /// Domain name.
    Domain,
    /// Reporting organization name.
    OrgName,
    /// Report range begin.
    BeginDate,
    /// Summed message volume.
    TotalVolume,
    /// Summed non-compliant message volume.
    FailureVolume,
    /// Summed DKIM-passing message volume.
    DkimPassVolume,
    /// Summed SPF-passing message volume.
    SpfPassVolume,
    /// Number of rows in the report.
    RecordCount,
}

impl SortField {
    /// Resolves a requested sort field, falling back to `received_at`.
    #[must_use]
    pub fn resolve(requested: Option<&str>) -> Self {
        match requested {
            Some("received_at") => Self::ReceivedAt,
            Some("domain") => Self::Domain,
            Some("org_name") => Self::OrgName,
            Some("begin_date") => Self::BeginDate,
            Some("total_volume") => Self::TotalVolume,
            Some("failure_volume") => Self::FailureVolume,
            Some("dkim_pass_volume") => Self::DkimPassVolume,
            Some("spf_pass_volume") => Self::SpfPassVolume,
            Some("record_count") => Self::RecordCount,
            _ => Self::ReceivedAt,
        }
    }

    /// Returns the logical name of this sort field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceivedAt => "received_at",
            Self::Domain => "domain",
            Self::OrgName => "org_name",
            Self::BeginDate => "begin_date",
            Self::TotalVolume => "total_volume",
            Self::FailureVolume => "failure_volume",
            Self::DkimPassVolume => "dkim_pass_volume",
            Self::SpfPassVolume => "spf_pass_volume",
            Self::RecordCount => "record_count",
        }
    }
}

/// Sort direction restricted to ASC/DESC, defaulting to DESC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Resolves a requested direction, falling back to descending.
    #[must_use]
    pub fn resolve(requested: Option<&str>) -> Self {
        match requested.map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }
}

/// A row-level predicate applied before grouping (`WHERE`).
///
/// Every variant carries owned values; the store adapter binds each one as a
/// query parameter, never as interpolated text.
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    /// Exact match against a set of domain names.
    DomainNameIn(Vec<String>),
    /// Authorization scope: membership in the visible domain-id set.
    DomainIdIn(Vec<DomainId>),
    /// Record disposition membership.
    DispositionIn(Vec<Disposition>),
    /// Reporting-organization substring match.
    OrgNameContains(String),
    /// Exact reporter-assigned report id.
    ReportIdEquals(String),
    /// Reporter-email substring match.
    ReporterEmailContains(String),
    /// Source-IP substring match; a literal `*` becomes a SQL wildcard.
    SourceIpMatches(String),
    /// Exact DKIM outcome.
    DkimResultIs(AuthResult),
    /// Exact SPF outcome.
    SpfResultIs(AuthResult),
    /// Header-from substring match.
    HeaderFromContains(String),
    /// Envelope-from substring match.
    EnvelopeFromContains(String),
    /// Envelope-to substring match.
    EnvelopeToContains(String),
    /// Domain ownership-contact substring match.
    OwnershipContactContains(String),
    /// Domain enforcement-level membership.
    EnforcementLevelIn(Vec<EnforcementLevel>),
    /// Report range begin at or after this instant.
    RangeBeginsAtOrAfter(DateTime<Utc>),
    /// Report range end at or before this instant.
    RangeEndsAtOrBefore(DateTime<Utc>),
}

/// An aggregate-level predicate applied after grouping (`HAVING`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatePredicate {
    /// Summed message volume at least this value.
    MinTotalVolume(i64),
    /// Summed message volume at most this value.
    MaxTotalVolume(i64),
    /// Summed failure volume greater than zero.
    HasFailures,
}

/// Domain visibility constraint shared by report and analytics queries.
///
/// This is the single authorization fragment: the report compiler turns it
/// into a [`RowPredicate::DomainIdIn`], while analytics adapters render it
/// against a caller-supplied column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainConstraint {
    /// No domain predicate is applied.
    Unrestricted,
    /// Membership in the visible domain-id set.
    DomainIds(Vec<DomainId>),
}

impl DomainConstraint {
    /// Derives the constraint from a resolved scope.
    ///
    /// Returns `None` for an empty scope, which callers must translate into
    /// an empty result rather than an unrestricted query.
    #[must_use]
    pub fn from_scope(scope: &AccessScope) -> Option<Self> {
        match scope {
            AccessScope::Unrestricted => Some(Self::Unrestricted),
            AccessScope::Domains(domains) if domains.is_empty() => None,
            AccessScope::Domains(domains) => {
                Some(Self::DomainIds(domains.keys().copied().collect()))
            }
        }
    }
}

/// A compiled, parameter-bound selection over the report store.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSelection {
    /// Predicates applied before grouping.
    pub row_predicates: Vec<RowPredicate>,
    /// Predicates applied after grouping.
    pub aggregate_predicates: Vec<AggregatePredicate>,
    /// Resolved sort, absent for count plans.
    pub sort: Option<(SortField, SortDirection)>,
    /// Maximum rows returned; `None` means unbounded.
    pub limit: Option<i64>,
    /// Rows skipped for offset pagination.
    pub offset: i64,
}

/// Outcome of query compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Authorization or domain validation failed; callers return an empty
    /// result, never an error.
    Aborted,
    /// A selection ready for execution.
    Ready(ReportSelection),
}

impl QueryPlan {
    /// Returns the selection when the plan is executable.
    #[must_use]
    pub fn selection(&self) -> Option<&ReportSelection> {
        match self {
            Self::Aborted => None,
            Self::Ready(selection) => Some(selection),
        }
    }
}
