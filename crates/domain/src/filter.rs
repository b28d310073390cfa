use std::str::FromStr;

use chrono::NaiveDate;
use dmarq_core::{AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domains::EnforcementLevel;
use crate::report::{AuthResult, Disposition};

/// Page sizes a caller may request through `per_page`.
pub const ALLOWED_PAGE_SIZES: [u32; 3] = [25, 50, 100];

/// Page size applied when a caller paginates without choosing one.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Canonical, validated shape of a caller's report filter intent.
///
/// Produced exclusively by [`ReportFilter::normalize`]; individual invalid
/// values are dropped during normalization rather than failing the request.
/// Serialization uses the raw filter key names so a normalized filter
/// round-trips through [`ReportFilter::normalize`] unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Exact domain-name matches.
    #[serde(rename = "domain", default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    /// Policy-action matches.
    #[serde(rename = "disposition", default, skip_serializing_if = "Vec::is_empty")]
    pub dispositions: Vec<Disposition>,
    /// Inclusive lower bound on the report range begin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the report range end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    /// Reporting-organization substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    /// Reporter-email substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_email: Option<String>,
    /// Source-IP substring; a literal `*` acts as a wildcard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// Header-from substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_from: Option<String>,
    /// Envelope-from substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_from: Option<String>,
    /// Envelope-to substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_to: Option<String>,
    /// Domain ownership-contact substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_contact: Option<String>,
    /// Exact DKIM outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dkim_result: Option<AuthResult>,
    /// Exact SPF outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spf_result: Option<AuthResult>,
    /// Domain enforcement-level matches.
    #[serde(
        rename = "enforcement_level",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub enforcement_levels: Vec<EnforcementLevel>,
    /// Exact reporter-assigned report identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// Lower bound on summed message volume per report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<u64>,
    /// Upper bound on summed message volume per report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_volume: Option<u64>,
    /// When true, only reports with non-zero failure volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_failures: Option<bool>,
    /// Requested sort field, validated later against the compiler allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Requested sort direction, validated later by the compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_dir: Option<String>,
    /// Maximum rows returned; `None` means unbounded (export).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Rows skipped for offset pagination.
    #[serde(default)]
    pub offset: u32,
}

impl ReportFilter {
    /// Normalizes raw, loosely-typed filter input into the canonical shape.
    ///
    /// Unknown keys are dropped, strings are trimmed, multi-valued fields
    /// accept a scalar or a list, and any individually invalid value is
    /// dropped rather than failing the whole request. The function is pure
    /// and idempotent: re-normalizing a serialized result is a no-op.
    #[must_use]
    pub fn normalize(raw: &Map<String, Value>) -> Self {
        let mut dispositions = enum_values::<Disposition>(raw.get("disposition"));
        if dispositions.is_empty() {
            // Legacy alias kept for saved filters created before the rename.
            dispositions = enum_values::<Disposition>(raw.get("policy_result"));
        }

        let limit = raw.get("limit").and_then(positive_u32).or_else(|| {
            raw.get("per_page")
                .and_then(positive_u32)
                .map(nearest_allowed_page_size)
        });

        let offset = raw
            .get("offset")
            .and_then(non_negative_u64)
            .and_then(|value| u32::try_from(value).ok())
            .or_else(|| {
                raw.get("page").and_then(positive_u32).map(|page| {
                    (page - 1).saturating_mul(limit.unwrap_or(DEFAULT_PAGE_SIZE))
                })
            })
            .unwrap_or(0);

        Self {
            domains: string_values(raw.get("domain"))
                .into_iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            dispositions,
            date_from: date_value(raw.get("date_from")),
            date_to: date_value(raw.get("date_to")),
            org_name: trimmed_string(raw.get("org_name")),
            reporter_email: trimmed_string(raw.get("reporter_email")),
            source_ip: trimmed_string(raw.get("source_ip")),
            header_from: trimmed_string(raw.get("header_from")),
            envelope_from: trimmed_string(raw.get("envelope_from")),
            envelope_to: trimmed_string(raw.get("envelope_to")),
            ownership_contact: trimmed_string(raw.get("ownership_contact")),
            dkim_result: enum_value::<AuthResult>(raw.get("dkim_result")),
            spf_result: enum_value::<AuthResult>(raw.get("spf_result")),
            enforcement_levels: enum_values::<EnforcementLevel>(raw.get("enforcement_level")),
            report_id: trimmed_string(raw.get("report_id")),
            min_volume: raw.get("min_volume").and_then(non_negative_u64),
            max_volume: raw.get("max_volume").and_then(non_negative_u64),
            has_failures: raw.get("has_failures").and_then(bool_value),
            sort_by: trimmed_string(raw.get("sort_by")),
            sort_dir: trimmed_string(raw.get("sort_dir")),
            limit,
            offset,
        }
    }

    /// Re-runs normalization on this filter's serialized form.
    ///
    /// Used when loading persisted filters so a stored blob always yields the
    /// canonical shape even if it predates a validation rule.
    #[must_use]
    pub fn renormalized(&self) -> Self {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Self::normalize(&map),
            _ => self.clone(),
        }
    }
}

fn trimmed_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).and_then(|text| {
        let trimmed = text.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

fn string_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(_)) => trimmed_string(value).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| trimmed_string(Some(item)))
            .collect(),
        _ => Vec::new(),
    }
}

fn enum_value<T: FromStr>(value: Option<&Value>) -> Option<T> {
    trimmed_string(value).and_then(|text| T::from_str(&text.to_ascii_lowercase()).ok())
}

fn enum_values<T: FromStr>(value: Option<&Value>) -> Vec<T> {
    string_values(value)
        .into_iter()
        .filter_map(|text| T::from_str(&text.to_ascii_lowercase()).ok())
        .collect()
}

fn date_value(value: Option<&Value>) -> Option<NaiveDate> {
    trimmed_string(value).and_then(|text| NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok())
}

fn bool_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn non_negative_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn positive_u32(value: &Value) -> Option<u32> {
    non_negative_u64(value)
        .and_then(|number| u32::try_from(number).ok())
        .filter(|number| *number > 0)
}

fn nearest_allowed_page_size(requested: u32) -> u32 {
    ALLOWED_PAGE_SIZES
        .into_iter()
        .min_by_key(|allowed| allowed.abs_diff(requested))
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// A named filter persisted for one owner.
///
/// The engine only defines the canonical shape persistence must round-trip;
/// storage itself is a thin collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    id: Uuid,
    owner_subject: NonEmptyString,
    name: NonEmptyString,
    filter: ReportFilter,
}

impl SavedFilter {
    /// Creates a validated saved filter.
    pub fn new(
        id: Uuid,
        owner_subject: impl Into<String>,
        name: impl Into<String>,
        filter: ReportFilter,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            owner_subject: NonEmptyString::new(owner_subject)?,
            name: NonEmptyString::new(name)?,
            filter,
        })
    }

    /// Returns the stable identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning subject.
    #[must_use]
    pub fn owner_subject(&self) -> &NonEmptyString {
        &self.owner_subject
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the stored filter.
    #[must_use]
    pub fn filter(&self) -> &ReportFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Map, Value, json};

    use crate::report::Disposition;

    use super::{DEFAULT_PAGE_SIZE, ReportFilter};

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let filter = ReportFilter::normalize(&raw(json!({
            "domain": "Example.com",
            "favourite_colour": "green"
        })));
        assert_eq!(filter.domains, vec!["example.com".to_owned()]);
        assert_eq!(filter, filter.renormalized());
    }

    #[test]
    fn multi_valued_fields_accept_scalar_or_list() {
        let scalar = ReportFilter::normalize(&raw(json!({"disposition": "REJECT"})));
        assert_eq!(scalar.dispositions, vec![Disposition::Reject]);

        let list = ReportFilter::normalize(&raw(json!({
            "disposition": ["reject", "quarantine", "bogus", "  "]
        })));
        assert_eq!(
            list.dispositions,
            vec![Disposition::Reject, Disposition::Quarantine]
        );
    }

    #[test]
    fn invalid_elements_leave_the_field_absent() {
        let filter = ReportFilter::normalize(&raw(json!({
            "disposition": ["bogus", ""],
            "dkim_result": "maybe",
            "min_volume": -5,
            "has_failures": "sometimes"
        })));
        assert!(filter.dispositions.is_empty());
        assert!(filter.dkim_result.is_none());
        assert!(filter.min_volume.is_none());
        assert!(filter.has_failures.is_none());
    }

    #[test]
    fn policy_result_alias_promotes_to_disposition() {
        let filter = ReportFilter::normalize(&raw(json!({"policy_result": "quarantine"})));
        assert_eq!(filter.dispositions, vec![Disposition::Quarantine]);

        let explicit = ReportFilter::normalize(&raw(json!({
            "disposition": "none",
            "policy_result": "quarantine"
        })));
        assert_eq!(explicit.dispositions, vec![Disposition::None]);
    }

    #[test]
    fn limit_treats_non_positive_as_unbounded() {
        assert_eq!(
            ReportFilter::normalize(&raw(json!({"limit": 50}))).limit,
            Some(50)
        );
        assert_eq!(ReportFilter::normalize(&raw(json!({"limit": 0}))).limit, None);
        assert_eq!(
            ReportFilter::normalize(&raw(json!({"limit": null}))).limit,
            None
        );
    }

    #[test]
    fn per_page_is_coerced_to_nearest_allowed_size() {
        let filter = ReportFilter::normalize(&raw(json!({"per_page": 37, "page": 3})));
        assert_eq!(filter.limit, Some(25));
        assert_eq!(filter.offset, 50);

        let large = ReportFilter::normalize(&raw(json!({"per_page": 90})));
        assert_eq!(large.limit, Some(100));
    }

    #[test]
    fn offset_is_clamped_to_zero() {
        let filter = ReportFilter::normalize(&raw(json!({"offset": -10})));
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn page_without_per_page_uses_the_default_size() {
        let filter = ReportFilter::normalize(&raw(json!({"page": 2})));
        assert_eq!(filter.offset, DEFAULT_PAGE_SIZE);
        assert_eq!(filter.limit, None);
    }

    #[test]
    fn sort_fields_pass_through_verbatim() {
        let filter = ReportFilter::normalize(&raw(json!({
            "sort_by": "definitely_not_a_column",
            "sort_dir": "DESC"
        })));
        assert_eq!(filter.sort_by.as_deref(), Some("definitely_not_a_column"));
        assert_eq!(filter.sort_dir.as_deref(), Some("DESC"));
    }

    #[test]
    fn normalized_filter_survives_json_roundtrip() {
        let filter = ReportFilter::normalize(&raw(json!({
            "domain": ["a.com", "b.com"],
            "disposition": "reject",
            "date_from": "2024-01-01",
            "date_to": "2024-01-31",
            "source_ip": "192.0.2.*",
            "min_volume": 1000,
            "has_failures": true,
            "per_page": 37
        })));

        let encoded = serde_json::to_string(&filter);
        assert!(encoded.is_ok());
        let decoded = encoded
            .ok()
            .and_then(|text| serde_json::from_str::<ReportFilter>(&text).ok());
        assert_eq!(decoded.as_ref(), Some(&filter));
        assert_eq!(filter.renormalized(), filter);
    }

    fn raw_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<String>().prop_map(Value::String),
            any::<i64>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(Value::Bool),
            Just(Value::Null),
        ]
    }

    fn raw_entry() -> impl Strategy<Value = Value> {
        prop_oneof![
            raw_scalar(),
            proptest::collection::vec(raw_scalar(), 0..4).prop_map(Value::Array),
        ]
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            entries in proptest::collection::hash_map(
                prop_oneof![
                    Just("domain".to_owned()),
                    Just("disposition".to_owned()),
                    Just("policy_result".to_owned()),
                    Just("date_from".to_owned()),
                    Just("source_ip".to_owned()),
                    Just("dkim_result".to_owned()),
                    Just("min_volume".to_owned()),
                    Just("max_volume".to_owned()),
                    Just("has_failures".to_owned()),
                    Just("sort_by".to_owned()),
                    Just("limit".to_owned()),
                    Just("offset".to_owned()),
                    Just("page".to_owned()),
                    Just("per_page".to_owned()),
                    any::<String>(),
                ],
                raw_entry(),
                0..10,
            )
        ) {
            let map = entries.into_iter().collect::<Map<String, Value>>();
            let once = ReportFilter::normalize(&map);
            prop_assert_eq!(once.renormalized(), once);
        }
    }
}
