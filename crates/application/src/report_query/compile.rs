use chrono::NaiveTime;
use dmarq_domain::ReportFilter;

use crate::access_policy::AccessScope;

use super::plan::{
    AggregatePredicate, DomainConstraint, QueryPlan, ReportSelection, RowPredicate, SortDirection,
    SortField,
};

/// Compiles a normalized filter and resolved scope into a query plan.
///
/// Explicit domain filters are validated against the scope rather than
/// silently intersected: a request naming any out-of-scope domain aborts the
/// whole plan, so the caller returns a clear empty result instead of a
/// confusing partial one. When `for_count` is set, sort and pagination are
/// stripped so the count is order- and page-independent.
#[must_use]
pub fn compile(filter: &ReportFilter, scope: &AccessScope, for_count: bool) -> QueryPlan {
    let mut row_predicates = Vec::new();

    if filter.domains.is_empty() {
        match DomainConstraint::from_scope(scope) {
            None => return QueryPlan::Aborted,
            Some(DomainConstraint::Unrestricted) => {}
            Some(DomainConstraint::DomainIds(ids)) => {
                row_predicates.push(RowPredicate::DomainIdIn(ids));
            }
        }
    } else {
        if filter
            .domains
            .iter()
            .any(|name| !scope.contains_name(name))
        {
            return QueryPlan::Aborted;
        }
        row_predicates.push(RowPredicate::DomainNameIn(filter.domains.clone()));
    }

    if !filter.dispositions.is_empty() {
        row_predicates.push(RowPredicate::DispositionIn(filter.dispositions.clone()));
    }
    if let Some(org_name) = &filter.org_name {
        row_predicates.push(RowPredicate::OrgNameContains(org_name.clone()));
    }
    if let Some(report_id) = &filter.report_id {
        row_predicates.push(RowPredicate::ReportIdEquals(report_id.clone()));
    }
    if let Some(reporter_email) = &filter.reporter_email {
        row_predicates.push(RowPredicate::ReporterEmailContains(reporter_email.clone()));
    }
    if let Some(source_ip) = &filter.source_ip {
        row_predicates.push(RowPredicate::SourceIpMatches(source_ip.clone()));
    }
    if let Some(dkim_result) = filter.dkim_result {
        row_predicates.push(RowPredicate::DkimResultIs(dkim_result));
    }
    if let Some(spf_result) = filter.spf_result {
        row_predicates.push(RowPredicate::SpfResultIs(spf_result));
    }
    if let Some(header_from) = &filter.header_from {
        row_predicates.push(RowPredicate::HeaderFromContains(header_from.clone()));
    }
    if let Some(envelope_from) = &filter.envelope_from {
        row_predicates.push(RowPredicate::EnvelopeFromContains(envelope_from.clone()));
    }
    if let Some(envelope_to) = &filter.envelope_to {
        row_predicates.push(RowPredicate::EnvelopeToContains(envelope_to.clone()));
    }
    if let Some(ownership_contact) = &filter.ownership_contact {
        row_predicates.push(RowPredicate::OwnershipContactContains(
            ownership_contact.clone(),
        ));
    }
    if !filter.enforcement_levels.is_empty() {
        row_predicates.push(RowPredicate::EnforcementLevelIn(
            filter.enforcement_levels.clone(),
        ));
    }
    if let Some(date_from) = filter.date_from {
        row_predicates.push(RowPredicate::RangeBeginsAtOrAfter(
            date_from.and_time(NaiveTime::MIN).and_utc(),
        ));
    }
    if let Some(end_of_day) = filter
        .date_to
        .and_then(|date_to| date_to.and_hms_opt(23, 59, 59))
    {
        row_predicates.push(RowPredicate::RangeEndsAtOrBefore(end_of_day.and_utc()));
    }

    let mut aggregate_predicates = Vec::new();
    if let Some(min_volume) = filter.min_volume {
        aggregate_predicates.push(AggregatePredicate::MinTotalVolume(clamped_i64(min_volume)));
    }
    if let Some(max_volume) = filter.max_volume {
        aggregate_predicates.push(AggregatePredicate::MaxTotalVolume(clamped_i64(max_volume)));
    }
    if filter.has_failures == Some(true) {
        aggregate_predicates.push(AggregatePredicate::HasFailures);
    }

    let selection = if for_count {
        ReportSelection {
            row_predicates,
            aggregate_predicates,
            sort: None,
            limit: None,
            offset: 0,
        }
    } else {
        ReportSelection {
            row_predicates,
            aggregate_predicates,
            sort: Some((
                SortField::resolve(filter.sort_by.as_deref()),
                SortDirection::resolve(filter.sort_dir.as_deref()),
            )),
            limit: filter.limit.map(i64::from),
            offset: i64::from(filter.offset),
        }
    };

    QueryPlan::Ready(selection)
}

fn clamped_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
