//! SQL rendering for compiled report selections.
//!
//! Every user-supplied literal goes through `push_bind`; the only raw text
//! pushed into a query is code-owned column names and fixed expressions.

use dmarq_core::DomainId;
use dmarq_application::{
    AggregatePredicate, DomainConstraint, ReportSelection, RowPredicate, SortDirection, SortField,
};
use sqlx::{Postgres, QueryBuilder};

/// Record-level non-compliance predicate.
///
/// This is the one definition of "failure"; the failure-volume column, the
/// `has_failures` HAVING clause, and the analytics failure sums all reference
/// it, so the expressions can never drift apart.
pub(crate) const FAILURE_CONDITION: &str = "(records.disposition IN ('quarantine', 'reject') \
     OR records.dkim_result = 'fail' OR records.spf_result = 'fail')";

pub(crate) const TOTAL_VOLUME_EXPR: &str = "COALESCE(SUM(records.message_count), 0)::BIGINT";

const DKIM_PASS_VOLUME_EXPR: &str =
    "COALESCE(SUM(records.message_count) FILTER (WHERE records.dkim_result = 'pass'), 0)::BIGINT";

const SPF_PASS_VOLUME_EXPR: &str =
    "COALESCE(SUM(records.message_count) FILTER (WHERE records.spf_result = 'pass'), 0)::BIGINT";

const REPORT_SOURCE: &str = " FROM aggregate_reports reports \
     INNER JOIN domains ON domains.id = reports.domain_id \
     LEFT JOIN aggregate_records records ON records.report_id = reports.id";

pub(crate) fn push_failure_volume(builder: &mut QueryBuilder<'_, Postgres>) {
    builder.push("COALESCE(SUM(records.message_count) FILTER (WHERE ");
    builder.push(FAILURE_CONDITION);
    builder.push("), 0)::BIGINT");
}

fn push_disposition_volume(builder: &mut QueryBuilder<'_, Postgres>, disposition: &str) {
    builder.push("COALESCE(SUM(records.message_count) FILTER (WHERE records.disposition = '");
    builder.push(disposition);
    builder.push("'), 0)::BIGINT");
}

/// Builds the paginated page query with per-report aggregate columns.
pub(crate) fn build_page_query(selection: &ReportSelection) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT domains.name AS domain_name, reports.org_name, \
         reports.external_report_id AS report_id, reports.range_begin, reports.range_end, \
         reports.received_at, COUNT(records.id) AS record_count, ",
    );
    builder.push(TOTAL_VOLUME_EXPR);
    builder.push(" AS total_volume, ");
    push_disposition_volume(&mut builder, "none");
    builder.push(" AS none_volume, ");
    push_disposition_volume(&mut builder, "quarantine");
    builder.push(" AS quarantine_volume, ");
    push_disposition_volume(&mut builder, "reject");
    builder.push(" AS reject_volume, ");
    builder.push(DKIM_PASS_VOLUME_EXPR);
    builder.push(" AS dkim_pass_volume, ");
    builder.push(SPF_PASS_VOLUME_EXPR);
    builder.push(" AS spf_pass_volume, ");
    push_failure_volume(&mut builder);
    builder.push(" AS failure_volume");
    builder.push(REPORT_SOURCE);

    push_row_predicates(&mut builder, &selection.row_predicates);
    builder.push(" GROUP BY reports.id, domains.id");
    push_aggregate_predicates(&mut builder, &selection.aggregate_predicates);

    if let Some((field, direction)) = selection.sort {
        builder.push(" ORDER BY ");
        push_sort_expression(&mut builder, field);
        match direction {
            SortDirection::Asc => builder.push(" ASC"),
            SortDirection::Desc => builder.push(" DESC"),
        };
        if field != SortField::ReceivedAt {
            builder.push(", reports.received_at DESC");
        }
    }

    if let Some(limit) = selection.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    builder.push(" OFFSET ");
    builder.push_bind(selection.offset);

    builder
}

/// Builds the order- and page-independent count query.
///
/// The grouped-and-filtered selection is wrapped in `COUNT(*)` so the total
/// honors the same HAVING set as the page query.
pub(crate) fn build_count_query(selection: &ReportSelection) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT COUNT(*) AS total FROM (SELECT reports.id",
    );
    builder.push(REPORT_SOURCE);
    push_row_predicates(&mut builder, &selection.row_predicates);
    builder.push(" GROUP BY reports.id, domains.id");
    push_aggregate_predicates(&mut builder, &selection.aggregate_predicates);
    builder.push(") AS matching_reports");

    builder
}

/// Appends ` AND <column> IN (...)` for a restricted constraint.
///
/// Analytics queries reuse this with their own column so domain authorization
/// is rendered by exactly one piece of code.
pub(crate) fn push_domain_constraint(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    constraint: &DomainConstraint,
) {
    let DomainConstraint::DomainIds(ids) = constraint else {
        return;
    };

    builder.push(" AND ");
    push_domain_id_in(builder, column, ids);
}

fn push_domain_id_in(builder: &mut QueryBuilder<'_, Postgres>, column: &str, ids: &[DomainId]) {
    builder.push(column);
    builder.push(" IN (");
    let mut values = builder.separated(", ");
    for id in ids {
        values.push_bind(id.as_i64());
    }
    builder.push(")");
}

fn push_row_predicates(builder: &mut QueryBuilder<'_, Postgres>, predicates: &[RowPredicate]) {
    for (index, predicate) in predicates.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        push_row_predicate(builder, predicate);
    }
}

fn push_row_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &RowPredicate) {
    match predicate {
        RowPredicate::DomainNameIn(names) => {
            builder.push("domains.name IN (");
            let mut values = builder.separated(", ");
            for name in names {
                values.push_bind(name.clone());
            }
            builder.push(")");
        }
        RowPredicate::DomainIdIn(ids) => {
            push_domain_id_in(builder, "reports.domain_id", ids);
        }
        RowPredicate::DispositionIn(dispositions) => {
            builder.push("records.disposition IN (");
            let mut values = builder.separated(", ");
            for disposition in dispositions {
                values.push_bind(disposition.as_str());
            }
            builder.push(")");
        }
        RowPredicate::OrgNameContains(value) => {
            builder.push("reports.org_name ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::ReportIdEquals(value) => {
            builder.push("reports.external_report_id = ");
            builder.push_bind(value.clone());
        }
        RowPredicate::ReporterEmailContains(value) => {
            builder.push("reports.reporter_email ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::SourceIpMatches(value) => {
            builder.push("records.source_ip LIKE ");
            builder.push_bind(wildcard_pattern(value));
        }
        RowPredicate::DkimResultIs(result) => {
            builder.push("records.dkim_result = ");
            builder.push_bind(result.as_str());
        }
        RowPredicate::SpfResultIs(result) => {
            builder.push("records.spf_result = ");
            builder.push_bind(result.as_str());
        }
        RowPredicate::HeaderFromContains(value) => {
            builder.push("records.header_from ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::EnvelopeFromContains(value) => {
            builder.push("records.envelope_from ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::EnvelopeToContains(value) => {
            builder.push("records.envelope_to ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::OwnershipContactContains(value) => {
            builder.push("domains.ownership_contact ILIKE ");
            builder.push_bind(contains_pattern(value));
        }
        RowPredicate::EnforcementLevelIn(levels) => {
            builder.push("domains.enforcement_level IN (");
            let mut values = builder.separated(", ");
            for level in levels {
                values.push_bind(level.as_str());
            }
            builder.push(")");
        }
        RowPredicate::RangeBeginsAtOrAfter(at) => {
            builder.push("reports.range_begin >= ");
            builder.push_bind(*at);
        }
        RowPredicate::RangeEndsAtOrBefore(at) => {
            builder.push("reports.range_end <= ");
            builder.push_bind(*at);
        }
    }
}

fn push_aggregate_predicates(
    builder: &mut QueryBuilder<'_, Postgres>,
    predicates: &[AggregatePredicate],
) {
    for (index, predicate) in predicates.iter().enumerate() {
        builder.push(if index == 0 { " HAVING " } else { " AND " });
        match predicate {
            AggregatePredicate::MinTotalVolume(value) => {
                builder.push(TOTAL_VOLUME_EXPR);
                builder.push(" >= ");
                builder.push_bind(*value);
            }
            AggregatePredicate::MaxTotalVolume(value) => {
                builder.push(TOTAL_VOLUME_EXPR);
                builder.push(" <= ");
                builder.push_bind(*value);
            }
            AggregatePredicate::HasFailures => {
                push_failure_volume(builder);
                builder.push(" > 0");
            }
        }
    }
}

fn push_sort_expression(builder: &mut QueryBuilder<'_, Postgres>, field: SortField) {
    match field {
        SortField::ReceivedAt => {
            builder.push("reports.received_at");
        }
        SortField::Domain => {
            builder.push("domains.name");
        }
        SortField::OrgName => {
            builder.push("reports.org_name");
        }
        SortField::BeginDate => {
            builder.push("reports.range_begin");
        }
        SortField::TotalVolume => {
            builder.push(TOTAL_VOLUME_EXPR);
        }
        SortField::FailureVolume => {
            push_failure_volume(builder);
        }
        SortField::DkimPassVolume => {
            builder.push(DKIM_PASS_VOLUME_EXPR);
        }
        SortField::SpfPassVolume => {
            builder.push(SPF_PASS_VOLUME_EXPR);
        }
        SortField::RecordCount => {
            builder.push("COUNT(records.id)");
        }
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

/// Substring pattern where a caller's literal `*` acts as a SQL wildcard.
fn wildcard_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value).replace('*', "%"))
}

#[cfg(test)]
mod tests {
    use dmarq_core::DomainId;
    use dmarq_application::{
        AggregatePredicate, ReportSelection, RowPredicate, SortDirection, SortField,
    };

    use super::{
        FAILURE_CONDITION, build_count_query, build_page_query, contains_pattern,
        wildcard_pattern,
    };

    fn selection(
        row_predicates: Vec<RowPredicate>,
        aggregate_predicates: Vec<AggregatePredicate>,
    ) -> ReportSelection {
        ReportSelection {
            row_predicates,
            aggregate_predicates,
            sort: Some((SortField::ReceivedAt, SortDirection::Desc)),
            limit: Some(25),
            offset: 0,
        }
    }

    #[test]
    fn user_values_never_appear_in_the_sql_text() {
        let hostile = "'; DROP TABLE aggregate_reports; --".to_owned();
        let built = build_page_query(&selection(
            vec![
                RowPredicate::OrgNameContains(hostile.clone()),
                RowPredicate::DomainNameIn(vec![hostile.clone()]),
            ],
            Vec::new(),
        ));
        assert!(!built.sql().contains("DROP TABLE"));
    }

    #[test]
    fn failure_fragment_is_shared_between_select_and_having() {
        let built = build_page_query(&selection(
            Vec::new(),
            vec![AggregatePredicate::HasFailures],
        ));
        assert_eq!(built.sql().matches(FAILURE_CONDITION).count(), 2);
    }

    #[test]
    fn count_query_has_no_ordering_or_pagination() {
        let built = build_count_query(&ReportSelection {
            row_predicates: vec![RowPredicate::DomainIdIn(vec![DomainId::new(1)])],
            aggregate_predicates: vec![AggregatePredicate::MinTotalVolume(100)],
            sort: None,
            limit: None,
            offset: 0,
        });
        let sql = built.sql();
        assert!(!sql.contains("ORDER BY"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.contains("HAVING"));
        assert!(sql.starts_with("SELECT COUNT(*)"));
    }

    #[test]
    fn aggregate_sorts_reuse_the_aggregate_expressions() {
        let built = build_page_query(&ReportSelection {
            row_predicates: Vec::new(),
            aggregate_predicates: Vec::new(),
            sort: Some((SortField::FailureVolume, SortDirection::Desc)),
            limit: None,
            offset: 0,
        });
        let sql = built.sql();
        assert!(sql.contains("ORDER BY"));
        // Once in the select list, once in the sort expression.
        assert_eq!(sql.matches(FAILURE_CONDITION).count(), 2);
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn star_translates_to_a_sql_wildcard() {
        assert_eq!(wildcard_pattern("192.0.2.*"), "%192.0.2.%%");
        assert_eq!(wildcard_pattern("10.0.%.1"), "%10.0.\\%.1%");
    }
}
