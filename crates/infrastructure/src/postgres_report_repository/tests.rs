use dmarq_application::{
    AggregatePredicate, ReportQueryExecutor, ReportSelection, RowPredicate, SortDirection,
    SortField,
};
use dmarq_core::DomainId;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresReportRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres report tests: {error}");
    }

    Some(pool)
}

async fn seed_reports(pool: &PgPool) {
    let statements = [
        "INSERT INTO domains (id, name, enforcement_level, ownership_contact)
         VALUES (9001, 'dmarq-test-a.example', 'none', 'postmaster@dmarq-test-a.example'),
                (9002, 'dmarq-test-b.example', 'reject', NULL)
         ON CONFLICT (id) DO NOTHING",
        "INSERT INTO aggregate_reports
             (id, domain_id, org_name, reporter_email, external_report_id,
              range_begin, range_end, received_at, is_processed)
         VALUES
             (8001, 9001, 'org-a', 'noreply@org-a.example', 'rpt-a-1',
              '2024-03-01T00:00:00Z', '2024-03-01T23:59:59Z', '2024-03-02T04:00:00Z', TRUE),
             (8002, 9002, 'org-b', NULL, 'rpt-b-1',
              '2024-03-01T00:00:00Z', '2024-03-01T23:59:59Z', '2024-03-02T05:00:00Z', TRUE),
             (8003, 9001, 'org-a', 'noreply@org-a.example', 'rpt-a-2',
              '2024-03-02T00:00:00Z', '2024-03-02T23:59:59Z', '2024-03-03T04:00:00Z', TRUE)
         ON CONFLICT (id) DO NOTHING",
        "INSERT INTO aggregate_records
             (id, report_id, source_ip, message_count, disposition,
              dkim_result, spf_result, header_from, envelope_from, envelope_to)
         VALUES
             (7001, 8001, '198.51.100.7', 10, 'quarantine', 'fail', 'pass',
              'dmarq-test-a.example', 'bounce@dmarq-test-a.example', NULL),
             (7002, 8001, '198.51.100.8', 5, 'none', 'pass', 'pass',
              'dmarq-test-a.example', NULL, NULL),
             (7003, 8002, '203.0.113.9', 7, 'reject', 'fail', 'fail',
              'dmarq-test-b.example', NULL, NULL),
             (7004, 8003, '198.51.100.8', 20, 'none', 'pass', 'pass',
              'dmarq-test-a.example', NULL, NULL)
         ON CONFLICT (id) DO NOTHING",
    ];

    for statement in statements {
        let inserted = sqlx::query(statement).execute(pool).await;
        assert!(inserted.is_ok(), "seed statement failed: {inserted:?}");
    }
}

fn scoped_selection(domain_ids: Vec<i64>) -> ReportSelection {
    ReportSelection {
        row_predicates: vec![RowPredicate::DomainIdIn(
            domain_ids.into_iter().map(DomainId::new).collect(),
        )],
        aggregate_predicates: Vec::new(),
        sort: Some((SortField::ReceivedAt, SortDirection::Desc)),
        limit: None,
        offset: 0,
    }
}

#[tokio::test]
async fn page_rows_stay_inside_the_domain_scope() {
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_reports(&pool).await;

    let repository = PostgresReportRepository::new(pool);
    let rows = repository.fetch_rows(&scoped_selection(vec![9001])).await;

    assert!(rows.as_ref().is_ok_and(|rows| rows.len() == 2));
    assert!(rows.is_ok_and(|rows| {
        rows.iter().all(|row| row.domain_name == "dmarq-test-a.example")
    }));
}

#[tokio::test]
async fn count_matches_the_page_predicates() {
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_reports(&pool).await;

    let repository = PostgresReportRepository::new(pool);
    let mut selection = scoped_selection(vec![9001, 9002]);
    selection.sort = None;

    let total = repository.count_reports(&selection).await;
    assert_eq!(total.ok(), Some(3));
}

#[tokio::test]
async fn aggregate_columns_and_has_failures_agree() {
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_reports(&pool).await;

    let repository = PostgresReportRepository::new(pool);
    let mut selection = scoped_selection(vec![9001]);
    selection.aggregate_predicates = vec![AggregatePredicate::HasFailures];

    let rows = repository.fetch_rows(&selection).await;
    assert!(rows.as_ref().is_ok_and(|rows| rows.len() == 1));
    assert!(rows.is_ok_and(|rows| {
        rows.first().is_some_and(|row| {
            row.report_id == "rpt-a-1"
                && row.total_volume == 15
                && row.failure_volume == 10
                && row.quarantine_volume == 10
                && row.none_volume == 5
                && row.dkim_pass_volume == 5
                && row.spf_pass_volume == 15
                && row.record_count == 2
        })
    }));

    let mut count_selection = scoped_selection(vec![9001]);
    count_selection.sort = None;
    count_selection.aggregate_predicates = vec![AggregatePredicate::HasFailures];
    let total = repository.count_reports(&count_selection).await;
    assert_eq!(total.ok(), Some(1));
}

#[tokio::test]
async fn volume_bounds_apply_after_grouping() {
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_reports(&pool).await;

    let repository = PostgresReportRepository::new(pool);
    let mut selection = scoped_selection(vec![9001]);
    selection.aggregate_predicates = vec![AggregatePredicate::MinTotalVolume(16)];

    let rows = repository.fetch_rows(&selection).await;
    assert!(rows.is_ok_and(|rows| {
        rows.len() == 1 && rows.first().is_some_and(|row| row.report_id == "rpt-a-2")
    }));
}
