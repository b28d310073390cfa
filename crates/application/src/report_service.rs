use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dmarq_core::{AppResult, Principal};
use dmarq_domain::{Permission, ReportFilter};

use crate::access_policy::AccessPolicy;
use crate::report_query::{QueryPlan, ReportSelection, compile};

/// One aggregated report row returned to callers.
///
/// Aggregate columns are computed per report by the store; the failure volume
/// uses the same predicate as the `has_failures` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Monitored domain name.
    pub domain_name: String,
    /// Reporting organization name.
    pub org_name: String,
    /// Reporter-assigned report identifier.
    pub report_id: String,
    /// Inclusive start of the reported range.
    pub range_begin: DateTime<Utc>,
    /// Inclusive end of the reported range.
    pub range_end: DateTime<Utc>,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
    /// Number of rows in the report.
    pub record_count: i64,
    /// Summed message volume.
    pub total_volume: i64,
    /// Volume with disposition `none`.
    pub none_volume: i64,
    /// Volume with disposition `quarantine`.
    pub quarantine_volume: i64,
    /// Volume with disposition `reject`.
    pub reject_volume: i64,
    /// Volume with a passing DKIM outcome.
    pub dkim_pass_volume: i64,
    /// Volume with a passing SPF outcome.
    pub spf_pass_volume: i64,
    /// Non-compliant volume.
    pub failure_volume: i64,
}

/// One page of report rows plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPage {
    /// Rows for the requested page.
    pub rows: Vec<ReportRow>,
    /// Total reports matching the full predicate set, page-independent.
    pub total_count: u64,
    /// Current page number, 1-based.
    pub page: u32,
    /// Total pages under the effective page size.
    pub total_pages: u32,
    /// Effective page size; `None` for unbounded queries.
    pub per_page: Option<u32>,
}

impl ReportPage {
    fn assemble(rows: Vec<ReportRow>, total_count: u64, filter: &ReportFilter) -> Self {
        let per_page = filter.limit;
        let page = per_page
            .filter(|size| *size > 0)
            .map(|size| filter.offset / size + 1)
            .unwrap_or(1);
        let total_pages = per_page
            .filter(|size| *size > 0)
            .map(|size| u32::try_from(total_count.div_ceil(u64::from(size))).unwrap_or(u32::MAX))
            .unwrap_or(u32::from(total_count > 0));

        Self {
            rows,
            total_count,
            page,
            total_pages,
            per_page,
        }
    }

    fn empty(filter: &ReportFilter) -> Self {
        Self::assemble(Vec::new(), 0, filter)
    }
}

/// Store port executing compiled report selections.
#[async_trait]
pub trait ReportQueryExecutor: Send + Sync {
    /// Fetches aggregated report rows for a selection.
    async fn fetch_rows(&self, selection: &ReportSelection) -> AppResult<Vec<ReportRow>>;

    /// Counts reports matching a selection's full predicate set.
    async fn count_reports(&self, selection: &ReportSelection) -> AppResult<u64>;
}

/// Application service producing authorization-scoped report pages.
#[derive(Clone)]
pub struct ReportService {
    access_policy: AccessPolicy,
    executor: Arc<dyn ReportQueryExecutor>,
}

impl ReportService {
    /// Creates a service from an access policy and a store executor.
    #[must_use]
    pub fn new(access_policy: AccessPolicy, executor: Arc<dyn ReportQueryExecutor>) -> Self {
        Self {
            access_policy,
            executor,
        }
    }

    /// Fetches one page of reports plus the page-independent total.
    ///
    /// Both the row plan and the count plan are compiled from the same
    /// normalized filter, so the total honors the exact WHERE and HAVING set
    /// used for the page. A scope or domain-validation abort yields an empty
    /// page without touching the store; store faults propagate.
    pub async fn fetch_page(
        &self,
        principal: &Principal,
        filter: &ReportFilter,
    ) -> AppResult<ReportPage> {
        self.access_policy
            .require_permission(principal, Permission::ReportsView)?;
        let scope = self.access_policy.accessible_domains(principal).await?;

        let QueryPlan::Ready(selection) = compile(filter, &scope, false) else {
            return Ok(ReportPage::empty(filter));
        };
        let rows = self.executor.fetch_rows(&selection).await?;

        let total_count = match compile(filter, &scope, true) {
            QueryPlan::Ready(count_selection) => {
                self.executor.count_reports(&count_selection).await?
            }
            QueryPlan::Aborted => 0,
        };

        Ok(ReportPage::assemble(rows, total_count, filter))
    }

    /// Fetches every matching row without pagination, for export.
    pub async fn export_rows(
        &self,
        principal: &Principal,
        filter: &ReportFilter,
    ) -> AppResult<Vec<ReportRow>> {
        self.access_policy
            .require_permission(principal, Permission::ReportsExport)?;
        let scope = self.access_policy.accessible_domains(principal).await?;

        let unbounded = ReportFilter {
            limit: None,
            offset: 0,
            ..filter.clone()
        };
        match compile(&unbounded, &scope, false) {
            QueryPlan::Aborted => Ok(Vec::new()),
            QueryPlan::Ready(selection) => self.executor.fetch_rows(&selection).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use dmarq_core::{AppError, AppResult, DomainId, GroupId, Principal, Role};
    use dmarq_domain::ReportFilter;
    use tokio::sync::Mutex;

    use crate::access_policy::{
        AccessGrantRepository, AccessPolicy, AccessibleDomain,
    };
    use crate::report_query::{ReportSelection, RowPredicate};

    use super::{ReportQueryExecutor, ReportRow, ReportService};

    struct FakeGrants {
        domains: HashMap<String, Vec<AccessibleDomain>>,
    }

    #[async_trait]
    impl AccessGrantRepository for FakeGrants {
        async fn list_accessible_domains(
            &self,
            subject: &str,
        ) -> AppResult<Vec<AccessibleDomain>> {
            Ok(self.domains.get(subject).cloned().unwrap_or_default())
        }

        async fn is_group_granted(&self, _subject: &str, _group_id: GroupId) -> AppResult<bool> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        rows: Vec<ReportRow>,
        total: u64,
        fetched: Mutex<Vec<ReportSelection>>,
        counted: Mutex<Vec<ReportSelection>>,
    }

    #[async_trait]
    impl ReportQueryExecutor for RecordingExecutor {
        async fn fetch_rows(&self, selection: &ReportSelection) -> AppResult<Vec<ReportRow>> {
            self.fetched.lock().await.push(selection.clone());
            Ok(self.rows.clone())
        }

        async fn count_reports(&self, selection: &ReportSelection) -> AppResult<u64> {
            self.counted.lock().await.push(selection.clone());
            Ok(self.total)
        }
    }

    fn sample_row() -> ReportRow {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single();
        let at = at.unwrap_or_default();
        ReportRow {
            domain_name: "a.com".to_owned(),
            org_name: "google.com".to_owned(),
            report_id: "rep-1".to_owned(),
            range_begin: at,
            range_end: at,
            received_at: at,
            record_count: 2,
            total_volume: 120,
            none_volume: 100,
            quarantine_volume: 15,
            reject_volume: 5,
            dkim_pass_volume: 100,
            spf_pass_volume: 110,
            failure_volume: 20,
        }
    }

    fn service_for(
        domains: &[(&str, i64, &str)],
        executor: Arc<RecordingExecutor>,
    ) -> ReportService {
        let mut map: HashMap<String, Vec<AccessibleDomain>> = HashMap::new();
        for (subject, id, name) in domains {
            map.entry((*subject).to_owned()).or_default().push(
                AccessibleDomain {
                    id: DomainId::new(*id),
                    name: (*name).to_owned(),
                },
            );
        }
        ReportService::new(
            AccessPolicy::new(Arc::new(FakeGrants { domains: map })),
            executor,
        )
    }

    fn viewer() -> Principal {
        Principal::new("alice", "Alice", None, Role::Viewer)
    }

    #[tokio::test]
    async fn empty_scope_returns_empty_page_without_querying() {
        let executor = Arc::new(RecordingExecutor::default());
        let service = service_for(&[], executor.clone());

        let page = service.fetch_page(&viewer(), &ReportFilter::default()).await;
        assert!(page.as_ref().is_ok_and(|p| p.rows.is_empty() && p.total_count == 0));
        assert!(executor.fetched.lock().await.is_empty());
        assert!(executor.counted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_scope_domain_filter_returns_empty_page() {
        let executor = Arc::new(RecordingExecutor::default());
        let service = service_for(&[("alice", 1, "a.com")], executor.clone());

        let filter = ReportFilter {
            domains: vec!["a.com".to_owned(), "b.com".to_owned()],
            ..ReportFilter::default()
        };
        let page = service.fetch_page(&viewer(), &filter).await;
        assert!(page.is_ok_and(|p| p.rows.is_empty() && p.total_count == 0));
        assert!(executor.fetched.lock().await.is_empty());
    }

    #[tokio::test]
    async fn scoped_page_query_carries_the_domain_id_predicate() {
        let executor = Arc::new(RecordingExecutor {
            rows: vec![sample_row()],
            total: 1,
            ..RecordingExecutor::default()
        });
        let service = service_for(&[("alice", 1, "a.com")], executor.clone());

        let page = service.fetch_page(&viewer(), &ReportFilter::default()).await;
        assert!(page.is_ok_and(|p| p.rows.len() == 1 && p.total_count == 1));

        let fetched = executor.fetched.lock().await;
        assert!(fetched.iter().all(|selection| {
            selection
                .row_predicates
                .contains(&RowPredicate::DomainIdIn(vec![DomainId::new(1)]))
        }));
        let counted = executor.counted.lock().await;
        assert!(counted.iter().all(|selection| {
            selection.sort.is_none() && selection.limit.is_none() && selection.offset == 0
        }));
    }

    #[tokio::test]
    async fn pagination_metadata_reflects_the_effective_page_size() {
        let executor = Arc::new(RecordingExecutor {
            rows: vec![sample_row()],
            total: 120,
            ..RecordingExecutor::default()
        });
        let service = service_for(&[("alice", 1, "a.com")], executor);

        let filter = ReportFilter {
            limit: Some(50),
            offset: 100,
            ..ReportFilter::default()
        };
        let page = service.fetch_page(&viewer(), &filter).await;
        assert!(page.is_ok_and(|p| {
            p.page == 3 && p.total_pages == 3 && p.per_page == Some(50) && p.total_count == 120
        }));
    }

    #[tokio::test]
    async fn export_requires_the_export_permission() {
        let executor = Arc::new(RecordingExecutor::default());
        let service = service_for(&[("alice", 1, "a.com")], executor);

        let denied = service
            .export_rows(&viewer(), &ReportFilter::default())
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn export_strips_pagination_from_the_plan() {
        let executor = Arc::new(RecordingExecutor::default());
        let service = service_for(&[("carol", 1, "a.com")], executor.clone());
        let exporter = Principal::new("carol", "Carol", None, Role::DomainAdmin);

        let filter = ReportFilter {
            limit: Some(25),
            offset: 75,
            ..ReportFilter::default()
        };
        let rows = service.export_rows(&exporter, &filter).await;
        assert!(rows.is_ok());

        let fetched = executor.fetched.lock().await;
        assert!(fetched.iter().all(|selection| {
            selection.limit.is_none() && selection.offset == 0
        }));
    }
}
