//! 记录仓库
//!
//! 每种记录一个仓库：包装单张远程数据表，持有本地缓存，提供 `add`、`refresh`、`all`。
//! 缓存是远程表可能过期的镜像，只能通过手动刷新更新；新增记录后不做乐观追加，
//! 而是在同一次调用中重新拉取整张表，让缓存反映存储分配的标识与顺序。

use crate::summary::PatientSummary;
use onco_core::utils::today;
use onco_core::{
    Exam, NursePrescription, Prescription, Record, RecordDraft, RecordId, RepositoryError,
    SideEffect, StoreError, Treatment,
};
use onco_store::{OrderBy, PersistenceGateway};
use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 网关请求默认时限
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 进行中标志的守卫，释放时清除标志
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 单张数据表的记录仓库
pub struct Repository<T: Record> {
    gateway: Arc<dyn PersistenceGateway>,
    cache: RwLock<Vec<T>>,
    in_flight: AtomicBool,
    timeout: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Repository<T> {
    /// 创建空缓存的仓库
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            cache: RwLock::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            _record: PhantomData,
        }
    }

    /// 设置单次网关请求的时限
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    /// 是否有 `add`/`refresh` 正在进行
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 当前缓存，不访问网关
    pub async fn all(&self) -> Vec<T> {
        self.cache.read().await.clone()
    }

    /// 从存储重新拉取整张表并替换缓存
    ///
    /// 失败时缓存保持不变。
    pub async fn refresh(&self) -> Result<(), RepositoryError> {
        let _guard = self.begin()?;
        self.reload().await.map(|_| ())
    }

    /// 校验、写入并刷新
    ///
    /// 校验失败时不访问网关；写入失败时缓存不变。候选数据只被借用，调用方可直接重试。
    /// 写入成功但刷新失败时返回 `Stale`：记录已在存储中，但在下一次成功刷新前本地不可见。
    /// 成功时返回刷新后缓存中新出现的最新记录。
    pub async fn add(&self, draft: &T::Draft) -> Result<T, RepositoryError> {
        draft.validate()?;
        let _guard = self.begin()?;

        let row = draft.to_row(today())?;
        let known: HashSet<RecordId> = self
            .cache
            .read()
            .await
            .iter()
            .map(|record| record.id().clone())
            .collect();

        self.bounded(self.gateway.insert(T::TABLE, row)).await?;
        info!("Inserted new record into {}", T::TABLE);

        let records = self.reload().await.map_err(|e| {
            warn!("Record inserted into {} but refresh failed: {}", T::TABLE, e);
            RepositoryError::Stale(Box::new(e))
        })?;

        // 缓存按最新在前排列，第一条未见过的记录即为本次写入
        records
            .into_iter()
            .find(|record| !known.contains(record.id()))
            .ok_or_else(|| {
                RepositoryError::Stale(Box::new(RepositoryError::StoreRejected(
                    StoreError::NotVisible(T::TABLE.to_string()),
                )))
            })
    }

    fn begin(&self) -> Result<InFlight<'_>, RepositoryError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(&self.in_flight))
            .map_err(|_| {
                debug!("Rejected concurrent operation on {}", T::TABLE);
                RepositoryError::Busy
            })
    }

    /// 拉取并替换缓存，返回新缓存的副本
    async fn reload(&self) -> Result<Vec<T>, RepositoryError> {
        let rows = self
            .bounded(self.gateway.list(T::TABLE, &OrderBy::newest_first()))
            .await?;

        let records = rows
            .into_iter()
            .map(T::from_row)
            .collect::<Result<Vec<T>, StoreError>>()
            .map_err(|e| {
                warn!("Failed to decode rows from {}: {}", T::TABLE, e);
                RepositoryError::StoreRejected(e)
            })?;

        debug!("Refreshed {} with {} records", T::TABLE, records.len());
        *self.cache.write().await = records.clone();
        Ok(records)
    }

    /// 给网关调用加上时限
    async fn bounded<F, R>(&self, call: F) -> Result<R, RepositoryError>
    where
        F: Future<Output = Result<R, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Store call on {} failed: {}", T::TABLE, e);
                Err(RepositoryError::StoreRejected(e))
            }
            Err(_) => {
                warn!("Store call on {} timed out after {:?}", T::TABLE, self.timeout);
                Err(RepositoryError::Timeout(self.timeout))
            }
        }
    }
}

impl<T: Record> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &T::TABLE)
            .field("busy", &self.is_busy())
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub type TreatmentRepository = Repository<Treatment>;
pub type ExamRepository = Repository<Exam>;
pub type PrescriptionRepository = Repository<Prescription>;
pub type NursePrescriptionRepository = Repository<NursePrescription>;
pub type SideEffectRepository = Repository<SideEffect>;

/// 共享同一网关的全部记录仓库
#[derive(Debug)]
pub struct Repositories {
    pub treatments: TreatmentRepository,
    pub exams: ExamRepository,
    pub prescriptions: PrescriptionRepository,
    pub nurse_prescriptions: NursePrescriptionRepository,
    pub side_effects: SideEffectRepository,
}

impl Repositories {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, timeout: Duration) -> Self {
        Self {
            treatments: Repository::new(gateway.clone()).with_timeout(timeout),
            exams: Repository::new(gateway.clone()).with_timeout(timeout),
            prescriptions: Repository::new(gateway.clone()).with_timeout(timeout),
            nurse_prescriptions: Repository::new(gateway.clone()).with_timeout(timeout),
            side_effects: Repository::new(gateway).with_timeout(timeout),
        }
    }

    /// 刷新所有仓库，返回失败的数据表及原因
    pub async fn refresh_all(&self) -> Vec<(&'static str, RepositoryError)> {
        let results = [
            (self.treatments.table(), self.treatments.refresh().await),
            (self.exams.table(), self.exams.refresh().await),
            (self.prescriptions.table(), self.prescriptions.refresh().await),
            (self.nurse_prescriptions.table(), self.nurse_prescriptions.refresh().await),
            (self.side_effects.table(), self.side_effects.refresh().await),
        ];

        results
            .into_iter()
            .filter_map(|(table, result)| result.err().map(|e| (table, e)))
            .collect()
    }

    /// 基于当前缓存的患者概览
    pub async fn summary(&self) -> PatientSummary {
        PatientSummary::compute(
            &self.treatments.all().await,
            &self.exams.all().await,
            &self.prescriptions.all().await,
            &self.nurse_prescriptions.all().await,
            &self.side_effects.all().await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use onco_core::{ExamDraft, Row, TreatmentDraft, ValidationError};
    use onco_store::MemoryGateway;
    use std::sync::atomic::AtomicUsize;

    /// 记录调用次数的网关
    struct CountingGateway {
        inner: MemoryGateway,
        inserts: AtomicUsize,
        lists: AtomicUsize,
    }

    impl CountingGateway {
        fn new() -> Self {
            Self {
                inner: MemoryGateway::new(),
                inserts: AtomicUsize::new(0),
                lists: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PersistenceGateway for CountingGateway {
        async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(table, row).await
        }

        async fn list(&self, table: &str, order: &OrderBy) -> Result<Vec<Row>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list(table, order).await
        }
    }

    /// 永不返回的网关
    struct StalledGateway;

    #[async_trait]
    impl PersistenceGateway for StalledGateway {
        async fn insert(&self, _table: &str, _row: Row) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn list(&self, _table: &str, _order: &OrderBy) -> Result<Vec<Row>, StoreError> {
            std::future::pending().await
        }
    }

    /// 按顺序返回预设列表结果的网关
    struct ScriptedGateway {
        lists: tokio::sync::Mutex<std::collections::VecDeque<Vec<Row>>>,
    }

    impl ScriptedGateway {
        fn new(lists: Vec<Vec<Row>>) -> Self {
            Self {
                lists: tokio::sync::Mutex::new(lists.into()),
            }
        }
    }

    #[async_trait]
    impl PersistenceGateway for ScriptedGateway {
        async fn insert(&self, _table: &str, _row: Row) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list(&self, _table: &str, _order: &OrderBy) -> Result<Vec<Row>, StoreError> {
            Ok(self.lists.lock().await.pop_front().unwrap_or_default())
        }
    }

    fn exam_row(id: i64, exam_type: &str, status: &str) -> Row {
        serde_json::json!({
            "id": id,
            "date": "2025-11-07",
            "type": exam_type,
            "status": status,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn treatment_draft(phase: &str, description: &str) -> TreatmentDraft {
        TreatmentDraft {
            phase: phase.to_string(),
            description: description.to_string(),
            status: String::new(),
        }
    }

    #[tokio::test]
    async fn test_validation_short_circuits_gateway() {
        let gateway = Arc::new(CountingGateway::new());
        let repo = TreatmentRepository::new(gateway.clone());

        let err = repo.add(&treatment_draft("", "x")).await.unwrap_err();
        match err {
            RepositoryError::Validation(ValidationError { missing, .. }) => {
                assert_eq!(missing, vec!["phase"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gateway.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.lists.load(Ordering::SeqCst), 0);
        assert!(repo.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_inserts_then_refreshes() {
        let gateway = Arc::new(CountingGateway::new());
        let repo = TreatmentRepository::new(gateway.clone());

        let created = repo
            .add(&treatment_draft("Quimioterapia", "Sessão 1 - Protocolo AC"))
            .await
            .unwrap();
        assert_eq!(created.id, RecordId::from(1_i64));
        assert_eq!(created.date, today());
        assert_eq!(gateway.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.lists.load(Ordering::SeqCst), 1);

        let second = repo
            .add(&treatment_draft("Radioterapia", "Planejamento inicial"))
            .await
            .unwrap();
        let ids: Vec<RecordId> = repo.all().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, created.id]);
    }

    #[tokio::test]
    async fn test_refresh_drops_entries_missing_from_store() {
        let first = vec![
            exam_row(30, "Tomografia", "solicitado"),
            exam_row(20, "Hemograma", "realizado"),
            exam_row(10, "Ressonância", "solicitado"),
        ];
        // 第二次列表更短、顺序不同，且不含之前的任何标识符
        let second = vec![
            exam_row(7, "PET-CT", "solicitado"),
            exam_row(9, "Biópsia", "realizado"),
        ];
        let gateway = Arc::new(ScriptedGateway::new(vec![first, second.clone()]));
        let repo = ExamRepository::new(gateway);

        repo.refresh().await.unwrap();
        assert_eq!(repo.all().await.len(), 3);

        repo.refresh().await.unwrap();
        let expected: Vec<Exam> = second
            .into_iter()
            .map(|row| Exam::from_row(row).unwrap())
            .collect();
        assert_eq!(repo.all().await, expected);
    }

    #[tokio::test]
    async fn test_refresh_replaces_cache() {
        let gateway = Arc::new(MemoryGateway::new());
        let repo = ExamRepository::new(gateway.clone());
        repo.add(&ExamDraft {
            exam_type: "Hemograma completo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        // 其他终端直接写入存储
        let mut row = Row::new();
        row.insert("id".into(), serde_json::json!(50));
        row.insert("date".into(), serde_json::json!("2025-11-10"));
        row.insert("type".into(), serde_json::json!("Tomografia"));
        row.insert("status".into(), serde_json::json!("solicitado"));
        gateway.seed("exams", vec![row]).await.unwrap();

        repo.refresh().await.unwrap();
        let expected: Vec<Row> = gateway.list("exams", &OrderBy::newest_first()).await.unwrap();
        let cached = repo.all().await;
        assert_eq!(cached.len(), expected.len());
        for (exam, row) in cached.iter().zip(expected) {
            assert_eq!(exam, &Exam::from_row(row).unwrap());
        }
        assert_eq!(cached[0].exam_type, "Tomografia");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_cache() {
        let gateway = Arc::new(MemoryGateway::new());
        let repo = ExamRepository::new(gateway.clone());
        repo.add(&ExamDraft {
            exam_type: "Hemograma completo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        gateway
            .fail_next_list(StoreError::Transport("connection reset".to_string()))
            .await;
        let err = repo.refresh().await.unwrap_err();
        assert!(matches!(err, RepositoryError::StoreRejected(StoreError::Transport(_))));
        assert_eq!(repo.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_leaves_cache_and_draft() {
        let gateway = Arc::new(MemoryGateway::new());
        let repo = TreatmentRepository::new(gateway.clone());
        let draft = treatment_draft("Cirurgia", "Mastectomia parcial");

        gateway
            .fail_next_insert(StoreError::Rejected {
                status: 500,
                message: "internal".to_string(),
            })
            .await;
        let err = repo.add(&draft).await.unwrap_err();
        assert!(matches!(err, RepositoryError::StoreRejected(StoreError::Rejected { status: 500, .. })));
        assert!(err.is_retryable());
        assert!(repo.all().await.is_empty());

        // 同一候选数据可直接重试
        let created = repo.add(&draft).await.unwrap();
        assert_eq!(created.description, "Mastectomia parcial");
    }

    #[tokio::test]
    async fn test_refresh_failure_after_insert_is_stale() {
        let gateway = Arc::new(MemoryGateway::new());
        let repo = TreatmentRepository::new(gateway.clone());
        repo.add(&treatment_draft("Quimioterapia", "Sessão 1")).await.unwrap();
        let before = repo.all().await;

        gateway
            .fail_next_list(StoreError::Transport("timeout".to_string()))
            .await;
        let err = repo.add(&treatment_draft("Quimioterapia", "Sessão 2")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Stale(_)));
        assert_eq!(repo.all().await, before);
        assert_eq!(gateway.len("treatments").await, 2);

        // 下一次成功刷新后可见
        repo.refresh().await.unwrap();
        assert_eq!(repo.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_gateway_times_out() {
        let repo = SideEffectRepository::new(Arc::new(StalledGateway))
            .with_timeout(Duration::from_millis(20));

        let err = repo.refresh().await.unwrap_err();
        assert_eq!(err, RepositoryError::Timeout(Duration::from_millis(20)));
        assert!(!repo.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_operation_is_busy() {
        let repo = Arc::new(
            SideEffectRepository::new(Arc::new(StalledGateway)).with_timeout(Duration::from_millis(200)),
        );

        let background = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.refresh().await })
        };
        while !repo.is_busy() {
            tokio::task::yield_now().await;
        }

        assert_eq!(repo.refresh().await.unwrap_err(), RepositoryError::Busy);
        assert!(matches!(
            background.await.unwrap(),
            Err(RepositoryError::Timeout(_))
        ));
        assert!(!repo.is_busy());
    }

    #[tokio::test]
    async fn test_refresh_all_and_summary() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let repos = Repositories::new(gateway, DEFAULT_REQUEST_TIMEOUT);
        repos
            .exams
            .add(&ExamDraft {
                exam_type: "Tomografia".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(repos.refresh_all().await.is_empty());
        let summary = repos.summary().await;
        assert_eq!(summary.exams.total, 1);
        assert_eq!(summary.exams.pending, 1);
        assert_eq!(summary.treatments.total, 0);
    }
}
