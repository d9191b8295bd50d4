//! 分诊归档
//!
//! 通过持久化网关保存报告和指导，并从存储的行重建分诊引擎。
//! 网关只有插入操作，因此报告行是只追加的快照：每次保存写入一行，
//! `revision` 递增，恢复时按记录取最高版本。行主键由存储分配，
//! 记录自身的标识符保存在 `record_id` 列。

use crate::triage::TriageEngine;
use onco_core::{Guidance, OncoError, PatientReport, RecordId, Result, Row, StoreError};
use onco_store::{tables, OrderBy, PersistenceGateway};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const RECORD_ID: &str = "record_id";
const REVISION: &str = "revision";

/// 分诊归档
pub struct TriageArchive {
    gateway: Arc<dyn PersistenceGateway>,
    /// 每个报告已写入的最高版本，首次保存前从存储读取
    revisions: Mutex<Option<HashMap<RecordId, u64>>>,
}

impl TriageArchive {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            revisions: Mutex::new(None),
        }
    }

    /// 保存报告的当前快照，返回写入的版本号
    ///
    /// 版本号接续存储中已有的快照，重启后的新归档实例不会从 0 重新计数。
    pub async fn save_report(&self, report: &PatientReport) -> Result<u64> {
        let mut guard = self.revisions.lock().await;
        if guard.is_none() {
            *guard = Some(self.stored_revisions().await?);
        }
        let revisions = guard.get_or_insert_with(HashMap::new);
        let revision = revisions.get(&report.id).map_or(0, |r| r + 1);

        let mut row = to_row(report)?;
        row.insert(REVISION.to_string(), Value::from(revision));
        self.gateway.insert(tables::PATIENT_REPORTS, row).await?;

        revisions.insert(report.id.clone(), revision);
        debug!("Archived report {} revision {}", report.id, revision);
        Ok(revision)
    }

    /// 存储中每个报告的最高版本
    async fn stored_revisions(&self) -> Result<HashMap<RecordId, u64>> {
        let rows = self
            .gateway
            .list(tables::PATIENT_REPORTS, &OrderBy::ascending("id"))
            .await?;

        let mut revisions = HashMap::new();
        for row in rows {
            let Some(id) = row.get(RECORD_ID).cloned() else {
                continue;
            };
            let id: RecordId = serde_json::from_value(id).map_err(|e| {
                OncoError::Store(StoreError::Decode(format!("{}: {}", tables::PATIENT_REPORTS, e)))
            })?;
            let revision = row.get(REVISION).and_then(Value::as_u64).unwrap_or(0);
            let entry = revisions.entry(id).or_insert(revision);
            *entry = (*entry).max(revision);
        }

        debug!("Loaded revisions for {} archived reports", revisions.len());
        Ok(revisions)
    }

    /// 追加一条指导
    pub async fn save_guidance(&self, guidance: &Guidance) -> Result<()> {
        let row = to_row(guidance)?;
        self.gateway.insert(tables::GUIDANCES, row).await?;
        debug!("Archived guidance {} for report {}", guidance.id, guidance.report_id);
        Ok(())
    }

    /// 从存储重建分诊引擎
    ///
    /// 报告按首次保存的顺序作为提交顺序，指导按写入顺序组成日志。
    /// 版本相同时以后写入的行为准。
    pub async fn restore(&self) -> Result<TriageEngine> {
        let order = OrderBy::ascending("id");
        let report_rows = self.gateway.list(tables::PATIENT_REPORTS, &order).await?;
        let guidance_rows = self.gateway.list(tables::GUIDANCES, &order).await?;

        let mut submission_order: Vec<RecordId> = Vec::new();
        let mut latest: HashMap<RecordId, (u64, PatientReport)> = HashMap::new();

        for mut row in report_rows {
            let revision = row
                .remove(REVISION)
                .and_then(|value| value.as_u64())
                .unwrap_or(0);
            let report: PatientReport = from_row(tables::PATIENT_REPORTS, row)?;

            match latest.get(&report.id) {
                Some((current, _)) if *current > revision => {}
                Some(_) => {
                    latest.insert(report.id.clone(), (revision, report));
                }
                None => {
                    submission_order.push(report.id.clone());
                    latest.insert(report.id.clone(), (revision, report));
                }
            }
        }

        let guidances = guidance_rows
            .into_iter()
            .map(|row| from_row::<Guidance>(tables::GUIDANCES, row))
            .collect::<Result<Vec<_>>>()?;

        let mut revisions = HashMap::new();
        let mut reports = Vec::with_capacity(submission_order.len());
        for id in submission_order {
            if let Some((revision, report)) = latest.remove(&id) {
                revisions.insert(id, revision);
                reports.push(report);
            }
        }

        info!(
            "Restoring triage state: {} reports, {} guidances",
            reports.len(),
            guidances.len()
        );
        let engine = TriageEngine::seed(reports, guidances)?;
        *self.revisions.lock().await = Some(revisions);
        Ok(engine)
    }
}

impl std::fmt::Debug for TriageArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageArchive").finish_non_exhaustive()
    }
}

/// 记录转为存储行，`id` 移到 `record_id` 列
fn to_row<T: Serialize>(record: &T) -> Result<Row> {
    let mut row = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        other => {
            return Err(OncoError::Store(StoreError::Decode(format!(
                "expected object, got {other}"
            ))))
        }
    };
    if let Some(id) = row.remove("id") {
        row.insert(RECORD_ID.to_string(), id);
    }
    Ok(row)
}

/// 存储行还原为记录，丢弃存储分配的主键
fn from_row<T: DeserializeOwned>(table: &str, mut row: Row) -> Result<T> {
    row.remove("id");
    if let Some(id) = row.remove(RECORD_ID) {
        row.insert("id".to_string(), id);
    }
    serde_json::from_value(Value::Object(row))
        .map_err(|e| OncoError::Store(StoreError::Decode(format!("{}: {}", table, e))))
}
