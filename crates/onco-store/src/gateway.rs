//! 持久化网关接口
//!
//! 远程表格存储的最小契约：按表插入一行、按列排序列出全部行。网关不包含任何业务逻辑。

use async_trait::async_trait;
use onco_core::{Row, StoreError};
use serde::{Deserialize, Serialize};

/// 已知数据表
pub mod tables {
    pub const TREATMENTS: &str = "treatments";
    pub const EXAMS: &str = "exams";
    pub const PRESCRIPTIONS: &str = "prescriptions";
    pub const NURSE_PRESCRIPTIONS: &str = "nurse_prescriptions";
    pub const SIDE_EFFECTS: &str = "side_effects";
    pub const PATIENT_REPORTS: &str = "patient_reports";
    pub const GUIDANCES: &str = "guidances";

    pub const ALL: &[&str] = &[
        TREATMENTS,
        EXAMS,
        PRESCRIPTIONS,
        NURSE_PRESCRIPTIONS,
        SIDE_EFFECTS,
        PATIENT_REPORTS,
        GUIDANCES,
    ];
}

/// 列表排序方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    /// 按 `id` 降序（最新在前）
    pub fn newest_first() -> Self {
        Self {
            column: "id".to_string(),
            ascending: false,
        }
    }

    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::newest_first()
    }
}

/// 持久化网关
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// 插入一行，主键由存储分配
    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError>;

    /// 按指定排序列出整张表
    async fn list(&self, table: &str, order: &OrderBy) -> Result<Vec<Row>, StoreError>;
}

