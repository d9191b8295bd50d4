//! 进程内存储网关
//!
//! 用于本地运行、演示和测试。行为与远程存储契约一致：插入时分配整数主键，
//! 列表按请求的列和方向排序，并支持注入一次性故障。

use crate::gateway::{tables, OrderBy, PersistenceGateway};
use async_trait::async_trait;
use onco_core::{Row, StoreError};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// 单张内存表
#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn push(&mut self, mut row: Row) {
        match row.get("id").and_then(Value::as_i64) {
            Some(existing) => self.next_id = self.next_id.max(existing),
            None if !row.contains_key("id") => {
                self.next_id += 1;
                row.insert("id".to_string(), Value::from(self.next_id));
            }
            None => {}
        }
        self.rows.push(row);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    insert_faults: VecDeque<StoreError>,
    list_faults: VecDeque<StoreError>,
}

/// 内存网关
#[derive(Debug)]
pub struct MemoryGateway {
    state: RwLock<MemoryState>,
}

impl MemoryGateway {
    /// 创建包含全部已知数据表的空存储
    pub fn new() -> Self {
        Self::with_tables(tables::ALL)
    }

    /// 只创建指定的数据表，访问其他表返回 `UnknownTable`
    pub fn with_tables(names: &[&str]) -> Self {
        let tables = names
            .iter()
            .map(|name| (name.to_string(), MemoryTable::default()))
            .collect();

        Self {
            state: RwLock::new(MemoryState {
                tables,
                ..Default::default()
            }),
        }
    }

    /// 直接写入初始数据
    pub async fn seed(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        for row in rows {
            target.push(row);
        }
        Ok(())
    }

    /// 下一次插入返回指定错误
    pub async fn fail_next_insert(&self, error: StoreError) {
        self.state.write().await.insert_faults.push_back(error);
    }

    /// 下一次列表返回指定错误
    pub async fn fail_next_list(&self, error: StoreError) {
        self.state.write().await.list_faults.push_back(error);
    }

    /// 表中的行数
    pub async fn len(&self, table: &str) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// 比较两个单元格：数字按数值，可解析为整数的字符串也按数值，空值排在最后
fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn numeric(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<i64>().ok().map(|n| n as f64),
            _ => None,
        }
    }

    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(a), Some(b)) => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.insert_faults.pop_front() {
            return Err(error);
        }

        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        target.push(row);

        debug!("Inserted row into {} ({} rows)", table, target.rows.len());
        Ok(())
    }

    async fn list(&self, table: &str, order: &OrderBy) -> Result<Vec<Row>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.list_faults.pop_front() {
            return Err(error);
        }

        let source = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut rows = source.rows.clone();
        let column = order.column.as_str();
        rows.sort_by(|a, b| {
            let ordering = compare_cells(a.get(column), b.get(column));
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let gateway = MemoryGateway::new();
        gateway.insert(tables::EXAMS, row(json!({"type": "Hemograma"}))).await.unwrap();
        gateway.insert(tables::EXAMS, row(json!({"type": "Tomografia"}))).await.unwrap();

        let rows = gateway.list(tables::EXAMS, &OrderBy::newest_first()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(2));
        assert_eq!(rows[0]["type"], json!("Tomografia"));
        assert_eq!(rows[1]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_ordering_is_numeric_not_lexicographic() {
        let gateway = MemoryGateway::new();
        gateway
            .seed(
                tables::TREATMENTS,
                vec![row(json!({"id": 9})), row(json!({"id": 10})), row(json!({"id": 2}))],
            )
            .await
            .unwrap();

        let rows = gateway.list(tables::TREATMENTS, &OrderBy::ascending("id")).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(9), json!(10)]);

        // 插入继续使用已有最大主键之后的值
        gateway.insert(tables::TREATMENTS, row(json!({}))).await.unwrap();
        let rows = gateway.list(tables::TREATMENTS, &OrderBy::newest_first()).await.unwrap();
        assert_eq!(rows[0]["id"], json!(11));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let gateway = MemoryGateway::with_tables(&[tables::EXAMS]);
        let err = gateway
            .list(tables::TREATMENTS, &OrderBy::newest_first())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownTable("treatments".to_string()));
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once() {
        let gateway = MemoryGateway::new();
        gateway
            .fail_next_insert(StoreError::Transport("connection reset".to_string()))
            .await;

        assert!(gateway.insert(tables::EXAMS, row(json!({}))).await.is_err());
        assert_eq!(gateway.len(tables::EXAMS).await, 0);
        assert!(gateway.insert(tables::EXAMS, row(json!({}))).await.is_ok());
        assert_eq!(gateway.len(tables::EXAMS).await, 1);
    }
}
