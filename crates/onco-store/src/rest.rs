//! PostgREST 风格的远程存储网关
//!
//! - 插入: `POST {base}/rest/v1/{table}`，请求体为单元素 JSON 数组
//! - 列表: `GET {base}/rest/v1/{table}?select=*&order={column}.{asc|desc}`
//!
//! 每个请求都带有 `apikey` 与 `Authorization: Bearer` 头。

use crate::gateway::{OrderBy, PersistenceGateway};
use async_trait::async_trait;
use onco_core::{Row, StoreError};
use std::time::Duration;
use tracing::{debug, error};

/// REST 网关配置
#[derive(Debug, Clone)]
pub struct RestGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// 传输层超时，仓库另有自己的请求时限
    pub connect_timeout: Duration,
}

/// REST 网关
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    config: RestGatewayConfig,
}

impl RestGateway {
    pub fn new(config: RestGatewayConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url.trim_end_matches('/'), table)
    }

    /// PostgREST 的排序参数
    fn order_param(order: &OrderBy) -> String {
        let direction = if order.ascending { "asc" } else { "desc" };
        format!("{}.{}", order.column, direction)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn check(response: reqwest::Response, table: &str) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        error!("Store rejected request on {} with status {}: {}", table, status, message);
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&vec![row]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Self::check(response, table).await?;

        debug!("Inserted row into {}", table);
        Ok(())
    }

    async fn list(&self, table: &str, order: &OrderBy) -> Result<Vec<Row>, StoreError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*".to_string()), ("order", Self::order_param(order))]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let response = Self::check(response, table).await?;

        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{}: {}", table, e)))?;

        debug!("Listed {} rows from {}", rows.len(), table);
        Ok(rows)
    }
}
