//! 错误定义模块

use std::time::Duration;
use thiserror::Error;

/// 远程存储网关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("存储连接错误: {0}")]
    Transport(String),

    #[error("存储拒绝请求 (状态 {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("存储数据解码错误: {0}")]
    Decode(String),

    #[error("未知数据表: {0}")]
    UnknownTable(String),

    #[error("写入的记录在列表中不可见: {0}")]
    NotVisible(String),
}

/// 必填字段校验错误
///
/// `missing` 为空白的必填字段，`invalid` 为无法解析为枚举值的字段。
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("验证错误: 缺少字段 {missing:?}, 无效字段 {invalid:?}")]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
    pub invalid: Vec<&'static str>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// 字段为空白时记为缺失
    pub fn require(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.missing.push(field);
        }
    }

    pub fn reject(&mut self, field: &'static str) {
        self.invalid.push(field);
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// 是否涉及指定字段
    pub fn names(&self, field: &str) -> bool {
        self.missing.iter().chain(self.invalid.iter()).any(|f| *f == field)
    }

    /// 没有任何问题时返回 `Ok(())`
    pub fn into_result(self) -> std::result::Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// 记录仓库错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("存储写入失败: {0}")]
    StoreRejected(StoreError),

    #[error("存储请求超时 ({0:?})")]
    Timeout(Duration),

    #[error("仓库已有操作进行中")]
    Busy,

    /// 记录已写入远程存储，但随后的刷新失败，本地缓存尚未包含该记录。
    /// 下一次成功刷新后记录才会在本地可见。
    #[error("记录已保存但本地缓存刷新失败: {0}")]
    Stale(Box<RepositoryError>),
}

impl RepositoryError {
    /// 超时与存储失败可由用户重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreRejected(_) | Self::Timeout(_) | Self::Busy => true,
            Self::Stale(inner) => inner.is_retryable(),
            Self::Validation(_) => false,
        }
    }
}

/// 分诊引擎错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriageError {
    #[error("患者报告未找到: {0}")]
    UnknownReport(String),

    #[error("无效状态转换: 从 {from} 经 {event}")]
    InvalidTransition { from: String, event: String },

    #[error("指导说明不能为空")]
    EmptyInstructions,

    #[error("报告描述不能为空")]
    EmptyDescription,

    #[error("初始化数据不一致: {0}")]
    InconsistentSeed(String),

    #[error("记录标识符已用尽")]
    IdsExhausted,
}

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum OncoError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Triage(#[from] TriageError),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, OncoError>;
