//! # Onco Core
//!
//! 肿瘤治疗跟踪系统的核心模块，提供共享数据模型、候选记录校验、错误定义和通用工具。

pub mod drafts;
pub mod error;
pub mod models;
pub mod utils;

pub use drafts::*;
pub use error::{
    OncoError, RepositoryError, Result, StoreError, TriageError, ValidationError,
};
pub use models::*;
