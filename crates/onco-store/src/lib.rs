//! # Onco存储模块
//!
//! 远程表格存储的持久化网关：网关接口、进程内实现和 PostgREST 风格的 HTTP 实现。

pub mod gateway;
pub mod memory;
pub mod rest;

// 重新导出主要类型
pub use gateway::{tables, OrderBy, PersistenceGateway};
pub use memory::MemoryGateway;
pub use rest::{RestGateway, RestGatewayConfig};
