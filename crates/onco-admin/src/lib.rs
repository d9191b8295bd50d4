//! # Onco管理模块
//!
//! 运维相关的配置管理与日志初始化

pub mod config;
pub mod logging;

pub use config::{
    ConfigManager, ConfigValidator, LoggingConfig, OncoConfig, ScheduleConfig, StoreBackend,
    StoreConfig,
};
pub use logging::{build_filter, init_logging};
