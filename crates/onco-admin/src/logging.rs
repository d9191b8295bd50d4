//! 日志初始化
//!
//! 基于 tracing-subscriber：过滤指令优先取 `RUST_LOG`，否则使用配置中的级别。

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 根据配置构造过滤器
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log filter: {}", config.level)),
    }
}

/// 安装全局日志订阅器
///
/// 进程内只能成功调用一次，重复调用返回错误。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    tracing::debug!("Logging initialized (level={}, json={})", config.level, config.json);
    Ok(())
}
