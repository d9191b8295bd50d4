//! 配置管理
//!
//! 默认值、可选的 TOML 配置文件和 `ONCO_` 前缀环境变量依次叠加。
//! 环境变量用双下划线分隔层级，例如 `ONCO_STORE__BASE_URL`。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<OncoConfig>>,
    /// 配置文件路径，未指定时只使用默认值和环境变量
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 系统完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OncoConfig {
    /// 存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 日程配置
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储
    #[default]
    Memory,
    /// PostgREST 风格的远程存储
    Rest,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// 远程存储地址
    #[serde(default)]
    pub base_url: String,
    /// 远程存储匿名密钥
    #[serde(default)]
    pub api_key: String,
    /// 单次网关请求的时限（毫秒）
    pub request_timeout_ms: u64,
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令
    pub level: String,
    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 日程配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 预约提醒窗口（天）
    pub upcoming_window_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            upcoming_window_days: 7,
        }
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&OncoConfig) -> Result<()>,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(Path::to_path_buf),
            validator,
        })
    }

    /// 叠加默认值、配置文件与环境变量
    fn load_config(config_path: Option<&Path>) -> Result<OncoConfig> {
        let defaults = Config::try_from(&OncoConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("ONCO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: OncoConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> OncoConfig {
        self.config.read().await.clone()
    }

    /// 更新配置，有配置文件时同时写回
    pub async fn update_config(&self, new_config: OncoConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        if self.config_path.is_some() {
            self.save_config().await?;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    async fn save_config(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };

        let config_str = {
            let config = self.config.read().await;
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?
        };

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;
        debug!("Configuration reloaded");
        Ok(())
    }

    /// 按点分路径读取配置值
    pub async fn get_value<T>(&self, path: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let config = self.config.read().await;
        let config_json =
            serde_json::to_value(&*config).context("Failed to serialize config to JSON")?;

        let mut current = &config_json;
        for part in path.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", path))?;
        }

        serde_json::from_value(current.clone())
            .context("Failed to deserialize configuration value")
    }

    /// 验证配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "store.base_url",
                validator: |config| {
                    if config.store.backend == StoreBackend::Rest
                        && config.store.base_url.trim().is_empty()
                    {
                        Err(anyhow::anyhow!("REST backend requires a base url"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "store.api_key",
                validator: |config| {
                    if config.store.backend == StoreBackend::Rest
                        && config.store.api_key.trim().is_empty()
                    {
                        Err(anyhow::anyhow!("REST backend requires an api key"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "store.request_timeout_ms",
                validator: |config| {
                    if config.store.request_timeout_ms == 0 {
                        Err(anyhow::anyhow!("Request timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "schedule.upcoming_window_days",
                validator: |config| {
                    if config.schedule.upcoming_window_days < 0 {
                        Err(anyhow::anyhow!("Upcoming window cannot be negative"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                        .map(|_| ())
                        .map_err(|e| anyhow::anyhow!("Invalid log filter: {}", e))
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &OncoConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.field_path, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
