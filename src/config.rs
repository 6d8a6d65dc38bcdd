use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的任务数量（外层闸门）
    pub max_concurrent_tasks: usize,
    /// 单个任务内同时在途的改写请求数量（内层闸门）
    pub max_concurrent_fragments: usize,
    /// 每次派发前的固定节流延迟（毫秒）
    pub dispatch_delay_ms: u64,
    /// 暂时性错误的最大尝试次数
    pub retry_attempts: u32,
    /// 指数退避的初始延迟（毫秒）
    pub retry_base_delay_ms: u64,
    /// 指数退避的最大延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// 每完成多少个片段发送一次进度
    pub progress_every: usize,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_secs: u64,
    /// 是否对改写结果再做一次“润色”
    pub humanize: bool,
    // --- 存储配置 ---
    /// 任务、版本、文档的存放目录
    pub data_dir: String,
    /// 待处理的 TOML 任务文件目录
    pub jobs_folder: String,
    /// 日志级别（RUST_LOG 未设置时使用）
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            max_concurrent_fragments: 3,
            dispatch_delay_ms: 1000,
            retry_attempts: 3,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 10_000,
            progress_every: 5,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            llm_timeout_secs: 30,
            humanize: false,
            data_dir: "temp_files".to_string(),
            jobs_folder: "jobs".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_tasks: std::env::var("MAX_CONCURRENT_TASKS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_tasks),
            max_concurrent_fragments: std::env::var("MAX_CONCURRENT_FRAGMENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_fragments),
            dispatch_delay_ms: std::env::var("DISPATCH_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.dispatch_delay_ms),
            retry_attempts: std::env::var("AI_RETRY_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_attempts),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_ms),
            retry_max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_max_delay_ms),
            progress_every: std::env::var("PROGRESS_EVERY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.progress_every),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("AI_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("AI_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            llm_timeout_secs: std::env::var("AI_TIMEOUT_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_timeout_secs),
            humanize: std::env::var("HUMANIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.humanize),
            data_dir: std::env::var("TEMP_FILES_DIR").unwrap_or(default.data_dir),
            jobs_folder: std::env::var("JOBS_FOLDER").unwrap_or(default.jobs_folder),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(default.log_level),
        }
    }

    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_concurrent_tasks", self.max_concurrent_tasks),
            ("max_concurrent_fragments", self.max_concurrent_fragments),
            ("retry_attempts", self.retry_attempts as usize),
            ("progress_every", self.progress_every),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "必须大于 0".to_string(),
                });
            }
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry_base_delay_ms".to_string(),
                value: self.retry_base_delay_ms.to_string(),
                reason: format!("不能大于 retry_max_delay_ms ({})", self.retry_max_delay_ms),
            });
        }
        Ok(())
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}
