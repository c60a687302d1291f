use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult, ConfigError};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 单个提交内同时评分的页面数量（上游限流）
    pub max_concurrent_pages: usize,
    /// 单页 LLM 调用超时（秒）
    pub llm_timeout_secs: u64,
    /// 提交清单（TOML）存放目录
    pub input_folder: String,
    /// 评分结果输出目录
    pub output_dir: String,
    /// 提示词文件（TOML），为空则使用内置版本
    pub prompt_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_pages: 4,
            llm_timeout_secs: 120,
            input_folder: "submissions".to_string(),
            output_dir: "output_static".to_string(),
            prompt_file: None,
            verbose_logging: false,
            output_log_file: "grading_log.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            llm_temperature: 0.2,
            llm_max_tokens: 8192,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::toml_parse_failed(path.display().to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 加载配置：`GRADER_CONFIG` 指向的文件（如存在），再叠加环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("GRADER_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(&path))?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            max_concurrent_pages: env_parse("MAX_CONCURRENT_PAGES").unwrap_or(self.max_concurrent_pages),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(self.llm_timeout_secs),
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(self.input_folder),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(self.output_dir),
            prompt_file: std::env::var("PROMPT_FILE").ok().or(self.prompt_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(self.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(self.llm_max_tokens),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_pages".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm_timeout_secs".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                "{}",
                ConfigError::EnvVarParseFailed {
                    var_name: name.to_string(),
                    value: raw.clone(),
                    expected_type: std::any::type_name::<T>().to_string(),
                }
            );
            None
        }
    }
}
