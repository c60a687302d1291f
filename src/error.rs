use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 人工复核（override）校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 提交状态错误
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求构建失败
    #[error("LLM 请求构建失败: {source}")]
    RequestBuildFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 超时
    #[error("LLM 调用超时 (模型: {model}, {timeout_secs}秒)")]
    Timeout { model: String, timeout_secs: u64 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// JSON 序列化/解析失败
    #[error("JSON处理失败: {source}")]
    JsonFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值无效
    #[error("配置项 {field} 无效: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Override 校验错误：被拒绝的 override 不会改变任何状态
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("未知提交: {submission_id}")]
    UnknownSubmission { submission_id: String },
    #[error("提交 {submission_id} 中不存在第 {page_index} 页")]
    UnknownPage {
        submission_id: String,
        page_index: u32,
    },
    #[error("未知评分项: {criterion}")]
    UnknownCriterion { criterion: String },
    #[error("第 {page_index} 页已被跳过 ({reason})，不能设置分数")]
    SkippedPage { page_index: u32, reason: String },
    #[error("缺少必填字段: {field}")]
    MissingField { field: String },
    #[error("评分项 {criterion} 的分数 {value} 超出范围 [0, {max}]")]
    ValueOutOfRange {
        criterion: String,
        value: i64,
        max: u32,
    },
}

/// 提交生命周期错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("提交 {submission_id} 尚未完成: 已处理 {processed}/{expected} 页")]
    NotReady {
        submission_id: String,
        processed: usize,
        expected: usize,
    },
    #[error("提交 {submission_id} 中第 {page_index} 页重复")]
    DuplicatePage {
        submission_id: String,
        page_index: u32,
    },
    #[error("提交 {submission_id} 不包含第 {page_index} 页")]
    UnexpectedPage {
        submission_id: String,
        page_index: u32,
    },
    #[error("提交 {submission_id} 已存在")]
    AlreadyRegistered { submission_id: String },
    #[error("提交 {submission_id} 没有任何页面")]
    Empty { submission_id: String },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::JsonFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Other(format!("正则表达式编译失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建 TOML 解析错误
    pub fn toml_parse_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 是否为上游超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Llm(LlmError::Timeout { .. }))
    }

    /// 是否为输入校验失败（复核被拒绝，而非执行出错）
    pub fn is_rejection(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts_into_app_error() {
        let err: AppError = ValidationError::UnknownCriterion {
            criterion: "novelty".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("novelty"));
    }

    #[test]
    fn test_timeout_detection() {
        let err: AppError = LlmError::Timeout {
            model: "m".to_string(),
            timeout_secs: 5,
        }
        .into();
        assert!(err.is_timeout());

        let other: AppError = LlmError::EmptyContent {
            model: "m".to_string(),
        }
        .into();
        assert!(!other.is_timeout());
    }

    #[test]
    fn test_only_validation_errors_are_rejections() {
        let rejected: AppError = ValidationError::UnknownCriterion {
            criterion: "novelty".to_string(),
        }
        .into();
        assert!(rejected.is_rejection());

        let io: AppError = AppError::file_write_failed(
            "out/g1_result.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_rejection());
    }
}
