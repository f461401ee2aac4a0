//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型、错误分类，以及面向用户的错误消息脱敏

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 缺少 API Key，在任何网络请求之前检测
    #[error("API Key is missing.")]
    MissingApiKey,

    /// 上游返回非 2xx 状态码
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 请求被中止（消费端断开）
    #[error("请求已中止")]
    Aborted,

    /// 模型输出违反令牌协议
    #[error("协议违规: {0}")]
    ProtocolViolation(#[from] RichTextError),

    /// 配置文件解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),
}

/// 令牌协议校验失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RichTextError {
    #[error("open token missing id")]
    MissingId,

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("atomic token duplicated: {0}")]
    AtomicDuplicated(String),

    #[error("atomic token used as close: {0}")]
    AtomicClosed(String),

    #[error("close token without open")]
    UnbalancedClose,

    #[error("unclosed token: {0}")]
    Unclosed(String),

    #[error("close/open count mismatch")]
    CountMismatch,

    #[error("token missing/extra: {0}")]
    MissingOrExtra(String),
}

impl TranslationError {
    /// 检查错误是否可恢复（静默处理，不向用户展示）
    pub fn is_recoverable(&self) -> bool {
        self.category().is_recoverable()
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::MissingApiKey => ErrorSeverity::Critical,
            TranslationError::HttpStatus { .. } => ErrorSeverity::Error,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::Aborted => ErrorSeverity::Info,
            TranslationError::ProtocolViolation(_) => ErrorSeverity::Warning,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::MissingApiKey => ErrorCategory::Credentials,
            TranslationError::HttpStatus { status: 429, .. } => ErrorCategory::RateLimit,
            TranslationError::HttpStatus { .. } => ErrorCategory::Http,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::Aborted => ErrorCategory::Abort,
            TranslationError::ProtocolViolation(_) => ErrorCategory::Protocol,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
        }
    }

    /// 面向用户的消息：不携带上游原始错误内容
    pub fn user_message(&self) -> String {
        match self {
            TranslationError::MissingApiKey => self.to_string(),
            TranslationError::HttpStatus { status, message } => {
                helpers::sanitize_api_error(*status, message)
            }
            TranslationError::NetworkError(raw) => helpers::sanitize_network_error(raw),
            TranslationError::TimeoutError(_) | TranslationError::Aborted => {
                helpers::TIMEOUT_MESSAGE.to_string()
            }
            TranslationError::ProtocolViolation(_) => helpers::INCOMPLETE_MESSAGE.to_string(),
            other => {
                tracing::debug!("错误详情: {}", other);
                "Translation failed. Please try again.".to_string()
            }
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Credentials,
    Http,
    Network,
    RateLimit,
    Timeout,
    Abort,
    Protocol,
    Parsing,
    Input,
}

impl ErrorCategory {
    /// 超时、中止、限流属于瞬时错误
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Abort | ErrorCategory::RateLimit
        )
    }

    /// 根据传输通道上收到的错误文本推断类别
    ///
    /// 通道只携带字符串，因此这里按关键字匹配；无法识别的一律归为 `Network`。
    pub fn classify(message: &str) -> ErrorCategory {
        let msg = message.to_lowercase();

        if msg.contains("timed out") || msg.contains("timeout") {
            ErrorCategory::Timeout
        } else if msg.contains("abort") {
            ErrorCategory::Abort
        } else if msg.contains("rate limit") || msg.contains("429") || msg.contains("too many requests") {
            ErrorCategory::RateLimit
        } else if msg.contains("api key") {
            ErrorCategory::Credentials
        } else {
            ErrorCategory::Network
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::ParseError(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(error.to_string())
        } else if let Some(status) = error.status() {
            TranslationError::HttpStatus {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {

    /// 超时提示
    pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";

    /// 富文本输出被截断或无法恢复时的提示
    pub const INCOMPLETE_MESSAGE: &str = "Incomplete translation";

    /// 将 HTTP 状态码映射为用户友好的消息
    ///
    /// 原始错误只写入日志，避免上游错误内容泄露到页面。
    pub fn sanitize_api_error(status: u16, raw_error: &str) -> String {
        tracing::error!("API Error {}: {}", status, raw_error);

        let message = match status {
            400 => "Bad request. Please check your settings.",
            401 => "Authentication failed. Please check your API key.",
            403 => "Access denied. Please verify your API key permissions.",
            404 => "API endpoint not found. Please check your API URL.",
            429 => "Rate limit exceeded. Please try again later.",
            500 => "Server error. Please try again later.",
            502 => "Server temporarily unavailable. Please try again.",
            503 => "Service unavailable. Please try again later.",
            _ => return format!("API request failed ({}). Please try again.", status),
        };
        message.to_string()
    }

    /// 将网络层错误归类为用户友好的消息
    pub fn sanitize_network_error(raw_error: &str) -> String {
        tracing::error!("Network Error: {}", raw_error);

        let lower = raw_error.to_lowercase();
        if lower.contains("failed to fetch")
            || lower.contains("networkerror")
            || lower.contains("error sending request")
            || lower.contains("connection refused")
            || lower.contains("dns error")
        {
            return "Network connection failed. Please check your internet connection.".to_string();
        }
        if lower.contains("cors") || lower.contains("cross-origin") {
            return "Connection blocked. The API may not support direct browser requests."
                .to_string();
        }
        if lower.contains("ssl") || lower.contains("certificate") || lower.contains("tls") {
            return "Secure connection failed. Please check the API URL.".to_string();
        }

        "Network error occurred. Please try again.".to_string()
    }
}
