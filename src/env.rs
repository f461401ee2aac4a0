//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问；所有变量以 `ITC_` 为前缀

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
///
/// 未设置的变量返回 `Err`，调用方据此决定是否覆盖配置。
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "not set".to_string(),
            }),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

fn invalid(name: &str, message: String) -> EnvError {
    EnvError {
        variable: name.to_string(),
        message,
    }
}

/// 解析布尔值
pub fn parse_bool(value: &str, name: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(name, format!("Invalid boolean '{}'", other))),
    }
}

/// 解析正整数
pub fn parse_positive(value: &str, name: &str) -> EnvResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(name, format!("Expected a positive integer, got '{}'", value))),
    }
}

/// 解析秒数
pub fn parse_duration_secs(value: &str, name: &str) -> EnvResult<Duration> {
    parse_positive(value, name).map(|secs| Duration::from_secs(secs as u64))
}

fn parse_non_empty(value: &str, name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(invalid(name, "Value must not be empty".to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "ITC_LOG_LEVEL";
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(invalid(
                    Self::NAME,
                    format!("Invalid log level '{}'. Use: trace, debug, info, warn, error", value),
                )),
            }
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "ITC_API_URL";
        const DESCRIPTION: &'static str = "Chat-completion API base URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = parse_non_empty(value, Self::NAME)?;
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.trim_end_matches('/').to_string())
            } else {
                Err(invalid(Self::NAME, "URL must start with http:// or https://".to_string()))
            }
        }
    }

    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "ITC_API_KEY";
        const DESCRIPTION: &'static str = "Bearer token for the chat-completion API";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "ITC_MODEL";
        const DESCRIPTION: &'static str = "Model name sent with each request";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "ITC_TARGET_LANG";
        const DESCRIPTION: &'static str = "Target language code, e.g. zh-CN, en, ja";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    pub struct BatchSize;
    impl EnvVar<usize> for BatchSize {
        const NAME: &'static str = "ITC_BATCH_SIZE";
        const DESCRIPTION: &'static str = "Preferred number of paragraphs per request";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive(value, Self::NAME)
        }
    }

    pub struct RequestTimeout;
    impl EnvVar<Duration> for RequestTimeout {
        const NAME: &'static str = "ITC_REQUEST_TIMEOUT";
        const DESCRIPTION: &'static str = "Request timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_duration_secs(value, Self::NAME)
        }
    }

    pub struct RichText;
    impl EnvVar<bool> for RichText {
        const NAME: &'static str = "ITC_RICH_TEXT";
        const DESCRIPTION: &'static str = "Preserve inline markup through the token protocol";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 缓存相关环境变量
pub mod cache {
    use super::*;

    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "ITC_CACHE_ENABLED";
        const DESCRIPTION: &'static str = "Enable the in-memory translation cache";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    pub struct Size;
    impl EnvVar<usize> for Size {
        const NAME: &'static str = "ITC_CACHE_SIZE";
        const DESCRIPTION: &'static str = "Maximum number of cached translations";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive(value, Self::NAME)
        }
    }
}
