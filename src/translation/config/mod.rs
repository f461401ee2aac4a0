//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值；
//! 以及系统提示词的组装

pub mod manager;
pub mod prompt;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
    pub const DEFAULT_MODEL: &str = "deepseek-v3-2-251201";
    pub const DEFAULT_TARGET_LANG: &str = "zh-CN";
    pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

    // 调度相关
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    pub const MAX_CONCURRENT_WORKERS: usize = 1;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    // 模型上下文限制
    pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;
    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 16_000;

    // 缓存设置
    pub const DEFAULT_CACHE_SIZE: usize = 1000;

    // 段落协议
    pub const PARAGRAPH_SEPARATOR: &str = "%%";
    pub const JOINED_SEPARATOR: &str = "\n%%\n";

    // 译文节点
    pub const TARGET_CLASS: &str = "immersive-translate-target";
    pub const LOADING_CLASS: &str = "immersive-translate-loading";
    pub const ERROR_CLASS: &str = "immersive-translate-error";
    pub const TEXT_WRAPPER_CLASS: &str = "immersive-translate-text-wrapper";
    pub const LOADING_TEXT: &str = "Thinking...";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "translation-config.toml",
        ".translation-config.toml",
        "translation-config.json",
        "~/.config/inline-translate/config.toml",
    ];
}
