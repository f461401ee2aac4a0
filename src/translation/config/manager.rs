//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use super::prompt::OLD_DEFAULT_PROMPT_SIGNATURE;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::transport::RequestConfig;

/// 翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // API 配置
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
    pub temperature: Option<f32>,

    // 语言与提示词
    pub target_language: String,
    pub user_translation_prompt: String,
    /// 旧版本的完整提示词字段，加载时迁移到 `user_translation_prompt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,

    // 站点过滤
    pub excluded_domains: Vec<String>,
    pub skip_same_language: bool,

    // 调度配置
    pub batch_size: usize,
    pub max_concurrent_workers: usize,
    pub request_timeout_secs: u64,
    pub context_window: usize,
    pub max_output_tokens: usize,

    // 富文本
    pub rich_text: bool,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_size: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model_name: constants::DEFAULT_MODEL.to_string(),
            temperature: None,

            target_language: constants::DEFAULT_TARGET_LANG.to_string(),
            user_translation_prompt: String::new(),
            custom_prompt: None,

            excluded_domains: Vec::new(),
            skip_same_language: true,

            batch_size: constants::DEFAULT_BATCH_SIZE,
            max_concurrent_workers: constants::MAX_CONCURRENT_WORKERS,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            context_window: constants::DEFAULT_CONTEXT_WINDOW,
            max_output_tokens: constants::DEFAULT_MAX_OUTPUT_TOKENS,

            rich_text: true,

            cache_enabled: true,
            cache_size: constants::DEFAULT_CACHE_SIZE,
        }
    }
}

impl TranslationConfig {
    /// 创建带指定语言的默认配置
    pub fn default_with_lang(target_lang: &str, api_url: Option<&str>) -> Self {
        let mut config = Self::default();
        config.target_language = target_lang.to_string();
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }
        config
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.batch_size == 0 {
            return Err(TranslationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.max_concurrent_workers == 0 {
            return Err(TranslationError::ConfigError("并发工作者数量不能为0".to_string()));
        }

        if self.max_concurrent_workers > 1 {
            tracing::warn!(
                "并发工作者数量为 {}，多个批次将同时流式返回，未经充分验证",
                self.max_concurrent_workers
            );
        }

        if self.request_timeout_secs == 0 {
            return Err(TranslationError::ConfigError("请求超时不能为0".to_string()));
        }

        if self.cache_enabled && self.cache_size == 0 {
            return Err(TranslationError::ConfigError("启用缓存时缓存大小不能为0".to_string()));
        }

        if let Some(t) = self.temperature {
            if !t.is_finite() {
                return Err(TranslationError::ConfigError("temperature 必须是有限数值".to_string()));
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, translation, EnvVar};

        if let Ok(api_url) = translation::ApiUrl::get() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Ok(api_key) = translation::ApiKey::get() {
            self.api_key = api_key;
        }

        if let Ok(model) = translation::Model::get() {
            self.model_name = model;
        }

        if let Ok(target_lang) = translation::TargetLang::get() {
            self.target_language = target_lang;
        }

        if let Ok(batch_size) = translation::BatchSize::get() {
            self.batch_size = batch_size;
        }

        if let Ok(timeout) = translation::RequestTimeout::get() {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Ok(rich_text) = translation::RichText::get() {
            self.rich_text = rich_text;
        }

        if let Ok(cache_enabled) = cache::Enabled::get() {
            self.cache_enabled = cache_enabled;
        }

        if let Ok(cache_size) = cache::Size::get() {
            self.cache_size = cache_size;
        }
    }

    /// 将旧版 `custom_prompt` 迁移到 `user_translation_prompt`
    ///
    /// 已有用户提示词时不覆盖；旧的默认提示词视为用户从未自定义，直接丢弃。
    pub fn migrate_custom_prompt(&mut self) {
        let Some(legacy) = self.custom_prompt.take() else {
            return;
        };

        if !self.user_translation_prompt.trim().is_empty() {
            return;
        }

        if !legacy.trim().is_empty() && !legacy.contains(OLD_DEFAULT_PROMPT_SIGNATURE) {
            tracing::info!("迁移旧版 custom_prompt 到 user_translation_prompt");
            self.user_translation_prompt = legacy;
        }
    }

    /// 完整的 chat/completions 端点地址
    pub fn endpoint(&self) -> String {
        resolve_endpoint(&self.api_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 随每个请求发送给传输层的配置快照
    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            model_name: self.model_name.clone(),
            target_language: self.target_language.clone(),
            user_translation_prompt: self.user_translation_prompt.clone(),
            temperature: self.temperature,
        }
    }
}

/// 若 URL 已包含 `/chat/completions` 则原样使用，否则补全
pub fn resolve_endpoint(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    if trimmed.ends_with(constants::CHAT_COMPLETIONS_PATH) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, constants::CHAT_COMPLETIONS_PATH)
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置
    pub fn new() -> TranslationResult<Self> {
        Self::load(None)
    }

    /// 加载配置：显式路径优先，其次搜索默认路径，最后使用默认值
    pub fn load(explicit_path: Option<&Path>) -> TranslationResult<Self> {
        Self::load_dotenv();

        let mut config = match explicit_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::search_config()?,
        };
        config.migrate_custom_prompt();
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 由现成的配置创建（不读取文件与环境变量）
    pub fn from_config(config: TranslationConfig) -> TranslationResult<Self> {
        let mut config = config;
        config.migrate_custom_prompt();
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut TranslationConfig {
        &mut self.config
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    fn search_config() -> TranslationResult<TranslationConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslationConfig::default())
    }

    /// 从指定文件加载配置（按扩展名区分 TOML / JSON）
    pub fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        Ok(config)
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &Path) -> TranslationResult<()> {
        let config = TranslationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
