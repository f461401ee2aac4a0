//! 存储层：翻译结果缓存

pub mod cache;

pub use cache::{CacheKeyParts, CacheStats, TranslationCache};
