//! 翻译结果缓存
//!
//! 进程内 LRU 缓存，只保存普通段落的纯文本译文。键由目标语言、模型、
//! 提示词版本与原文共同哈希得到，任一变化都会使旧译文失效。

use std::num::NonZeroUsize;

use blake3::Hasher;
use lru::LruCache;

use crate::translation::config::constants::DEFAULT_CACHE_SIZE;

/// 缓存键的组成部分
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyParts<'a> {
    pub text: &'a str,
    pub target_lang: &'a str,
    pub model_name: &'a str,
    pub prompt_version: &'a str,
}

impl CacheKeyParts<'_> {
    /// 生成缓存键
    pub fn key(&self) -> String {
        let mut hasher = Hasher::new();
        // 以 0 字节分隔，避免不同字段拼接后产生碰撞
        for part in [self.target_lang, self.model_name, self.prompt_version, self.text] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        format!("trans:{}", hasher.finalize().to_hex())
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 本地 LRU 翻译缓存
pub struct TranslationCache {
    cache: LruCache<String, String>,
    stats: CacheStats,
}

impl TranslationCache {
    /// 创建新的缓存；容量为 0 时使用默认容量
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// 获取缓存的译文
    pub fn get(&mut self, parts: &CacheKeyParts<'_>) -> Option<String> {
        match self.cache.get(&parts.key()) {
            Some(translation) => {
                self.stats.hits += 1;
                Some(translation.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 写入译文；空译文不缓存
    pub fn put(&mut self, parts: &CacheKeyParts<'_>, translation: &str) {
        let translation = translation.trim();
        if translation.is_empty() {
            return;
        }
        self.cache.put(parts.key(), translation.to_string());
        self.stats.sets += 1;
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 清空缓存
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(text: &str) -> CacheKeyParts<'_> {
        CacheKeyParts {
            text,
            target_lang: "zh-CN",
            model_name: "m",
            prompt_version: "v1",
        }
    }

    #[test]
    fn key_depends_on_every_part() {
        let base = parts("hello").key();
        assert_eq!(base, parts("hello").key());
        assert_ne!(base, parts("hello!").key());
        assert_ne!(base, CacheKeyParts { target_lang: "ja", ..parts("hello") }.key());
        assert_ne!(base, CacheKeyParts { model_name: "n", ..parts("hello") }.key());
        assert_ne!(base, CacheKeyParts { prompt_version: "v2", ..parts("hello") }.key());
    }

    #[test]
    fn lru_eviction_and_stats() {
        let mut cache = TranslationCache::new(2);
        cache.put(&parts("a"), "甲");
        cache.put(&parts("b"), "乙");
        assert_eq!(cache.get(&parts("a")).as_deref(), Some("甲"));
        cache.put(&parts("c"), "丙");

        // b 最久未使用，被淘汰
        assert!(cache.get(&parts("b")).is_none());
        assert_eq!(cache.len(), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 3);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_translations_are_not_stored() {
        let mut cache = TranslationCache::new(0);
        assert_eq!(cache.capacity(), DEFAULT_CACHE_SIZE);
        cache.put(&parts("a"), "   ");
        assert!(cache.is_empty());
    }
}
