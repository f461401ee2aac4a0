//! 批次大小策略
//!
//! 按模型上下文与输出上限估算一次请求能容纳的段落数。

use crate::translation::config::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_OUTPUT_TOKENS, JOINED_SEPARATOR,
};
use crate::translation::config::TranslationConfig;

/// 回退序列
pub const FALLBACK_SEQUENCE: &[usize] = &[10, 5, 3, 1];

/// 批次大小策略
pub trait BatchSizePolicy {
    /// 根据待翻译队列的文本决定下一批的大小（至少为 1）
    fn batch_size(&self, pending: &[&str]) -> usize;

    /// 估算时需要查看的队首段落数
    fn lookahead(&self) -> usize {
        usize::MAX
    }
}

/// 固定批次大小
#[derive(Debug, Clone, Copy)]
pub struct FixedBatchSize(pub usize);

impl BatchSizePolicy for FixedBatchSize {
    fn batch_size(&self, _pending: &[&str]) -> usize {
        self.0.max(1)
    }

    fn lookahead(&self) -> usize {
        0
    }
}

/// 按 token 预算收缩批次
#[derive(Debug, Clone)]
pub struct TokenBudgetPolicy {
    pub user_batch_size: usize,
    pub context_window: usize,
    pub max_output_tokens: usize,
    pub target_language: String,
    pub system_prompt_tokens: usize,
}

impl Default for TokenBudgetPolicy {
    fn default() -> Self {
        Self {
            user_batch_size: DEFAULT_BATCH_SIZE,
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            target_language: "zh-CN".to_string(),
            system_prompt_tokens: 0,
        }
    }
}

impl TokenBudgetPolicy {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            user_batch_size: config.batch_size,
            context_window: config.context_window,
            max_output_tokens: config.max_output_tokens,
            target_language: config.target_language.clone(),
            system_prompt_tokens: 0,
        }
    }

    pub fn with_system_prompt_tokens(mut self, tokens: usize) -> Self {
        self.system_prompt_tokens = tokens;
        self
    }

    /// 候选批次大小：用户值与回退序列中不超过用户值的部分，降序去重
    pub fn candidates(&self) -> Vec<usize> {
        let user_size = if self.user_batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.user_batch_size
        };

        let mut sizes: Vec<usize> = std::iter::once(user_size)
            .chain(FALLBACK_SEQUENCE.iter().copied())
            .filter(|n| *n <= user_size)
            .collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes.dedup();
        sizes
    }
}

impl BatchSizePolicy for TokenBudgetPolicy {
    fn lookahead(&self) -> usize {
        self.candidates().first().copied().unwrap_or(1)
    }

    fn batch_size(&self, pending: &[&str]) -> usize {
        let candidates = self.candidates();
        if pending.is_empty() {
            return candidates.first().copied().unwrap_or(1);
        }

        let context_window = if self.context_window == 0 {
            DEFAULT_CONTEXT_WINDOW
        } else {
            self.context_window
        };
        let max_output = if self.max_output_tokens == 0 {
            DEFAULT_MAX_OUTPUT_TOKENS
        } else {
            self.max_output_tokens
        };
        // 输入最多占上下文的 2/3，其余留给输出
        let max_input = context_window * 2 / 3;
        let ratio = token_ratio(&self.target_language);

        for size in candidates {
            let batch_text = pending
                .iter()
                .take(size)
                .copied()
                .collect::<Vec<_>>()
                .join(JOINED_SEPARATOR);
            let input_tokens = estimate_tokens(&batch_text) + self.system_prompt_tokens;
            let estimated_output = (input_tokens as f64 * ratio).ceil() as usize;

            if input_tokens <= max_input && estimated_output <= max_output {
                return size;
            }
            tracing::debug!(
                "批次大小 {} 超出预算 (输入 {} / {}, 输出 {} / {})",
                size,
                input_tokens,
                max_input,
                estimated_output,
                max_output
            );
        }

        1
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{3040}'..='\u{309f}'
        | '\u{30a0}'..='\u{30ff}'
        | '\u{ac00}'..='\u{d7af}')
}

/// 估算 token 数：CJK 约 1.5 字符一个 token，其余约 4 字符一个
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });

    (cjk as f64 / 1.5).ceil() as usize + other.div_ceil(4)
}

/// 按目标语言估计输出/输入 token 比例
pub fn token_ratio(target_language: &str) -> f64 {
    let target = target_language.to_ascii_lowercase();
    let is = |code: &str| target == code || target.starts_with(&format!("{}-", code));

    if target.starts_with("zh") {
        0.6
    } else if is("ja") {
        0.8
    } else if is("ko") {
        0.7
    } else if is("en") {
        1.8
    } else {
        1.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimation() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("中文字"), 2);
        assert_eq!(estimate_tokens("中文ab"), 3);
    }

    #[test]
    fn ratios_by_target() {
        assert_eq!(token_ratio("zh-CN"), 0.6);
        assert_eq!(token_ratio("ja"), 0.8);
        assert_eq!(token_ratio("ko"), 0.7);
        assert_eq!(token_ratio("en-US"), 1.8);
        assert_eq!(token_ratio("fr"), 1.2);
    }

    #[test]
    fn candidate_sequence() {
        let policy = |n| TokenBudgetPolicy { user_batch_size: n, ..Default::default() };
        assert_eq!(policy(10).candidates(), vec![10, 5, 3, 1]);
        assert_eq!(policy(7).candidates(), vec![7, 5, 3, 1]);
        assert_eq!(policy(20).candidates(), vec![20, 10, 5, 3, 1]);
        assert_eq!(policy(2).candidates(), vec![2, 1]);
        assert_eq!(policy(0).candidates(), vec![10, 5, 3, 1]);
    }

    #[test]
    fn shrinks_when_budget_is_exceeded() {
        let paragraph = "x".repeat(400); // 约 100 token
        let pending: Vec<&str> = std::iter::repeat(paragraph.as_str()).take(10).collect();

        let roomy = TokenBudgetPolicy::default();
        assert_eq!(roomy.batch_size(&pending), 10);

        // 输入上限 200 token：只能放下一段
        let tight = TokenBudgetPolicy { context_window: 300, ..Default::default() };
        assert_eq!(tight.batch_size(&pending), 1);

        // 输出上限 200 token，比例 0.6：最多约 333 输入 token，即 3 段
        let output_bound = TokenBudgetPolicy { max_output_tokens: 200, ..Default::default() };
        assert_eq!(output_bound.batch_size(&pending), 3);
    }

    #[test]
    fn lookahead_covers_the_largest_candidate() {
        assert_eq!(FixedBatchSize(4).lookahead(), 0);
        let policy = TokenBudgetPolicy { user_batch_size: 7, ..Default::default() };
        assert_eq!(policy.lookahead(), 7);
    }

    #[test]
    fn fixed_policy_is_at_least_one() {
        assert_eq!(FixedBatchSize(0).batch_size(&[]), 1);
        assert_eq!(FixedBatchSize(4).batch_size(&["a"]), 4);
    }
}
