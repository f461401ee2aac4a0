//! 批次编排
//!
//! 从共享 FIFO 队列中按批取出段落，每批只发起一次流式请求，流中的文本块经
//! [`StreamSplitter`] 分派到各段落的译文节点。同一个工作者严格按顺序处理批次，
//! 前一批收到终止事件之前不会开始下一批。
//!
//! 页面 DOM 是 `Rc` 树，编排器只能在单线程运行时上执行。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use markup5ever_rcdom::Handle;

use super::collector::TranslationContext;
use super::sizing::{estimate_tokens, BatchSizePolicy, TokenBudgetPolicy};
use super::stream::{Dispatch, ParagraphMode, StreamSplitter};
use super::target::RenderTarget;
use crate::parsers::html::is_attached;
use crate::translation::config::constants::JOINED_SEPARATOR;
use crate::translation::config::prompt::build_system_prompt;
use crate::translation::config::TranslationConfig;
use crate::translation::error::ErrorCategory;
use crate::translation::richtext::{tokenize, TokenizedParagraph};
use crate::translation::storage::{CacheKeyParts, CacheStats, TranslationCache};
use crate::translation::transport::{RequestConfig, StreamEvent, StreamTransport, TranslateRequest};

/// 调度状态：队列、活动工作者计数与“翻译中”标志
#[derive(Debug)]
pub struct SchedulerState {
    queue: RefCell<VecDeque<TranslationContext>>,
    active_workers: AtomicUsize,
    translating: AtomicBool,
    max_workers: usize,
}

impl SchedulerState {
    pub fn new(max_workers: usize) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            active_workers: AtomicUsize::new(0),
            translating: AtomicBool::new(false),
            max_workers: max_workers.max(1),
        }
    }

    pub fn enqueue(&self, contexts: impl IntoIterator<Item = TranslationContext>) {
        self.queue.borrow_mut().extend(contexts);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_translating(&self) -> bool {
        self.translating.load(Ordering::Acquire)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 检查并占用一个工作者名额，两步在同一次比较交换中完成
    pub fn try_acquire_worker(&self) -> bool {
        let acquired = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_workers).then_some(n + 1)
            })
            .is_ok();
        if acquired {
            self.translating.store(true, Ordering::Release);
        }
        acquired
    }

    /// 释放工作者名额；最后一个工作者退出时清除“翻译中”标志
    pub fn release_worker(&self) {
        let previous = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.translating.store(false, Ordering::Release);
        }
    }

    /// 取出下一批，最多 `size` 个
    pub fn next_batch(&self, size: usize) -> Vec<TranslationContext> {
        let mut queue = self.queue.borrow_mut();
        let take = size.max(1).min(queue.len());
        queue.drain(..take).collect()
    }

    /// 队首至多 `limit` 个段落实际发送的文本，供批次大小策略估算
    fn pending_texts<R>(&self, limit: usize, f: impl FnOnce(&[&str]) -> R) -> R {
        let texts: Vec<String> = self
            .queue
            .borrow()
            .iter()
            .take(limit)
            .map(TranslationContext::request_text)
            .collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        f(&texts)
    }
}

/// 编排统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: usize,
    pub failed_batches: usize,
    pub paragraphs: usize,
    pub cache_hits: usize,
    pub rich_rendered: usize,
    pub rich_fallbacks: usize,
    pub errored: usize,
}

impl BatchStats {
    /// 与更早的快照相减，得到这段时间内的增量
    pub fn since(&self, earlier: &BatchStats) -> BatchStats {
        BatchStats {
            batches: self.batches.saturating_sub(earlier.batches),
            failed_batches: self.failed_batches.saturating_sub(earlier.failed_batches),
            paragraphs: self.paragraphs.saturating_sub(earlier.paragraphs),
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            rich_rendered: self.rich_rendered.saturating_sub(earlier.rich_rendered),
            rich_fallbacks: self.rich_fallbacks.saturating_sub(earlier.rich_fallbacks),
            errored: self.errored.saturating_sub(earlier.errored),
        }
    }
}

/// 批次中的一个段落
struct Slot {
    source: Handle,
    target: RenderTarget,
    text: String,
    tokenized: Option<TokenizedParagraph>,
}

impl Slot {
    fn mode(&self) -> ParagraphMode {
        if self.tokenized.is_some() {
            ParagraphMode::Rich
        } else {
            ParagraphMode::Plain
        }
    }

    /// 发给模型的文本：富文本段落用令牌文本，普通段落把换行压成空格
    fn request_text(&self) -> String {
        match &self.tokenized {
            Some(paragraph) => paragraph.text.clone(),
            None => self.text.replace('\n', " "),
        }
    }
}

/// 一批的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Failed,
}

/// 批次编排器
pub struct BatchOrchestrator<T> {
    transport: T,
    request_config: RequestConfig,
    policy: Box<dyn BatchSizePolicy>,
    cache: Option<RefCell<TranslationCache>>,
    state: SchedulerState,
    stats: RefCell<BatchStats>,
}

impl<T: StreamTransport> BatchOrchestrator<T> {
    pub fn new(transport: T, config: &TranslationConfig) -> Self {
        let system_prompt = build_system_prompt(&config.user_translation_prompt, &config.target_language);
        let policy = TokenBudgetPolicy::from_config(config)
            .with_system_prompt_tokens(estimate_tokens(&system_prompt));
        let cache = config
            .cache_enabled
            .then(|| RefCell::new(TranslationCache::new(config.cache_size)));

        Self {
            transport,
            request_config: config.request_config(),
            policy: Box::new(policy),
            cache,
            state: SchedulerState::new(config.max_concurrent_workers),
            stats: RefCell::new(BatchStats::default()),
        }
    }

    pub fn with_policy(mut self, policy: impl BatchSizePolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> BatchStats {
        *self.stats.borrow()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.borrow().stats())
    }

    pub fn enqueue(&self, contexts: impl IntoIterator<Item = TranslationContext>) {
        self.state.enqueue(contexts);
    }

    /// 启动工作者直到队列清空
    pub async fn run(&self) -> BatchStats {
        let mut workers = Vec::new();
        while self.state.pending() > 0 && self.state.try_acquire_worker() {
            workers.push(self.worker(workers.len()));
        }

        if workers.is_empty() {
            tracing::debug!("没有待翻译段落或工作者已满");
        }
        join_all(workers).await;
        self.stats()
    }

    async fn worker(&self, id: usize) {
        tracing::info!("工作者 {} 启动，队列剩余 {}", id, self.state.pending());

        loop {
            let size = self
                .state
                .pending_texts(self.policy.lookahead(), |texts| self.policy.batch_size(texts));
            let batch = self.state.next_batch(size);
            if batch.is_empty() {
                break;
            }
            tracing::info!("工作者 {} 处理批次: {} 段", id, batch.len());
            self.process_batch(batch).await;
        }

        self.state.release_worker();
        tracing::info!("工作者 {} 结束", id);
    }

    /// 处理一批；任何失败都落到段落自身的错误状态，不会中断后续批次
    async fn process_batch(&self, batch: Vec<TranslationContext>) {
        let slots = self.prepare(batch);
        if slots.is_empty() {
            return;
        }

        {
            let mut stats = self.stats.borrow_mut();
            stats.batches += 1;
            stats.paragraphs += slots.len();
        }

        let combined = slots
            .iter()
            .map(Slot::request_text)
            .collect::<Vec<_>>()
            .join(JOINED_SEPARATOR);
        let request = TranslateRequest::new(combined, self.request_config.clone());

        let mut channel = match self.transport.open(request) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("打开翻译流失败: {}", e);
                let message = e.user_message();
                for slot in &slots {
                    slot.target.show_error(&message);
                }
                let mut stats = self.stats.borrow_mut();
                stats.failed_batches += 1;
                stats.errored += slots.len();
                return;
            }
        };

        let mut splitter = StreamSplitter::new(slots.iter().map(Slot::mode).collect());
        let outcome = loop {
            match channel.recv().await {
                Some(StreamEvent::Chunk(text)) => {
                    tracing::debug!("收到文本块 ({} 字节)，当前段落 {}", text.len(), splitter.current_index());
                    let dispatches = splitter.push(&text);
                    self.apply(&slots, dispatches);
                }
                Some(StreamEvent::Error(message)) => {
                    let dispatches = splitter.finish();
                    self.apply(&slots, dispatches);
                    self.settle_error(&slots, &message);
                    break Outcome::Failed;
                }
                Some(StreamEvent::Done) => {
                    let dispatches = splitter.finish();
                    self.apply(&slots, dispatches);
                    settle_done(&slots);
                    break Outcome::Done;
                }
                None => {
                    tracing::warn!("翻译流在没有终止事件的情况下关闭，按完成处理");
                    let dispatches = splitter.finish();
                    self.apply(&slots, dispatches);
                    settle_done(&slots);
                    break Outcome::Done;
                }
            }
        };

        if outcome == Outcome::Done {
            self.store_in_cache(&slots);
        } else {
            self.stats.borrow_mut().failed_batches += 1;
        }
    }

    /// 丢弃失效段落，命中缓存的段落直接渲染，其余创建译文节点
    fn prepare(&self, batch: Vec<TranslationContext>) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(batch.len());

        for context in batch {
            let Some(source) = context.source() else {
                tracing::debug!("源元素已释放，跳过");
                continue;
            };
            if !is_attached(&source) {
                tracing::debug!("源元素已从文档移除，跳过");
                continue;
            }
            if RenderTarget::find(&source).is_some() {
                tracing::debug!("源元素已有译文节点，跳过");
                continue;
            }

            if !context.is_rich() {
                if let Some(cached) = self.cached(&context.text) {
                    let target = RenderTarget::create_loading_target(&source);
                    target.append_text(&cached);
                    target.clear_loading();
                    self.stats.borrow_mut().cache_hits += 1;
                    continue;
                }
            }

            // 先生成令牌，再插入译文节点
            let tokenized = context.is_rich().then(|| tokenize(&source));
            let target = RenderTarget::create_loading_target(&source);
            slots.push(Slot {
                source,
                target,
                text: context.text,
                tokenized,
            });
        }

        slots
    }

    fn apply(&self, slots: &[Slot], dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            let (index, text) = match &dispatch {
                Dispatch::Append { index, text } | Dispatch::Complete { index, text } => (*index, text),
            };
            let Some(slot) = slots.get(index) else {
                tracing::warn!("分派到不存在的段落 {}", index);
                continue;
            };
            if !is_attached(&slot.source) {
                tracing::debug!("段落 {} 的源元素已移除，丢弃输出", index);
                continue;
            }

            match (&dispatch, &slot.tokenized) {
                (Dispatch::Complete { .. }, Some(paragraph)) => {
                    let ok = slot.target.render_rich(paragraph, text);
                    let mut stats = self.stats.borrow_mut();
                    if ok {
                        stats.rich_rendered += 1;
                    } else {
                        stats.rich_fallbacks += 1;
                        // 回退到不完整错误也算错误段落
                        if slot.target.is_errored() {
                            stats.errored += 1;
                        }
                    }
                }
                _ => slot.target.append_text(text),
            }
        }
    }

    /// 错误终止：已有内容的段落保留内容，瞬时错误静默移除加载提示
    fn settle_error(&self, slots: &[Slot], message: &str) {
        let category = ErrorCategory::classify(message);
        tracing::warn!("翻译流出错 ({:?}): {}", category, message);

        let mut errored = 0;
        for slot in slots {
            if slot.target.is_errored() {
                continue;
            }
            if slot.target.has_content() || category.is_recoverable() {
                slot.target.clear_loading();
            } else {
                slot.target.show_error(message);
                errored += 1;
            }
        }
        self.stats.borrow_mut().errored += errored;
    }

    fn cache_key<'a>(&'a self, text: &'a str) -> CacheKeyParts<'a> {
        CacheKeyParts {
            text,
            target_lang: &self.request_config.target_language,
            model_name: &self.request_config.model_name,
            prompt_version: &self.request_config.user_translation_prompt,
        }
    }

    fn cached(&self, text: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let parts = self.cache_key(text);
        cache.borrow_mut().get(&parts)
    }

    fn store_in_cache(&self, slots: &[Slot]) {
        let Some(cache) = &self.cache else {
            return;
        };
        let mut cache = cache.borrow_mut();
        for slot in slots.iter().filter(|s| s.tokenized.is_none()) {
            if slot.target.has_content() && !slot.target.is_errored() {
                cache.put(&self.cache_key(&slot.text), slot.target.text().trim());
            }
        }
    }
}

fn settle_done(slots: &[Slot]) {
    for slot in slots {
        slot.target.clear_loading();
    }
}
