//! 翻译服务
//!
//! 对外的统一入口：扫描文档 → 入队 → 运行批次编排直到队列清空。
//!
//! ## 主要组件
//!
//! - `TranslationService`: 持有配置、文本收集器和批次编排器
//! - `ServiceStats`: 跨多次调用累计的统计计数
//! - `TranslationSummary`: 单次 `translate_document` 的结果摘要

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use markup5ever_rcdom::RcDom;

use crate::translation::config::TranslationConfig;
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::batch::{BatchOrchestrator, BatchStats};
use crate::translation::pipeline::collector::TextCollector;
use crate::translation::pipeline::filters::{host_of, is_excluded_domain};
use crate::translation::storage::CacheStats;
use crate::translation::transport::{HttpTransport, StreamTransport};

/// 一次文档翻译的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// 扫描与翻译正常结束（可能有段落显示错误）
    Completed,
    /// 已有扫描或翻译在进行中，本次调用被拒绝
    Busy,
    /// 页面域名在排除列表中
    ExcludedDomain,
}

/// 单次文档翻译的摘要
#[derive(Debug, Clone, Copy)]
pub struct TranslationSummary {
    pub outcome: TranslationOutcome,
    /// 扫描收集到的段落数
    pub collected: usize,
    /// 本次调用期间的批次统计
    pub batches: BatchStats,
    pub elapsed: Duration,
}

impl TranslationSummary {
    fn skipped(outcome: TranslationOutcome) -> Self {
        Self {
            outcome,
            collected: 0,
            batches: BatchStats::default(),
            elapsed: Duration::ZERO,
        }
    }
}

/// 服务统计信息
///
/// 计数在服务生命周期内累加，`snapshot` 取得一份普通数值的副本。
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 完成的文档数量
    pub documents: AtomicUsize,
    /// 收集到的段落数量
    pub paragraphs_collected: AtomicUsize,
    /// 因忙碌被拒绝的调用次数
    pub rejected_busy: AtomicUsize,
    /// 因域名排除而跳过的文档数量
    pub excluded: AtomicUsize,
    /// 总处理时间（微秒）
    pub processing_time: AtomicU64,
}

impl ServiceStats {
    pub fn add_processing_time(&self, duration: Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            documents: self.documents.load(Ordering::Relaxed),
            paragraphs_collected: self.paragraphs_collected.load(Ordering::Relaxed),
            rejected_busy: self.rejected_busy.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            processing_time: Duration::from_micros(self.processing_time.load(Ordering::Relaxed)),
        }
    }
}

/// 服务统计数据的不可变快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatsSnapshot {
    pub documents: usize,
    pub paragraphs_collected: usize,
    pub rejected_busy: usize,
    pub excluded: usize,
    pub processing_time: Duration,
}

/// 扫描期间置位的标志，离开作用域时复位
struct ScanGuard<'a>(&'a Cell<bool>);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// 统一的翻译服务
///
/// 服务与页面 DOM 一样只能在单线程上使用；多次调用 `translate_document`
/// 共享同一个调度队列和翻译缓存。
///
/// ## 流程
///
/// 1. 正在扫描或翻译时拒绝新的调用
/// 2. 页面域名命中排除列表时直接返回
/// 3. 收集可翻译段落并入队
/// 4. 运行批次编排器直到队列清空
///
/// # 示例
///
/// ```rust,no_run
/// use inline_translate::parsers::html::html_to_dom;
/// use inline_translate::translation::{TranslationConfig, TranslationService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TranslationConfig::default_with_lang("ja", None);
/// let service = TranslationService::from_config(config)?;
///
/// let dom = html_to_dom(b"<p>Hello, streaming world!</p>", "utf-8");
/// let summary = service.translate_document(&dom, None).await?;
/// println!("翻译了 {} 段", summary.collected);
/// # Ok(())
/// # }
/// ```
pub struct TranslationService<T> {
    config: TranslationConfig,
    collector: RefCell<TextCollector>,
    orchestrator: BatchOrchestrator<T>,
    scanning: Cell<bool>,
    stats: ServiceStats,
}

impl TranslationService<HttpTransport> {
    /// 使用 HTTP 传输创建服务
    pub fn from_config(config: TranslationConfig) -> TranslationResult<Self> {
        let transport = HttpTransport::from_config(&config)?;
        Self::new(transport, config)
    }
}

impl<T: StreamTransport> TranslationService<T> {
    /// 使用指定的传输实现创建服务
    ///
    /// # 错误
    ///
    /// 配置校验失败时返回 `ConfigError`。
    pub fn new(transport: T, config: TranslationConfig) -> TranslationResult<Self> {
        config.validate()?;

        let collector = TextCollector::from_config(&config);
        let orchestrator = BatchOrchestrator::new(transport, &config);

        Ok(Self {
            config,
            collector: RefCell::new(collector),
            orchestrator,
            scanning: Cell::new(false),
            stats: ServiceStats::default(),
        })
    }

    /// 替换批次编排器的设置，例如固定批次大小或关闭缓存
    pub fn map_orchestrator(
        mut self,
        f: impl FnOnce(BatchOrchestrator<T>) -> BatchOrchestrator<T>,
    ) -> Self {
        self.orchestrator = f(self.orchestrator);
        self
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator<T> {
        &self.orchestrator
    }

    pub fn get_stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.orchestrator.cache_stats()
    }

    /// 是否正在扫描或翻译
    pub fn is_busy(&self) -> bool {
        self.scanning.get() || self.orchestrator.state().is_translating()
    }

    /// 原地翻译文档
    ///
    /// 译文以 `<span class="immersive-translate-target">` 的形式追加到各个源元素
    /// 末尾。单个段落或批次的失败只会体现在对应译文节点的错误状态上，
    /// 不会让整个调用返回错误。
    ///
    /// # 参数
    ///
    /// * `dom` - 要翻译的文档
    /// * `page_url` - 页面地址，用于域名排除检查；为空时跳过检查
    pub async fn translate_document(
        &self,
        dom: &RcDom,
        page_url: Option<&str>,
    ) -> TranslationResult<TranslationSummary> {
        if self.orchestrator.state().is_translating() {
            tracing::info!("翻译进行中，请稍候");
            self.stats.rejected_busy.fetch_add(1, Ordering::Relaxed);
            return Ok(TranslationSummary::skipped(TranslationOutcome::Busy));
        }
        let Some(guard) = ScanGuard::acquire(&self.scanning) else {
            tracing::info!("扫描进行中，请稍候");
            self.stats.rejected_busy.fetch_add(1, Ordering::Relaxed);
            return Ok(TranslationSummary::skipped(TranslationOutcome::Busy));
        };

        let start_time = Instant::now();

        if let Some(host) = page_url.and_then(host_of) {
            if is_excluded_domain(&host, &self.config.excluded_domains) {
                tracing::info!("域名 {} 在排除列表中，跳过翻译", host);
                self.stats.excluded.fetch_add(1, Ordering::Relaxed);
                return Ok(TranslationSummary::skipped(TranslationOutcome::ExcludedDomain));
            }
        }

        tracing::info!("扫描可翻译段落...");
        let contexts = self.collector.borrow_mut().collect(&dom.document);
        let collected = contexts.len();
        tracing::info!("找到 {} 个新段落", collected);
        self.stats
            .paragraphs_collected
            .fetch_add(collected, Ordering::Relaxed);

        self.orchestrator.enqueue(contexts);
        drop(guard);

        let before = self.orchestrator.stats();
        let after = self.orchestrator.run().await;
        let elapsed = start_time.elapsed();

        self.stats.documents.fetch_add(1, Ordering::Relaxed);
        self.stats.add_processing_time(elapsed);

        let batches = after.since(&before);
        tracing::info!(
            "文档翻译完成: {} 段, {} 批 (失败 {}), 缓存命中 {}, 耗时 {:?}",
            collected,
            batches.batches,
            batches.failed_batches,
            batches.cache_hits,
            elapsed
        );

        Ok(TranslationSummary {
            outcome: TranslationOutcome::Completed,
            collected,
            batches,
            elapsed,
        })
    }
}
