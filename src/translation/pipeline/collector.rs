//! 文本收集器
//!
//! 在文档中挑选可翻译的块级元素，生成调度单元 [`TranslationContext`]。
//! 上下文只持有源元素的弱引用，页面随时可能移除这些节点。
//!
//! 只收集最内层的候选元素。既有直接文本又含候选子元素的混合容器本身不收集，
//! 它的直接文本节点被包进 `immersive-translate-text-wrapper` 并各自翻译，
//! 这样子元素的文本不会被发送两次。

use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, NodeData};

use super::filters::should_skip_translation;
use super::target::RenderTarget;
use crate::parsers::html::{create_element, get_node_name, has_class, wrap_node};
use crate::translation::config::constants::{TARGET_CLASS, TEXT_WRAPPER_CLASS};
use crate::translation::config::TranslationConfig;
use crate::translation::richtext::{has_inline_tokens, tokenize};

/// 候选块级元素
const CANDIDATE_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "td", "div", "figcaption", "dt",
    "dd",
];

/// 这些元素内部的内容一律不翻译
const SKIPPED_CONTAINERS: &[&str] = &["script", "style", "noscript", "template"];

/// 需要直接文本子节点才算候选的容器
const DIRECT_TEXT_TAGS: &[&str] = &["div", "li", "td"];

/// 文本长度下限（不含）
const MIN_TEXT_CHARS: usize = 8;

/// 混合容器中需要包裹的直接文本最短长度
const WRAP_MIN_CHARS: usize = 3;

/// 富文本模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichTextMode {
    None,
    V2,
}

/// 一个待翻译段落
#[derive(Debug, Clone)]
pub struct TranslationContext {
    source: Weak<Node>,
    pub text: String,
    pub rich_mode: RichTextMode,
}

impl TranslationContext {
    pub fn new(source: &Handle, text: impl Into<String>, rich_mode: RichTextMode) -> Self {
        Self {
            source: Rc::downgrade(source),
            text: text.into(),
            rich_mode,
        }
    }

    /// 源元素；已被页面释放时返回 `None`
    pub fn source(&self) -> Option<Handle> {
        self.source.upgrade()
    }

    pub fn is_rich(&self) -> bool {
        self.rich_mode == RichTextMode::V2
    }

    /// 实际发给模型的文本
    ///
    /// 富文本段落是带标记行的令牌文本，普通段落把换行压成空格。
    pub fn request_text(&self) -> String {
        match self.source() {
            Some(source) if self.is_rich() => tokenize(&source).text,
            _ => self.text.replace('\n', " "),
        }
    }
}

/// 收集选项
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub rich_text: bool,
    pub skip_same_language: bool,
    pub target_language: String,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            rich_text: true,
            skip_same_language: true,
            target_language: "zh-CN".to_string(),
        }
    }
}

impl From<&TranslationConfig> for CollectorOptions {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            rich_text: config.rich_text,
            skip_same_language: config.skip_same_language,
            target_language: config.target_language.clone(),
        }
    }
}

/// 收集统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    pub candidates: usize,
    pub collected: usize,
    pub rich: usize,
    pub skipped_same_language: usize,
    pub wrapped: usize,
}

/// DOM 文本收集器
pub struct TextCollector {
    options: CollectorOptions,
    stats: CollectionStats,
}

impl TextCollector {
    pub fn new(options: CollectorOptions) -> Self {
        Self {
            options,
            stats: CollectionStats::default(),
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(CollectorOptions::from(config))
    }

    pub fn stats(&self) -> CollectionStats {
        self.stats
    }

    /// 按文档顺序收集可翻译段落
    pub fn collect(&mut self, root: &Handle) -> Vec<TranslationContext> {
        self.stats = CollectionStats::default();
        let mut contexts = Vec::new();
        self.walk(root, &mut contexts);

        tracing::debug!(
            "扫描完成: 候选 {}, 收集 {} (富文本 {}), 同语言跳过 {}, 包裹文本 {}",
            self.stats.candidates,
            self.stats.collected,
            self.stats.rich,
            self.stats.skipped_same_language,
            self.stats.wrapped
        );
        contexts
    }

    fn walk(&mut self, node: &Handle, out: &mut Vec<TranslationContext>) {
        if let Some(tag) = get_node_name(node) {
            if SKIPPED_CONTAINERS.contains(&tag) || has_class(node, TARGET_CLASS) {
                return;
            }
            if is_candidate(node, tag) {
                self.stats.candidates += 1;
                if let Some(context) = self.evaluate(node, tag) {
                    out.push(context);
                }
            }
        }

        // 包裹会替换子节点，先取快照
        let children: Vec<Handle> = node.children.borrow().clone();
        for child in &children {
            self.walk(child, out);
        }
    }

    fn evaluate(&mut self, element: &Handle, tag: &str) -> Option<TranslationContext> {
        if RenderTarget::find(element).is_some() {
            return None;
        }
        if has_candidate_descendant(element) {
            self.stats.wrapped += wrap_direct_text_nodes(element).len();
            return None;
        }
        if DIRECT_TEXT_TAGS.contains(&tag) && !has_direct_text(element) {
            return None;
        }

        let text = visible_text(element);
        let text = text.trim();
        if text.chars().count() <= MIN_TEXT_CHARS || text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        if self.options.skip_same_language
            && should_skip_translation(text, &self.options.target_language)
        {
            self.stats.skipped_same_language += 1;
            return None;
        }

        let rich_mode = if self.options.rich_text && has_inline_tokens(element) {
            self.stats.rich += 1;
            RichTextMode::V2
        } else {
            RichTextMode::None
        };
        self.stats.collected += 1;

        Some(TranslationContext::new(element, text, rich_mode))
    }
}

fn is_candidate(node: &Handle, tag: &str) -> bool {
    CANDIDATE_TAGS.contains(&tag) || (tag == "span" && has_class(node, TEXT_WRAPPER_CLASS))
}

/// 子树中是否还有别的候选元素（不进入脚本样式和译文节点）
fn has_candidate_descendant(element: &Handle) -> bool {
    element.children.borrow().iter().any(|child| {
        let Some(tag) = get_node_name(child) else {
            return false;
        };
        if SKIPPED_CONTAINERS.contains(&tag) || has_class(child, TARGET_CLASS) {
            return false;
        }
        is_candidate(child, tag) || has_candidate_descendant(child)
    })
}

/// 把容器中足够长、且不全是数字的直接文本节点包进 wrapper span
///
/// 已包裹过的文本不再是直接子节点，重复调用不会重复包裹。
pub fn wrap_direct_text_nodes(container: &Handle) -> Vec<Handle> {
    let texts: Vec<Handle> = container
        .children
        .borrow()
        .iter()
        .filter(|child| match &child.data {
            NodeData::Text { contents } => {
                let contents = contents.borrow();
                let text = contents.trim();
                text.chars().count() >= WRAP_MIN_CHARS && !text.chars().all(|c| c.is_ascii_digit())
            }
            _ => false,
        })
        .cloned()
        .collect();

    texts
        .iter()
        .map(|text| {
            let wrapper = create_element("span", &[("class", TEXT_WRAPPER_CLASS)]);
            wrap_node(text, &wrapper);
            wrapper
        })
        .collect()
}

/// 是否有非空白的直接文本子节点
pub fn has_direct_text(element: &Handle) -> bool {
    element.children.borrow().iter().any(|child| match &child.data {
        NodeData::Text { contents } => !contents.borrow().trim().is_empty(),
        _ => false,
    })
}

/// 元素可见文本：不含脚本样式和已有译文
pub fn visible_text(element: &Handle) -> String {
    let mut text = String::new();
    push_visible_text(element, &mut text);
    text
}

fn push_visible_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } => {
            let skipped = get_node_name(node)
                .map(|tag| SKIPPED_CONTAINERS.contains(&tag))
                .unwrap_or(false);
            if skipped || has_class(node, TARGET_CLASS) {
                return;
            }
            for child in node.children.borrow().iter() {
                push_visible_text(child, out);
            }
        }
        _ => {
            for child in node.children.borrow().iter() {
                push_visible_text(child, out);
            }
        }
    }
}
