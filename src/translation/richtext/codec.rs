//! RichText V2 令牌协议编解码
//!
//! 模型只处理纯文本：内联元素被替换为 `[[ITC:id]]` / `[[/ITC]]` 令牌，
//! 原始元素克隆保存在令牌表中；模型输出经校验后再用这些克隆重建 DOM。
//!
//! 闭合令牌不带 id，嵌套顺序本身决定闭合的是哪一个元素。旧格式
//! `[[/ITC:a0]]` 仍可解析，但与不带 id 的闭合令牌等价。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use super::classify::{classify, InlineKind, PairedTag, ATOMIC_PREFIX};
use super::sanitize::{sanitize_element, sanitize_tree};
use crate::parsers::html::{append_child, clone_node, create_fragment, create_text, move_children, remove_children};
use crate::translation::error::RichTextError;

/// 协议标记，独占令牌文本的第一行
pub const RICH_V2_MARKER: &str = "[[ITC_RICH_V2]]";

/// 通用闭合令牌
pub const CLOSE_TOKEN: &str = "[[/ITC]]";

const TOKEN_PATTERN: &str = r"\[\[(/)?ITC(?::([a-z]+[0-9]+))?\]\]";

fn token_regex() -> &'static Regex {
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    TOKEN_REGEX.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("令牌正则表达式无效"))
}

/// 开令牌
pub fn open_token(id: &str) -> String {
    format!("[[ITC:{}]]", id)
}

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Paired,
    Atomic,
}

/// 令牌表条目：持有独占的、已消毒的游离克隆
#[derive(Clone)]
pub struct TokenEntry {
    pub kind: TokenKind,
    /// 仅成对令牌有值
    pub source_tag: Option<PairedTag>,
    pub element: Handle,
}

impl fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEntry")
            .field("kind", &self.kind)
            .field("source_tag", &self.source_tag)
            .finish_non_exhaustive()
    }
}

/// 一个段落的令牌化结果
#[derive(Debug, Clone)]
pub struct TokenizedParagraph {
    pub marker: &'static str,
    pub text: String,
    pub token_map: BTreeMap<String, TokenEntry>,
}

/// 解析模型输出得到的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Text(String),
    /// 开令牌；缺少 id 时为 `None`，校验阶段会被拒绝
    Open(Option<String>),
    /// 闭合令牌；id 只出现在旧格式中
    Close(Option<String>),
}

struct Tokenizer {
    text: String,
    token_map: BTreeMap<String, TokenEntry>,
    counters: HashMap<&'static str, usize>,
}

impl Tokenizer {
    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        let id = format!("{}{}", prefix, counter);
        *counter += 1;
        id
    }

    fn walk(&mut self, node: &Handle) {
        match &node.data {
            NodeData::Text { contents } => self.text.push_str(&contents.borrow()),
            NodeData::Element { .. } => match classify(node) {
                InlineKind::Skip => {}
                InlineKind::Atomic => {
                    let Some(clone) = clone_node(node, true) else {
                        return;
                    };
                    sanitize_tree(&clone);
                    let id = self.next_id(ATOMIC_PREFIX);
                    self.text.push_str(&open_token(&id));
                    self.token_map.insert(
                        id,
                        TokenEntry {
                            kind: TokenKind::Atomic,
                            source_tag: None,
                            element: clone,
                        },
                    );
                }
                InlineKind::Paired(tag) => {
                    let Some(clone) = clone_node(node, false) else {
                        return;
                    };
                    sanitize_element(&clone);
                    let id = self.next_id(tag.prefix());
                    self.text.push_str(&open_token(&id));
                    self.token_map.insert(
                        id,
                        TokenEntry {
                            kind: TokenKind::Paired,
                            source_tag: Some(tag),
                            element: clone,
                        },
                    );
                    self.walk_children(node);
                    self.text.push_str(CLOSE_TOKEN);
                }
                InlineKind::Flatten => self.walk_children(node),
            },
            _ => {}
        }
    }

    fn walk_children(&mut self, node: &Handle) {
        for child in node.children.borrow().iter() {
            self.walk(child);
        }
    }
}

/// 将元素的子树令牌化
pub fn tokenize(source: &Handle) -> TokenizedParagraph {
    let mut tokenizer = Tokenizer {
        text: String::new(),
        token_map: BTreeMap::new(),
        counters: HashMap::new(),
    };
    tokenizer.walk_children(source);

    tracing::debug!("令牌化完成: {} 个令牌", tokenizer.token_map.len());

    TokenizedParagraph {
        marker: RICH_V2_MARKER,
        text: format!("{}\n{}", RICH_V2_MARKER, tokenizer.text),
        token_map: tokenizer.token_map,
    }
}

/// 去掉包裹输出的单个代码块
pub fn strip_code_fences(text: &str) -> &str {
    let s = text.trim();
    if !s.starts_with("```") {
        return s;
    }

    let without_first_line = s.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    match without_first_line.rfind("```") {
        Some(last_fence) => without_first_line[..last_fence].trim(),
        None => without_first_line.trim(),
    }
}

/// 规范化模型输出：去掉回显的协议标记和代码块
pub fn normalize_output(output: &str) -> &str {
    let mut s = output.trim();
    if let Some(rest) = s.strip_prefix(RICH_V2_MARKER) {
        s = rest.trim();
    }
    strip_code_fences(s).trim()
}

/// 将模型输出拆分为文本与令牌
pub fn parse_output(output: &str) -> Vec<OutputItem> {
    let s = normalize_output(output);
    let mut items = Vec::new();
    let mut last = 0;

    for caps in token_regex().captures_iter(s) {
        let Some(full) = caps.get(0) else {
            continue;
        };
        if full.start() > last {
            items.push(OutputItem::Text(s[last..full.start()].to_string()));
        }

        let id = caps.get(2).map(|m| m.as_str().to_string());
        if caps.get(1).is_some() {
            items.push(OutputItem::Close(id));
        } else {
            items.push(OutputItem::Open(id));
        }
        last = full.end();
    }

    if last < s.len() {
        items.push(OutputItem::Text(s[last..].to_string()));
    }
    items
}

/// 校验解析结果；任一规则不满足即整体拒绝
pub fn validate(
    items: &[OutputItem],
    token_map: &BTreeMap<String, TokenEntry>,
) -> Result<(), RichTextError> {
    let mut stack: Vec<&str> = Vec::new();
    let mut seen_atomic: HashSet<&str> = HashSet::new();
    let mut open_counts: HashMap<&str, usize> = HashMap::new();
    let mut close_count = 0usize;
    let mut paired_open_count = 0usize;

    for item in items {
        match item {
            OutputItem::Text(_) => {}
            OutputItem::Open(None) => return Err(RichTextError::MissingId),
            OutputItem::Open(Some(id)) => {
                let entry = token_map
                    .get(id)
                    .ok_or_else(|| RichTextError::UnknownToken(id.clone()))?;
                *open_counts.entry(id.as_str()).or_insert(0) += 1;

                match entry.kind {
                    TokenKind::Atomic => {
                        if !seen_atomic.insert(id.as_str()) {
                            return Err(RichTextError::AtomicDuplicated(id.clone()));
                        }
                    }
                    TokenKind::Paired => {
                        paired_open_count += 1;
                        stack.push(id.as_str());
                    }
                }
            }
            OutputItem::Close(legacy_id) => {
                if let Some(id) = legacy_id {
                    if matches!(token_map.get(id), Some(entry) if entry.kind == TokenKind::Atomic) {
                        return Err(RichTextError::AtomicClosed(id.clone()));
                    }
                }
                close_count += 1;
                if stack.pop().is_none() {
                    return Err(RichTextError::UnbalancedClose);
                }
            }
        }
    }

    if let Some(top) = stack.last() {
        return Err(RichTextError::Unclosed(top.to_string()));
    }
    if close_count != paired_open_count {
        return Err(RichTextError::CountMismatch);
    }

    for id in token_map.keys() {
        if open_counts.get(id.as_str()).copied().unwrap_or(0) != 1 {
            return Err(RichTextError::MissingOrExtra(id.clone()));
        }
    }

    Ok(())
}

/// 校验输出并用令牌表中的克隆重建目标节点的内容
///
/// 校验失败时不改动目标节点。成功时先清空再整体追加构建好的片段。
pub fn render(
    target: &Handle,
    paragraph: &TokenizedParagraph,
    output: &str,
) -> Result<(), RichTextError> {
    let items = parse_output(output);
    validate(&items, &paragraph.token_map)?;

    let fragment = create_fragment();
    let mut stack: Vec<Handle> = vec![fragment.clone()];

    for item in items {
        let Some(parent) = stack.last().cloned() else {
            break;
        };
        match item {
            OutputItem::Text(text) => append_child(&parent, create_text(&text)),
            OutputItem::Open(Some(id)) => {
                let Some(entry) = paragraph.token_map.get(&id) else {
                    continue;
                };
                match entry.kind {
                    TokenKind::Atomic => {
                        if let Some(clone) = clone_node(&entry.element, true) {
                            append_child(&parent, clone);
                        }
                    }
                    TokenKind::Paired => {
                        if let Some(clone) = clone_node(&entry.element, false) {
                            append_child(&parent, clone.clone());
                            stack.push(clone);
                        }
                    }
                }
            }
            OutputItem::Open(None) => {}
            OutputItem::Close(_) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
        }
    }

    remove_children(target);
    move_children(&fragment, target);
    Ok(())
}

/// 去除全部协议令牌，得到尽力而为的纯文本
pub fn strip_tokens(output: &str) -> String {
    let normalized = normalize_output(output);
    token_regex()
        .replace_all(normalized, "")
        .replace(RICH_V2_MARKER, "")
        .trim()
        .to_string()
}

/// 输出是否在令牌中间被截断
pub fn looks_truncated(output: &str) -> bool {
    let s = output.trim_end();
    if s.ends_with('[') {
        return true;
    }
    match s.rfind("[[") {
        Some(pos) => !s[pos..].contains("]]"),
        None => false,
    }
}
