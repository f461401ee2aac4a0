//! 内联元素分类
//!
//! 把“标签名 + class”映射为封闭的分类枚举，DOM 遍历只需按分类分派。

use markup5ever_rcdom::Handle;

use crate::parsers::html::{get_node_attr, get_node_name};
use crate::translation::config::constants::TARGET_CLASS;

/// 成对令牌包裹的内联标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairedTag {
    Anchor,
    Strong,
    Em,
    Code,
}

impl PairedTag {
    /// 令牌 id 前缀
    pub fn prefix(self) -> &'static str {
        match self {
            PairedTag::Anchor => "a",
            PairedTag::Strong => "strong",
            PairedTag::Em => "em",
            PairedTag::Code => "code",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "a" => Some(PairedTag::Anchor),
            "strong" => Some(PairedTag::Strong),
            "em" => Some(PairedTag::Em),
            "code" => Some(PairedTag::Code),
            _ => None,
        }
    }
}

/// 原子令牌的 id 前缀（脚注引用）
pub const ATOMIC_PREFIX: &str = "ref";

/// 内联元素的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// 整棵子树作为一个不可拆分的令牌
    Atomic,
    /// 开/闭令牌包裹可翻译的子内容
    Paired(PairedTag),
    /// 元素本身不产生令牌，子节点照常遍历
    Flatten,
    /// 整棵子树不参与翻译（脚本、样式、已有译文节点）
    Skip,
}

impl InlineKind {
    /// 是否会在令牌文本中产生令牌
    pub fn is_token(self) -> bool {
        matches!(self, InlineKind::Atomic | InlineKind::Paired(_))
    }
}

/// 按标签名与 class 属性分类，不依赖 DOM
pub fn classify_parts(tag: &str, class_attr: Option<&str>) -> InlineKind {
    let tag = tag.to_ascii_lowercase();
    let has_class = |wanted: &str| {
        class_attr
            .map(|classes| classes.split_whitespace().any(|c| c == wanted))
            .unwrap_or(false)
    };

    if matches!(tag.as_str(), "script" | "style" | "noscript" | "template") || has_class(TARGET_CLASS) {
        return InlineKind::Skip;
    }

    // 维基百科风格脚注：<sup class="reference"> 或任意 .mw-ref
    if (tag == "sup" && has_class("reference")) || has_class("mw-ref") {
        return InlineKind::Atomic;
    }

    match PairedTag::from_tag(&tag) {
        Some(paired) => InlineKind::Paired(paired),
        None => InlineKind::Flatten,
    }
}

/// 对 DOM 节点分类；非元素节点一律视为 `Flatten`
pub fn classify(node: &Handle) -> InlineKind {
    match get_node_name(node) {
        Some(tag) => classify_parts(tag, get_node_attr(node, "class").as_deref()),
        None => InlineKind::Flatten,
    }
}

/// 子树中是否存在会产生令牌的内联元素
pub fn has_inline_tokens(node: &Handle) -> bool {
    node.children.borrow().iter().any(|child| match classify(child) {
        InlineKind::Skip => false,
        kind if kind.is_token() => true,
        _ => has_inline_tokens(child),
    })
}
