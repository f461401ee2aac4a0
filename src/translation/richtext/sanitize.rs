//! 克隆元素的属性消毒
//!
//! 先按黑名单剔除事件处理器和可执行脚本的属性，再按标签白名单保留；
//! `href` 中的 `javascript:` / `data:` / `vbscript:` 一律替换为 `#`。

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::{get_node_attr, get_node_name, set_node_attr};

/// 非 `on*` 形式的危险属性
const DANGEROUS_ATTRS: &[&str] = &["formaction", "xlink:href", "action", "srcdoc", "data"];

const ANCHOR_SAFE_ATTRS: &[&str] = &[
    "href", "title", "target", "rel", "class", "id", "lang", "dir", "hreflang",
];

const DEFAULT_SAFE_ATTRS: &[&str] = &["class", "id", "lang", "dir"];

const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// 属性是否属于事件处理器或脚本触发属性
pub fn is_dangerous_attr(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("on") || DANGEROUS_ATTRS.contains(&name.as_str())
}

/// 标签允许保留的属性
pub fn safe_attrs_for(tag: &str) -> &'static [&'static str] {
    if tag.eq_ignore_ascii_case("a") {
        ANCHOR_SAFE_ATTRS
    } else {
        DEFAULT_SAFE_ATTRS
    }
}

/// 判断 URL 是否使用了可执行脚本的协议
pub fn is_dangerous_url(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    DANGEROUS_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// 消毒单个元素的属性
pub fn sanitize_element(node: &Handle) {
    let Some(tag) = get_node_name(node).map(str::to_string) else {
        return;
    };
    let safe_attrs = safe_attrs_for(&tag);

    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|attr| {
            let name = match &attr.name.prefix {
                Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                None => attr.name.local.to_string(),
            }
            .to_ascii_lowercase();

            let keep = !is_dangerous_attr(&name) && safe_attrs.contains(&name.as_str());
            if !keep {
                tracing::debug!("移除属性 <{} {}>", tag, name);
            }
            keep
        });
    }

    if let Some(href) = get_node_attr(node, "href") {
        if is_dangerous_url(&href) {
            tracing::warn!("替换危险链接: <{} href=\"{}\">", tag, href.trim());
            set_node_attr(node, "href", Some("#".to_string()));
        }
    }
}

/// 递归消毒整棵子树（用于原子令牌的深克隆）
pub fn sanitize_tree(node: &Handle) {
    sanitize_element(node);
    for child in node.children.borrow().iter() {
        sanitize_tree(child);
    }
}
