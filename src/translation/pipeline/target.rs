//! 译文节点生命周期
//!
//! 译文节点是源元素的最后一个子节点 `<span class="immersive-translate-target">`。
//! 插入为子节点而不是兄弟节点，宿主页面的 flex/grid 布局不受影响。
//!
//! 状态：加载中 → 流式输出（纯文本或富文本）→ 成功 / 错误。

use markup5ever_rcdom::Handle;

use crate::parsers::html::{
    add_class, append_child, append_text, create_element, detach, find_child, has_class,
    remove_children, remove_class, text_content,
};
use crate::translation::config::constants::{ERROR_CLASS, LOADING_CLASS, LOADING_TEXT, TARGET_CLASS};
use crate::translation::error::helpers::INCOMPLETE_MESSAGE;
use crate::translation::richtext::{looks_truncated, render, strip_tokens, TokenizedParagraph};

/// 译文节点
#[derive(Debug, Clone)]
pub struct RenderTarget {
    node: Handle,
}

impl RenderTarget {
    /// 为源元素创建带加载提示的译文节点
    ///
    /// 源元素已有译文节点（直接子节点）时直接返回已有节点。
    pub fn create_loading_target(source: &Handle) -> Self {
        if let Some(existing) = Self::find(source) {
            return existing;
        }

        let node = create_element("span", &[("class", TARGET_CLASS)]);
        let loading = create_element("span", &[("class", LOADING_CLASS)]);
        append_text(&loading, LOADING_TEXT);
        append_child(&node, loading);
        append_child(source, node.clone());

        Self { node }
    }

    /// 查找源元素上已有的译文节点
    pub fn find(source: &Handle) -> Option<Self> {
        find_child(source, |child| has_class(child, TARGET_CLASS)).map(|node| Self { node })
    }

    pub fn node(&self) -> &Handle {
        &self.node
    }

    /// 追加译文文本；第一次收到内容时清除加载提示
    pub fn append_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.is_loading() {
            remove_children(&self.node);
            remove_class(&self.node, LOADING_CLASS);
        }
        append_text(&self.node, text);
    }

    /// 用纯文本替换全部内容
    pub fn replace_text(&self, text: &str) {
        remove_children(&self.node);
        remove_class(&self.node, LOADING_CLASS);
        append_text(&self.node, text);
    }

    /// 清除加载提示，保留已有内容
    pub fn clear_loading(&self) {
        remove_class(&self.node, LOADING_CLASS);
        let spinners: Vec<Handle> = self
            .node
            .children
            .borrow()
            .iter()
            .filter(|child| has_class(child, LOADING_CLASS))
            .cloned()
            .collect();
        for spinner in spinners {
            detach(&spinner);
        }
    }

    /// 显示错误 `[Error: message]` 并标记为错误状态
    pub fn show_error(&self, message: &str) {
        self.clear_loading();
        remove_children(&self.node);
        append_text(&self.node, &format!("[Error: {}]", message));
        add_class(&self.node, ERROR_CLASS);
    }

    pub fn is_loading(&self) -> bool {
        has_class(&self.node, LOADING_CLASS)
            || self
                .node
                .children
                .borrow()
                .iter()
                .any(|child| has_class(child, LOADING_CLASS))
    }

    pub fn is_errored(&self) -> bool {
        has_class(&self.node, ERROR_CLASS)
    }

    /// 是否已有用户可见的译文（加载提示不算）
    pub fn has_content(&self) -> bool {
        !self.is_loading() && !self.text().trim().is_empty()
    }

    pub fn text(&self) -> String {
        text_content(&self.node)
    }

    /// 渲染一个完整的富文本段落
    ///
    /// 令牌校验失败时回退：输出像是被截断或去掉令牌后为空则显示不完整错误，
    /// 否则显示去掉令牌的纯文本。返回值表示是否按令牌协议渲染成功。
    pub fn render_rich(&self, paragraph: &TokenizedParagraph, output: &str) -> bool {
        match render(&self.node, paragraph, output) {
            Ok(()) => {
                remove_class(&self.node, LOADING_CLASS);
                true
            }
            Err(reason) => {
                tracing::warn!("富文本校验失败: {}，回退为纯文本", reason);
                let stripped = strip_tokens(output);
                if looks_truncated(output) || stripped.is_empty() {
                    self.show_error(INCOMPLETE_MESSAGE);
                } else {
                    self.replace_text(&stripped);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{find_element_by_id, html_to_dom, inner_html};
    use crate::translation::richtext::tokenize;

    fn paragraph(html: &str) -> (markup5ever_rcdom::RcDom, Handle) {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let p = find_element_by_id(&dom.document, "p").unwrap();
        (dom, p)
    }

    #[test]
    fn target_is_last_child_and_idempotent() {
        let (_dom, p) = paragraph(r#"<div><p id="p">Hello <b>world</b></p></div>"#);
        let first = RenderTarget::create_loading_target(&p);
        let second = RenderTarget::create_loading_target(&p);

        assert!(std::rc::Rc::ptr_eq(first.node(), second.node()));
        let children = p.children.borrow();
        assert!(std::rc::Rc::ptr_eq(children.last().unwrap(), first.node()));
        assert_eq!(
            children.iter().filter(|c| has_class(c, TARGET_CLASS)).count(),
            1
        );
        assert!(first.is_loading());
        assert_eq!(first.text(), LOADING_TEXT);
        assert!(!first.has_content());
    }

    #[test]
    fn first_append_clears_loading() {
        let (_dom, p) = paragraph(r#"<p id="p">Hello</p>"#);
        let target = RenderTarget::create_loading_target(&p);
        target.append_text("你");
        target.append_text("好");
        assert!(!target.is_loading());
        assert_eq!(target.text(), "你好");
        assert!(target.has_content());
    }

    #[test]
    fn show_error_replaces_content_and_marks_node() {
        let (_dom, p) = paragraph(r#"<p id="p">Hello</p>"#);
        let target = RenderTarget::create_loading_target(&p);
        target.show_error("boom");
        assert_eq!(target.text(), "[Error: boom]");
        assert!(target.is_errored());
        assert!(!target.is_loading());
    }

    #[test]
    fn clear_loading_keeps_content() {
        let (_dom, p) = paragraph(r#"<p id="p">Hello</p>"#);
        let target = RenderTarget::create_loading_target(&p);
        target.clear_loading();
        assert_eq!(target.text(), "");
        target.append_text("done");
        target.clear_loading();
        assert_eq!(target.text(), "done");
    }

    #[test]
    fn rich_fallbacks() {
        let (_dom, p) = paragraph(r#"<p id="p">Read <a href="/x">this</a> now</p>"#);
        let tokenized = tokenize(&p);
        let target = RenderTarget::create_loading_target(&p);

        // 缺少闭合令牌：去掉令牌后显示纯文本
        assert!(!target.render_rich(&tokenized, "阅读[[ITC:a0]]这个 现在"));
        assert_eq!(target.text(), "阅读这个 现在");
        assert!(!target.is_errored());

        // 截断：显示不完整错误
        assert!(!target.render_rich(&tokenized, "阅读[[ITC:a0]]这个[[/IT"));
        assert_eq!(target.text(), "[Error: Incomplete translation]");
        assert!(target.is_errored());
    }

    #[test]
    fn rich_success_rebuilds_markup() {
        let (_dom, p) = paragraph(r#"<p id="p">Read <a href="/x">this</a> now</p>"#);
        let tokenized = tokenize(&p);
        let target = RenderTarget::create_loading_target(&p);
        assert!(target.render_rich(&tokenized, "现在阅读[[ITC:a0]]这个[[/ITC]]"));
        assert_eq!(inner_html(target.node()), r#"现在阅读<a href="/x">这个</a>"#);
        assert!(!target.is_loading());
    }
}
