use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
        let (string, _, _) = encoding.decode(data);
        string.into_owned()
    } else {
        String::from_utf8_lossy(data).into_owned()
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap_or_default()
}

/// 创建一个游离（无父节点）的 HTML 元素
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建一个游离的文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 创建片段根节点，仅作为子节点的临时容器
pub fn create_fragment() -> Handle {
    Node::new(NodeData::Document)
}

/// 克隆节点；`deep` 为真时连同子树一起克隆
///
/// 克隆结果没有父节点。文档、DOCTYPE 与处理指令节点不可克隆。
pub fn clone_node(node: &Handle, deep: bool) -> Option<Handle> {
    let data = match &node.data {
        NodeData::Element {
            name,
            attrs,
            mathml_annotation_xml_integration_point,
            ..
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        _ => return None,
    };

    let clone = Node::new(data);
    if deep {
        for child in node.children.borrow().iter() {
            if let Some(child_clone) = clone_node(child, true) {
                append_child(&clone, child_clone);
            }
        }
    }
    Some(clone)
}

/// 获取父节点（不会破坏节点上的父引用）
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    child.parent.set(weak);
    parent
}

/// 将节点从其父节点上摘下
pub fn detach(node: &Handle) {
    if let Some(parent) = node.parent.take().and_then(|w| w.upgrade()) {
        parent
            .children
            .borrow_mut()
            .retain(|sibling| !Rc::ptr_eq(sibling, node));
    }
}

/// 将 `child` 追加为 `parent` 的最后一个子节点
pub fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 在原位置用 `wrapper` 包裹 `node`，`node` 成为 `wrapper` 的唯一子节点
///
/// `node` 没有父节点时不做任何事。
pub fn wrap_node(node: &Handle, wrapper: &Handle) {
    let Some(parent) = get_parent_node(node) else {
        return;
    };
    detach(wrapper);
    {
        let mut siblings = parent.children.borrow_mut();
        let Some(index) = siblings.iter().position(|sibling| Rc::ptr_eq(sibling, node)) else {
            return;
        };
        siblings[index] = wrapper.clone();
    }
    wrapper.parent.set(Some(Rc::downgrade(&parent)));
    node.parent.set(Some(Rc::downgrade(wrapper)));
    wrapper.children.borrow_mut().push(node.clone());
}

/// 移除全部子节点
pub fn remove_children(node: &Handle) {
    let children = node.children.take();
    for child in children.iter() {
        child.parent.set(None);
    }
}

/// 将 `fragment` 的子节点整体移动到 `parent` 末尾
pub fn move_children(fragment: &Handle, parent: &Handle) {
    let children = fragment.children.take();
    let mut target_children = parent.children.borrow_mut();
    for child in children {
        child.parent.set(Some(Rc::downgrade(parent)));
        target_children.push(child);
    }
}

/// 向节点末尾追加文本，若最后一个子节点已是文本节点则直接拼接
pub fn append_text(node: &Handle, text: &str) {
    if text.is_empty() {
        return;
    }

    if let Some(last) = node.children.borrow().last() {
        if let NodeData::Text { contents } = &last.data {
            contents.borrow_mut().push_slice(text);
            return;
        }
    }

    append_child(node, create_text(text));
}

/// 获取节点下所有文本节点拼接后的内容
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } | NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
        _ => {}
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 设置节点属性；`attr_value` 为 `None` 时删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attr_value {
            Some(value) => {
                if let Some(attr) = attrs.iter_mut().find(|a| &*a.name.local == attr_name) {
                    attr.value = StrTendril::from_slice(&value);
                } else {
                    attrs.push(Attribute {
                        name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                        value: StrTendril::from_slice(&value),
                    });
                }
            }
            None => attrs.retain(|a| &*a.name.local != attr_name),
        }
    }
}

/// 检查元素是否带有指定 class
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

/// 为元素添加 class（已存在时不重复添加）
pub fn add_class(node: &Handle, class_name: &str) {
    if has_class(node, class_name) {
        return;
    }
    let value = match get_node_attr(node, "class") {
        Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class_name),
        _ => class_name.to_string(),
    };
    set_node_attr(node, "class", Some(value));
}

/// 移除元素上的 class
pub fn remove_class(node: &Handle, class_name: &str) {
    if let Some(existing) = get_node_attr(node, "class") {
        let remaining: Vec<&str> = existing
            .split_whitespace()
            .filter(|c| *c != class_name)
            .collect();
        if remaining.is_empty() {
            set_node_attr(node, "class", None);
        } else {
            set_node_attr(node, "class", Some(remaining.join(" ")));
        }
    }
}

/// 查找第一个满足条件的直接子元素
pub fn find_child(parent: &Handle, predicate: impl Fn(&Handle) -> bool) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| predicate(child))
        .cloned()
}

/// 按 id 查找元素（深度优先）
pub fn find_element_by_id(node: &Handle, id: &str) -> Option<Handle> {
    if get_node_attr(node, "id").as_deref() == Some(id) {
        return Some(node.clone());
    }
    for child in node.children.borrow().iter() {
        if let Some(found) = find_element_by_id(child, id) {
            return Some(found);
        }
    }
    None
}

/// 查找指定标签名的全部元素（深度优先，文档顺序）
pub fn find_nodes(node: &Handle, node_name: &str) -> Vec<Handle> {
    let mut found_nodes = Vec::new();
    if get_node_name(node) == Some(node_name) {
        found_nodes.push(node.clone());
    }
    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, node_name));
    }
    found_nodes
}

/// 判断节点是否仍挂在某个文档树上
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if matches!(current.data, NodeData::Document) {
            return true;
        }
        match get_parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 读取文档声明的字符集
///
/// 支持 `<meta charset>` 与 `<meta http-equiv="content-type">` 两种写法。
pub fn get_charset(node: &Handle) -> Option<String> {
    for meta_node in find_nodes(node, "meta").iter() {
        if let Some(charset) = get_node_attr(meta_node, "charset") {
            return Some(charset.trim().to_string());
        }

        if get_node_attr(meta_node, "http-equiv")
            .unwrap_or_default()
            .eq_ignore_ascii_case("content-type")
        {
            if let Some(content) = get_node_attr(meta_node, "content") {
                let charset = content
                    .split(';')
                    .map(str::trim)
                    .find_map(|part| part.strip_prefix("charset="))
                    .map(|value| value.trim_matches('"').to_string());
                if charset.is_some() {
                    return charset;
                }
            }
        }
    }

    None
}

/// 解析文档并确定其编码
///
/// 先按 `input_encoding`（默认 UTF-8）解析；文档自身声明了有效字符集时按该字符集重新解析。
pub fn parse_with_encoding(data: &[u8], input_encoding: Option<&str>) -> (RcDom, String) {
    let mut document_encoding = input_encoding.unwrap_or("utf-8").to_string();
    let mut dom = html_to_dom(data, &document_encoding);

    if input_encoding.is_none() {
        if let Some(html_charset) = get_charset(&dom.document) {
            if let Some(encoding) = Encoding::for_label_no_replacement(html_charset.as_bytes()) {
                document_encoding = encoding.name().to_string();
                dom = html_to_dom(data, &document_encoding);
            }
        }
    }

    (dom, document_encoding)
}
