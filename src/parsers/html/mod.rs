//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（解析、克隆、节点增删、属性与文本访问）
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;

pub use dom::{
    add_class, append_child, append_text, clone_node, create_element, create_fragment,
    create_text, detach, find_child, find_element_by_id, find_nodes, get_charset, get_node_attr,
    get_node_name, get_parent_node, has_class, html_to_dom, is_attached, move_children,
    parse_with_encoding, remove_children, remove_class, set_node_attr, text_content, wrap_node,
};
pub use serializer::{inner_html, serialize_document};
