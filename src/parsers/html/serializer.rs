use std::io;

use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, RcDom, SerializableHandle};

/// 序列化文档
///
/// `document_encoding` 为空或无法识别时输出 UTF-8。
pub fn serialize_document(dom: &RcDom, document_encoding: &str) -> io::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            buf = data.to_vec();
        }
    }

    Ok(buf)
}

/// 序列化节点的全部子节点（等价于 innerHTML）
pub fn inner_html(node: &Handle) -> String {
    serialize_handle(node, TraversalScope::ChildrenOnly(None))
}

fn serialize_handle(node: &Handle, scope: TraversalScope) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..Default::default()
    };

    if let Err(e) = serialize(&mut buf, &serializable, opts) {
        tracing::warn!("节点序列化失败: {}", e);
    }

    String::from_utf8_lossy(&buf).into_owned()
}
