//! chat-completions SSE 响应解析
//!
//! 按字节缓冲，遇到换行才解码整行，多字节字符跨网络分块时不会被截断。

use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// 解码得到的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Content(String),
    Done,
}

#[derive(Debug, Default, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// 增量 SSE 解码器
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一段字节，返回其中完整行解析出的事件
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// 连接关闭时处理最后一行（可能没有换行结尾）
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

/// 解析单行；空行、注释、无内容的增量返回 `None`
pub fn parse_line(line: &str) -> Option<SseEvent> {
    let trimmed = line.trim();
    let data = trimmed.strip_prefix(DATA_PREFIX)?.trim_start();

    if data == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Content),
        Err(e) => {
            tracing::error!("SSE 数据解析失败: {}", e);
            None
        }
    }
}
