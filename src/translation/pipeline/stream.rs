//! `%%` 段落分隔符解析
//!
//! 按到达顺序消费文本块，跨块缓冲，遇到 `%%` 时把之前的内容交给当前段落并
//! 推进游标。解析器本身不接触 DOM，只产出分派指令，由批处理器落到译文节点上。
//!
//! 普通段落会在没有分隔符时提前输出，但保留末尾由空白和 `%` 组成的片段，
//! 避免半个分隔符闪现在页面上；富文本段落只在分隔符或流结束时整体输出。

use crate::translation::config::constants::PARAGRAPH_SEPARATOR;

/// 段落的输出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphMode {
    Plain,
    Rich,
}

/// 分派指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// 追加到普通段落的增量文本
    Append { index: usize, text: String },
    /// 富文本段落的完整输出
    Complete { index: usize, text: String },
}

/// 单个批次的流解析状态
#[derive(Debug)]
pub struct StreamSplitter {
    modes: Vec<ParagraphMode>,
    buffer: String,
    current: usize,
    /// 当前段落还没有输出过任何内容
    at_start: bool,
    /// 超出最后一个段落的内容
    overflow: String,
    finished: bool,
}

impl StreamSplitter {
    pub fn new(modes: Vec<ParagraphMode>) -> Self {
        Self {
            modes,
            buffer: String::new(),
            current: 0,
            at_start: true,
            overflow: String::new(),
            finished: false,
        }
    }

    /// 当前接收内容的段落下标（只增不减）
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 尚未分派的缓冲内容
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// 消费一个文本块
    pub fn push(&mut self, chunk: &str) -> Vec<Dispatch> {
        let mut out = Vec::new();
        if self.finished {
            tracing::debug!("流已结束，丢弃文本块 ({} 字节)", chunk.len());
            return out;
        }

        self.buffer.push_str(chunk);

        while let Some(pos) = self.buffer.find(PARAGRAPH_SEPARATOR) {
            let content: String = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + PARAGRAPH_SEPARATOR.len());
            self.complete_current(content.trim_end(), &mut out);
            self.current += 1;
            self.at_start = true;
        }

        if self.current_mode() == Some(ParagraphMode::Plain) {
            let keep_from = self.holdback_start();
            if keep_from > 0 {
                let flushed: String = self.buffer.drain(..keep_from).collect();
                self.flush_plain(&flushed, &mut out);
            }
        }

        out
    }

    /// 流结束：剩余内容交给当前段落，多余内容尽量并入最后一个普通段落
    ///
    /// 重复调用不会再次输出。
    pub fn finish(&mut self) -> Vec<Dispatch> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.finished = true;

        let rest = std::mem::take(&mut self.buffer);
        self.complete_current(rest.trim(), &mut out);

        let overflow = std::mem::take(&mut self.overflow);
        let overflow = overflow.trim();
        if !overflow.is_empty() {
            match self.modes.last() {
                Some(ParagraphMode::Plain) => {
                    tracing::warn!("模型输出的段落多于请求，多余内容并入最后一段");
                    out.push(Dispatch::Append {
                        index: self.modes.len() - 1,
                        text: format!(" {}", overflow),
                    });
                }
                _ => {
                    tracing::warn!("模型输出的段落多于请求，丢弃多余内容 ({} 字符)", overflow.chars().count());
                }
            }
        }

        out
    }

    fn current_mode(&self) -> Option<ParagraphMode> {
        self.modes.get(self.current).copied()
    }

    fn complete_current(&mut self, content: &str, out: &mut Vec<Dispatch>) {
        match self.current_mode() {
            Some(ParagraphMode::Plain) => self.flush_plain(content, out),
            Some(ParagraphMode::Rich) => {
                let text = content.trim();
                if !text.is_empty() {
                    out.push(Dispatch::Complete {
                        index: self.current,
                        text: text.to_string(),
                    });
                }
            }
            None => {
                if !content.trim().is_empty() {
                    tracing::warn!("分隔符多于段落数，内容暂存为溢出");
                    if !self.overflow.is_empty() {
                        self.overflow.push(' ');
                    }
                    self.overflow.push_str(content.trim());
                }
            }
        }
    }

    fn flush_plain(&mut self, text: &str, out: &mut Vec<Dispatch>) {
        let text = if self.at_start { text.trim_start() } else { text };
        if text.is_empty() {
            return;
        }
        self.at_start = false;
        out.push(Dispatch::Append {
            index: self.current,
            text: text.to_string(),
        });
    }

    /// 缓冲区末尾由空白和 `%` 组成的片段的起始位置
    fn holdback_start(&self) -> usize {
        self.buffer
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_whitespace() || *c == '%')
            .last()
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }
}
