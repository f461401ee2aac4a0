//! 流式传输层
//!
//! 一次翻译请求对应一个事件通道：若干 `Chunk`，随后恰好一个终止事件
//! （`Error` 或 `Done`）。通道在终止事件之后不再产出任何事件，即使发送端
//! 违反约定重复发送终止事件。
//!
//! - `sse`: 解析 chat-completions 的 SSE 响应流
//! - `http`: 基于 reqwest 的传输实现

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::translation::error::TranslationResult;

pub mod http;
pub mod sse;

pub use http::HttpTransport;

/// 请求动作名
pub const TRANSLATE_ACTION: &str = "translate";

/// 流事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Done)
    }
}

/// 线上消息格式：`{chunk}` / `{error}` / `{done: true}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Chunk { chunk: String },
    Error { error: String },
    Done { done: bool },
}

impl From<StreamEvent> for WireMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Chunk(chunk) => WireMessage::Chunk { chunk },
            StreamEvent::Error(error) => WireMessage::Error { error },
            StreamEvent::Done => WireMessage::Done { done: true },
        }
    }
}

impl WireMessage {
    /// 转换为流事件；`{done: false}` 不是合法消息
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            WireMessage::Chunk { chunk } => Some(StreamEvent::Chunk(chunk)),
            WireMessage::Error { error } => Some(StreamEvent::Error(error)),
            WireMessage::Done { done: true } => Some(StreamEvent::Done),
            WireMessage::Done { done: false } => None,
        }
    }
}

/// 随请求发送的配置快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
    pub target_language: String,
    #[serde(default)]
    pub user_translation_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// 翻译请求 `{ action: "translate", text, config }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub action: String,
    pub text: String,
    pub config: RequestConfig,
}

impl TranslateRequest {
    pub fn new(text: String, config: RequestConfig) -> Self {
        Self {
            action: TRANSLATE_ACTION.to_string(),
            text,
            config,
        }
    }
}

/// 通道发送端，保证最多发送一个终止事件
#[derive(Debug)]
pub struct StreamSender {
    tx: mpsc::UnboundedSender<StreamEvent>,
    terminated: bool,
}

impl StreamSender {
    /// 发送文本片段；接收端已断开或已终止时返回 `false`
    pub fn chunk(&mut self, text: impl Into<String>) -> bool {
        if self.terminated {
            return false;
        }
        self.tx.send(StreamEvent::Chunk(text.into())).is_ok()
    }

    /// 发送错误并终止
    pub fn error(&mut self, message: impl Into<String>) {
        self.terminate(StreamEvent::Error(message.into()));
    }

    /// 发送完成并终止
    pub fn done(&mut self) {
        self.terminate(StreamEvent::Done);
    }

    fn terminate(&mut self, event: StreamEvent) {
        if self.terminated {
            tracing::debug!("忽略重复的终止事件: {:?}", event);
            return;
        }
        self.terminated = true;
        if self.tx.send(event).is_err() {
            tracing::debug!("接收端已断开，终止事件被丢弃");
        }
    }

    /// 接收端是否已断开
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 接收端断开时完成的 future，不借用发送端
    pub fn closed_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

/// 通道接收端
#[derive(Debug)]
pub struct StreamChannel {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl StreamChannel {
    /// 接收下一个事件；终止事件之后返回 `None`
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.next().await
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for StreamChannel {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                    this.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// 创建一对通道端点
pub fn stream_channel() -> (StreamSender, StreamChannel) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StreamSender {
            tx,
            terminated: false,
        },
        StreamChannel {
            rx,
            finished: false,
        },
    )
}

/// 流式传输
///
/// `open` 只负责建立通道；请求在后台执行，结果通过通道返回。
/// 丢弃返回的通道即表示消费端离开，实现应当中止底层请求。
pub trait StreamTransport {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel>;
}

impl<T: StreamTransport + ?Sized> StreamTransport for &T {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        (**self).open(request)
    }
}

impl<T: StreamTransport + ?Sized> StreamTransport for std::rc::Rc<T> {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        (**self).open(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_stops_after_first_terminal_event() {
        let (mut sender, mut channel) = stream_channel();
        assert!(sender.chunk("a"));
        sender.error("boom");
        sender.done();
        assert!(!sender.chunk("late"));

        assert_eq!(channel.recv().await, Some(StreamEvent::Chunk("a".to_string())));
        assert_eq!(channel.recv().await, Some(StreamEvent::Error("boom".to_string())));
        assert_eq!(channel.recv().await, None);
        assert!(channel.is_finished());
    }

    #[tokio::test]
    async fn dropped_sender_ends_the_stream() {
        let (mut sender, mut channel) = stream_channel();
        sender.chunk("x");
        drop(sender);
        assert_eq!(channel.recv().await, Some(StreamEvent::Chunk("x".to_string())));
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn closed_signal_fires_when_receiver_is_dropped() {
        let (sender, channel) = stream_channel();
        let signal = sender.closed_signal();
        assert!(!sender.is_closed());
        drop(channel);
        signal.await;
        assert!(sender.is_closed());
    }

    #[test]
    fn wire_messages_match_the_contract() {
        let json = |event: StreamEvent| serde_json::to_string(&WireMessage::from(event)).unwrap();
        assert_eq!(json(StreamEvent::Chunk("你好".into())), r#"{"chunk":"你好"}"#);
        assert_eq!(json(StreamEvent::Error("x".into())), r#"{"error":"x"}"#);
        assert_eq!(json(StreamEvent::Done), r#"{"done":true}"#);

        let parsed: WireMessage = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(parsed.into_event(), Some(StreamEvent::Done));
    }

    #[test]
    fn request_serializes_with_camel_case_config() {
        let request = TranslateRequest::new(
            "a\n%%\nb".to_string(),
            RequestConfig {
                api_url: "https://api.example.com/v1".into(),
                api_key: "k".into(),
                model_name: "m".into(),
                target_language: "zh-CN".into(),
                ..Default::default()
            },
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "translate");
        assert_eq!(value["config"]["apiUrl"], "https://api.example.com/v1");
        assert_eq!(value["config"]["modelName"], "m");
        assert!(value["config"].get("temperature").is_none());
    }
}
