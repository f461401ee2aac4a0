// 集成测试公共模块
//
// 提供 HTML 夹具、可编排的传输实现和常用断言

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use markup5ever_rcdom::{Handle, RcDom};

use inline_translate::parsers::html::{find_element_by_id, html_to_dom};
use inline_translate::translation::config::TranslationConfig;
use inline_translate::translation::error::{TranslationError, TranslationResult};
use inline_translate::translation::pipeline::RenderTarget;
use inline_translate::translation::transport::{
    stream_channel, StreamChannel, StreamEvent, StreamSender, StreamTransport, TranslateRequest,
};

/// HTML 测试夹具
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn create_test_dom(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8")
    }

    /// `count` 个带 id `p0..pN` 的英文段落
    pub fn paragraphs(count: usize) -> String {
        let body: String = (0..count)
            .map(|i| format!("<p id=\"p{}\">English paragraph number {}</p>", i, i))
            .collect();
        format!("<html><head><title>t</title></head><body>{}</body></html>", body)
    }

    pub fn create_rich_page() -> String {
        concat!(
            "<html><body>",
            "<p id=\"rich\">Read <a href=\"/docs\" onclick=\"steal()\">the <em>manual</em></a> ",
            "before installing<sup class=\"reference\"><a href=\"#cite-1\">[1]</a></sup>.</p>",
            "<p id=\"plain\">Plain paragraph without inline markup</p>",
            "</body></html>"
        )
        .to_string()
    }

    pub fn element(dom: &RcDom, id: &str) -> Handle {
        find_element_by_id(&dom.document, id).unwrap_or_else(|| panic!("missing element #{}", id))
    }

    pub fn target(dom: &RcDom, id: &str) -> RenderTarget {
        RenderTarget::find(&Self::element(dom, id))
            .unwrap_or_else(|| panic!("element #{} has no render target", id))
    }

    pub fn target_text(dom: &RcDom, id: &str) -> String {
        Self::target(dom, id).text()
    }
}

/// 测试配置：关闭同语言跳过，保证英文与中文夹具都会被收集
pub fn test_config() -> TranslationConfig {
    TranslationConfig {
        api_key: "test-key".to_string(),
        skip_same_language: false,
        ..Default::default()
    }
}

/// 拼接普通段落的模型输出
pub fn joined(paragraphs: &[&str]) -> String {
    paragraphs.join("\n%%\n")
}

/// 按顺序回放预设事件的传输
///
/// 每次 `open` 消耗一个脚本；脚本用完后返回只包含 `Done` 的流。
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: RefCell<VecDeque<Vec<StreamEvent>>>,
    requests: RefCell<Vec<TranslateRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, events: Vec<StreamEvent>) -> Self {
        self.scripts.borrow_mut().push_back(events);
        self
    }

    /// 单个文本块后完成
    pub fn with_reply(self, text: &str) -> Self {
        self.with_script(vec![StreamEvent::Chunk(text.to_string()), StreamEvent::Done])
    }

    pub fn requests(&self) -> Vec<TranslateRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl StreamTransport for ScriptedTransport {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        self.requests.borrow_mut().push(request);
        let events = self
            .scripts
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| vec![StreamEvent::Done]);

        let (mut sender, channel) = stream_channel();
        for event in events {
            match event {
                StreamEvent::Chunk(text) => {
                    sender.chunk(text);
                }
                StreamEvent::Error(message) => sender.error(message),
                StreamEvent::Done => sender.done(),
            }
        }
        Ok(channel)
    }
}

/// 由测试手动驱动的传输：`open` 只建立通道，发送端交给测试
#[derive(Default)]
pub struct ManualTransport {
    senders: RefCell<VecDeque<StreamSender>>,
    requests: RefCell<Vec<TranslateRequest>>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待编排器打开下一个流
    pub async fn next_sender(&self) -> StreamSender {
        loop {
            if let Some(sender) = self.senders.borrow_mut().pop_front() {
                return sender;
            }
            tokio::task::yield_now().await;
        }
    }

    pub fn requests(&self) -> Vec<TranslateRequest> {
        self.requests.borrow().clone()
    }
}

impl StreamTransport for ManualTransport {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        self.requests.borrow_mut().push(request);
        let (sender, channel) = stream_channel();
        self.senders.borrow_mut().push_back(sender);
        Ok(channel)
    }
}

/// 打开通道即失败的传输；失败次数用完后转为回放成功输出
pub struct FailingTransport {
    failures: RefCell<usize>,
    fallback: ScriptedTransport,
}

impl FailingTransport {
    pub fn new(failures: usize, fallback: ScriptedTransport) -> Self {
        Self {
            failures: RefCell::new(failures),
            fallback,
        }
    }

    pub fn fallback(&self) -> &ScriptedTransport {
        &self.fallback
    }
}

impl StreamTransport for FailingTransport {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        let mut failures = self.failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(TranslationError::NetworkError("connection refused".to_string()));
        }
        drop(failures);
        self.fallback.open(request)
    }
}

/// 让出若干次，使同一任务中并发的编排器处理已到达的事件
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
