//! 基于 reqwest 的流式传输
//!
//! 每个请求在独立的 tokio 任务中执行：检查凭据、组装提示词、POST 到
//! chat-completions 端点并逐行解析 SSE。消费端丢弃通道时中止请求；
//! 超时后中止请求并发送超时错误。

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;

use super::sse::{SseDecoder, SseEvent};
use super::{stream_channel, StreamChannel, StreamSender, StreamTransport, TranslateRequest, TRANSLATE_ACTION};
use crate::translation::config::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::translation::config::manager::resolve_endpoint;
use crate::translation::config::prompt::{build_system_prompt, wrap_user_input};
use crate::translation::config::TranslationConfig;
use crate::translation::error::{helpers, ErrorSeverity, TranslationError, TranslationResult};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// chat-completions 请求体
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// HTTP 流式传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> TranslationResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TranslationError::NetworkError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        Self::new(config.request_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            client: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl StreamTransport for HttpTransport {
    fn open(&self, request: TranslateRequest) -> TranslationResult<StreamChannel> {
        if request.action != TRANSLATE_ACTION {
            return Err(TranslationError::InvalidInput(format!(
                "未知的请求动作: {}",
                request.action
            )));
        }

        let (sender, channel) = stream_channel();
        let client = self.client.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            stream_translation(client, request, timeout, sender).await;
        });

        Ok(channel)
    }
}

/// 执行一次流式翻译请求，结果写入 `sender`
pub async fn stream_translation(
    client: Client,
    request: TranslateRequest,
    timeout: Duration,
    mut sender: StreamSender,
) {
    let config = &request.config;

    if config.api_key.trim().is_empty() {
        sender.error(TranslationError::MissingApiKey.to_string());
        return;
    }

    let system_prompt = build_system_prompt(&config.user_translation_prompt, &config.target_language);
    let user_content = wrap_user_input(&request.text);
    let body = ChatCompletionRequest {
        model: &config.model_name,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &system_prompt,
            },
            ChatMessage {
                role: "user",
                content: &user_content,
            },
        ],
        stream: true,
        temperature: config.temperature.filter(|t| t.is_finite()),
    };
    let endpoint = resolve_endpoint(&config.api_url);

    tracing::debug!("POST {} ({} 字符)", endpoint, request.text.chars().count());

    let disconnected = sender.closed_signal();
    let outcome = tokio::select! {
        _ = disconnected => {
            tracing::info!("消费端已断开，中止请求");
            return;
        }
        result = tokio::time::timeout(
            timeout,
            send_and_stream(&client, &endpoint, &config.api_key, &body, &mut sender),
        ) => result,
    };

    match outcome {
        Ok(Ok(())) => sender.done(),
        Ok(Err(TranslationError::Aborted)) => {
            tracing::info!("请求已中止");
        }
        Ok(Err(e)) => {
            log_request_error(&e);
            sender.error(e.user_message());
        }
        Err(_) => {
            tracing::warn!("请求超时 ({:?})，已中止", timeout);
            sender.error(helpers::TIMEOUT_MESSAGE);
        }
    }
}

async fn send_and_stream(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    body: &ChatCompletionRequest<'_>,
    sender: &mut StreamSender,
) -> TranslationResult<()> {
    let response = client
        .post(endpoint)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TranslationError::HttpStatus {
            status: status.as_u16(),
            message,
        });
    }

    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(item) = stream.next().await {
        let bytes = item?;
        for event in decoder.feed(&bytes) {
            if forward(event, sender)? {
                return Ok(());
            }
        }
    }

    for event in decoder.finish() {
        if forward(event, sender)? {
            return Ok(());
        }
    }

    Ok(())
}

fn log_request_error(error: &TranslationError) {
    let category = error.category();
    if error.is_recoverable() {
        tracing::info!(?category, "请求失败，可恢复: {}", error);
        return;
    }
    match error.severity() {
        ErrorSeverity::Critical | ErrorSeverity::Error => {
            tracing::error!(?category, "请求失败: {}", error)
        }
        ErrorSeverity::Warning | ErrorSeverity::Info => {
            tracing::warn!(?category, "请求失败: {}", error)
        }
    }
}

/// 转发单个事件；返回 `true` 表示流已结束
fn forward(event: SseEvent, sender: &mut StreamSender) -> TranslationResult<bool> {
    match event {
        SseEvent::Content(content) => {
            if sender.chunk(content) {
                Ok(false)
            } else {
                Err(TranslationError::Aborted)
            }
        }
        SseEvent::Done => Ok(true),
    }
}
