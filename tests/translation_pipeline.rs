//! 翻译管道集成测试
//!
//! 通过可编排的传输驱动完整流程：扫描 → 批次 → 流解析 → 译文节点

use std::rc::Rc;

use inline_translate::parsers::html::{detach, inner_html, text_content};
use inline_translate::translation::error::helpers::TIMEOUT_MESSAGE;
use inline_translate::translation::pipeline::{FixedBatchSize, RenderTarget};
use inline_translate::translation::transport::StreamEvent;
use inline_translate::translation::{TranslationOutcome, TranslationService};

mod common;

use common::{
    joined, settle, test_config, FailingTransport, HtmlTestHelper, ManualTransport,
    ScriptedTransport,
};

/// 单个文本块携带整批输出时，各段落只拿到自己的译文
#[tokio::test]
async fn single_chunk_batch_routes_each_paragraph() {
    let transport = Rc::new(ScriptedTransport::new().with_reply(&joined(&["第零段", "第一段", "第二段"])));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(3));

    let summary = service.translate_document(&dom, None).await.unwrap();

    assert_eq!(summary.outcome, TranslationOutcome::Completed);
    assert_eq!(summary.collected, 3);
    assert_eq!(summary.batches.batches, 1);
    assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "第零段");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p1"), "第一段");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p2"), "第二段");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action, "translate");
    assert_eq!(
        requests[0].text,
        joined(&[
            "English paragraph number 0",
            "English paragraph number 1",
            "English paragraph number 2"
        ])
    );
    assert_eq!(requests[0].config.api_key, "test-key");
}

/// 混合容器的直接文本与列表项各翻译一次，译文不会在容器末尾重复出现
#[tokio::test]
async fn mixed_container_is_translated_once() {
    let transport = Rc::new(ScriptedTransport::new().with_reply(&joined(&["引言文字", "第一个列表项"])));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(concat!(
        "<html><body><div id=\"mixed\">Introduction text that should be translated",
        "<ul><li id=\"item\">First list item with enough text</li></ul></div></body></html>",
    ));

    let summary = service.translate_document(&dom, None).await.unwrap();

    assert_eq!(summary.collected, 2);
    assert_eq!(
        transport.requests()[0].text,
        joined(&["Introduction text that should be translated", "First list item with enough text"])
    );
    assert_eq!(HtmlTestHelper::target_text(&dom, "item"), "第一个列表项");

    let mixed = HtmlTestHelper::element(&dom, "mixed");
    assert!(RenderTarget::find(&mixed).is_none());
    let rendered = text_content(&mixed);
    assert_eq!(rendered.matches("第一个列表项").count(), 1);
    assert_eq!(rendered.matches("引言文字").count(), 1);
}

/// 跨块的分隔符在任何中间状态都不会露出 `%`
#[tokio::test]
async fn split_separator_never_shows_percent() {
    let transport = Rc::new(ManualTransport::new());
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(2));

    let driver = async {
        let mut sender = transport.next_sender().await;

        sender.chunk("First%");
        settle().await;
        assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "First");
        assert!(HtmlTestHelper::target(&dom, "p1").is_loading());

        sender.chunk("%Second");
        settle().await;
        for id in ["p0", "p1"] {
            assert!(!HtmlTestHelper::target_text(&dom, id).contains('%'));
        }

        sender.done();
    };

    let (summary, ()) = tokio::join!(service.translate_document(&dom, None), driver);
    summary.unwrap();

    assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "First");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p1"), "Second");
}

/// `"A%%"`、`"B%%"`、`"C"` 三个块对应三个段落，最后一段在流结束时定稿
#[tokio::test]
async fn three_chunk_stream_routes_each_paragraph() {
    let transport = Rc::new(ManualTransport::new());
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(3));

    let driver = async {
        let mut sender = transport.next_sender().await;

        sender.chunk("A%%");
        settle().await;
        assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "A");

        sender.chunk("B%%");
        settle().await;
        assert_eq!(HtmlTestHelper::target_text(&dom, "p1"), "B");
        assert!(HtmlTestHelper::target(&dom, "p2").is_loading());

        sender.chunk("C");
        settle().await;
        sender.done();
    };

    let (summary, ()) = tokio::join!(service.translate_document(&dom, None), driver);
    summary.unwrap();

    assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "A");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p1"), "B");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p2"), "C");
    for id in ["p0", "p1", "p2"] {
        let target = HtmlTestHelper::target(&dom, id);
        assert!(!target.is_loading());
        assert!(!target.is_errored());
    }
}

/// 富文本段落以令牌文本发送，校验通过后用原元素克隆重建
#[tokio::test]
async fn rich_paragraph_round_trip() {
    let reply = joined(&[
        "安装前请阅读[[ITC:a0]][[ITC:em0]]手册[[/ITC]][[/ITC]][[ITC:ref0]]。",
        "没有内联标记的普通段落",
    ]);
    let transport = Rc::new(ScriptedTransport::new().with_reply(&reply));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::create_rich_page());

    let summary = service.translate_document(&dom, None).await.unwrap();
    assert_eq!(summary.batches.rich_rendered, 1);
    assert_eq!(summary.batches.rich_fallbacks, 0);

    let request = &transport.requests()[0];
    assert!(request.text.starts_with("[[ITC_RICH_V2]]\n"));
    assert!(request.text.contains("[[ITC:a0]]the [[ITC:em0]]manual[[/ITC]][[/ITC]]"));
    assert!(request.text.contains("[[ITC:ref0]]"));
    assert!(request.text.ends_with("\n%%\nPlain paragraph without inline markup"));

    let rich = inner_html(HtmlTestHelper::target(&dom, "rich").node());
    assert!(rich.starts_with("安装前请阅读<a href=\"/docs\"><em>手册</em></a>"));
    assert!(rich.contains("<sup class=\"reference\"><a href=\"#cite-1\">[1]</a></sup>"));
    assert!(!rich.contains("onclick"));
    assert!(!rich.contains("[["));

    assert_eq!(HtmlTestHelper::target_text(&dom, "plain"), "没有内联标记的普通段落");
}

/// 令牌不合法时退回纯文本，绝不显示令牌语法
#[tokio::test]
async fn invalid_rich_output_falls_back_to_plain_text() {
    let reply = joined(&["安装前请阅读[[ITC:a0]]手册。", "普通段落"]);
    let transport = Rc::new(ScriptedTransport::new().with_reply(&reply));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::create_rich_page());

    let summary = service.translate_document(&dom, None).await.unwrap();
    assert_eq!(summary.batches.rich_fallbacks, 1);

    let target = HtmlTestHelper::target(&dom, "rich");
    assert_eq!(target.text(), "安装前请阅读手册。");
    assert!(!target.is_errored());
    assert_eq!(summary.batches.errored, 0);
    assert_eq!(HtmlTestHelper::target_text(&dom, "plain"), "普通段落");
}

/// 截断的富文本输出显示不完整错误，并计入错误段落
#[tokio::test]
async fn truncated_rich_output_counts_as_errored() {
    let reply = joined(&["安装前请阅读[[ITC:a0]]手[[/IT", "普通段落"]);
    let transport = Rc::new(ScriptedTransport::new().with_reply(&reply));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::create_rich_page());

    let summary = service.translate_document(&dom, None).await.unwrap();
    assert_eq!(summary.batches.rich_fallbacks, 1);
    assert_eq!(summary.batches.errored, 1);

    let target = HtmlTestHelper::target(&dom, "rich");
    assert_eq!(target.text(), "[Error: Incomplete translation]");
    assert!(target.is_errored());
    assert_eq!(HtmlTestHelper::target_text(&dom, "plain"), "普通段落");
}

/// 没有内容时遇到不可恢复的错误：只显示一次错误文本
#[tokio::test]
async fn error_without_content_is_shown_once() {
    let message = "Server error. Please try again later.";
    let transport = Rc::new(ScriptedTransport::new().with_script(vec![
        StreamEvent::Error(message.to_string()),
        StreamEvent::Done,
    ]));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(2));

    let summary = service.translate_document(&dom, None).await.unwrap();
    assert_eq!(summary.batches.failed_batches, 1);
    assert_eq!(summary.batches.errored, 2);

    for id in ["p0", "p1"] {
        let target = HtmlTestHelper::target(&dom, id);
        assert_eq!(target.text(), format!("[Error: {}]", message));
        assert!(target.is_errored());
        assert!(!target.is_loading());
    }
}

/// 错误前已缓冲的内容会被输出，且该段落不标记为错误
#[tokio::test]
async fn buffered_content_survives_error() {
    let transport = Rc::new(ScriptedTransport::new().with_script(vec![
        StreamEvent::Chunk("Partial translation\n".to_string()),
        StreamEvent::Error("Server error. Please try again later.".to_string()),
    ]));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(2));

    service.translate_document(&dom, None).await.unwrap();

    let first = HtmlTestHelper::target(&dom, "p0");
    assert_eq!(first.text(), "Partial translation");
    assert!(!first.is_errored());
    assert!(!first.is_loading());

    assert!(HtmlTestHelper::target(&dom, "p1").is_errored());
}

/// 超时等瞬时错误静默移除加载提示
#[tokio::test]
async fn recoverable_error_is_silent() {
    let transport = Rc::new(
        ScriptedTransport::new().with_script(vec![StreamEvent::Error(TIMEOUT_MESSAGE.to_string())]),
    );
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));

    service.translate_document(&dom, None).await.unwrap();

    let target = HtmlTestHelper::target(&dom, "p0");
    assert_eq!(target.text(), "");
    assert!(!target.is_loading());
    assert!(!target.is_errored());
}

/// 一批打开失败只影响该批段落，下一批照常执行
#[tokio::test]
async fn failed_batch_does_not_stop_the_queue() {
    let transport = Rc::new(FailingTransport::new(
        1,
        ScriptedTransport::new().with_reply("第二段"),
    ));
    let service = TranslationService::new(Rc::clone(&transport), test_config())
        .unwrap()
        .map_orchestrator(|o| o.with_policy(FixedBatchSize(1)));
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(2));

    let summary = service.translate_document(&dom, None).await.unwrap();
    assert_eq!(summary.batches.batches, 2);
    assert_eq!(summary.batches.failed_batches, 1);

    assert_eq!(
        HtmlTestHelper::target_text(&dom, "p0"),
        "[Error: Network connection failed. Please check your internet connection.]"
    );
    assert_eq!(HtmlTestHelper::target_text(&dom, "p1"), "第二段");
    assert!(!service.is_busy());
}

#[tokio::test]
async fn batches_follow_the_size_policy() {
    let transport = Rc::new(
        ScriptedTransport::new()
            .with_reply(&joined(&["零", "一"]))
            .with_reply("二"),
    );
    let service = TranslationService::new(Rc::clone(&transport), test_config())
        .unwrap()
        .map_orchestrator(|o| o.with_policy(FixedBatchSize(2)));
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(3));

    service.translate_document(&dom, None).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].text,
        joined(&["English paragraph number 0", "English paragraph number 1"])
    );
    assert_eq!(requests[1].text, "English paragraph number 2");
    assert_eq!(HtmlTestHelper::target_text(&dom, "p2"), "二");
}

/// 第二次翻译相同文本直接命中缓存
#[tokio::test]
async fn repeated_text_is_served_from_cache() {
    let transport = Rc::new(ScriptedTransport::new().with_reply("缓存的译文"));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();

    let first = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));
    service.translate_document(&first, None).await.unwrap();

    let second = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));
    let summary = service.translate_document(&second, None).await.unwrap();

    assert_eq!(transport.request_count(), 1);
    assert_eq!(summary.batches.cache_hits, 1);
    assert_eq!(summary.batches.batches, 0);
    let target = HtmlTestHelper::target(&second, "p0");
    assert_eq!(target.text(), "缓存的译文");
    assert!(!target.is_loading());

    let stats = service.cache_stats().unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.sets, 1);
}

/// 失败的批次不写缓存
#[tokio::test]
async fn failed_batches_are_not_cached() {
    let transport = Rc::new(
        ScriptedTransport::new()
            .with_script(vec![StreamEvent::Error("Server error. Please try again later.".to_string())])
            .with_reply("重试成功"),
    );
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();

    let first = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));
    service.translate_document(&first, None).await.unwrap();
    let second = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));
    service.translate_document(&second, None).await.unwrap();

    assert_eq!(transport.request_count(), 2);
    assert_eq!(HtmlTestHelper::target_text(&second, "p0"), "重试成功");
}

/// 已翻译的元素不会再次入队
#[tokio::test]
async fn second_scan_skips_translated_elements() {
    let transport = Rc::new(ScriptedTransport::new().with_reply("一次"));
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));

    service.translate_document(&dom, None).await.unwrap();
    let summary = service.translate_document(&dom, None).await.unwrap();

    assert_eq!(summary.collected, 0);
    assert_eq!(transport.request_count(), 1);
}

/// 翻译进行中时新的调用被拒绝
#[tokio::test]
async fn busy_service_rejects_new_documents() {
    let transport = Rc::new(ManualTransport::new());
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let first = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));
    let second = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));

    let driver = async {
        let mut sender = transport.next_sender().await;
        assert!(service.is_busy());
        let rejected = service.translate_document(&second, None).await.unwrap();
        assert_eq!(rejected.outcome, TranslationOutcome::Busy);
        sender.chunk("完成");
        sender.done();
    };

    let (summary, ()) = tokio::join!(service.translate_document(&first, None), driver);
    assert_eq!(summary.unwrap().outcome, TranslationOutcome::Completed);
    assert!(!service.is_busy());
    assert_eq!(service.get_stats().snapshot().rejected_busy, 1);
    assert_eq!(HtmlTestHelper::target_text(&first, "p0"), "完成");
}

/// 源元素在流式过程中被页面移除时不再写入
#[tokio::test]
async fn detached_source_is_left_alone() {
    let transport = Rc::new(ManualTransport::new());
    let service = TranslationService::new(Rc::clone(&transport), test_config()).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(2));
    let removed = HtmlTestHelper::element(&dom, "p1");

    let driver = async {
        let mut sender = transport.next_sender().await;
        detach(&removed);
        sender.chunk(joined(&["保留", "丢弃"]));
        sender.done();
    };

    let (summary, ()) = tokio::join!(service.translate_document(&dom, None), driver);
    summary.unwrap();

    assert_eq!(HtmlTestHelper::target_text(&dom, "p0"), "保留");
    let orphan = inline_translate::translation::RenderTarget::find(&removed).unwrap();
    assert!(!orphan.text().contains("丢弃"));
}

#[tokio::test]
async fn excluded_domain_is_not_scanned() {
    let mut config = test_config();
    config.excluded_domains = vec!["example.org".to_string()];
    let transport = Rc::new(ScriptedTransport::new());
    let service = TranslationService::new(Rc::clone(&transport), config).unwrap();
    let dom = HtmlTestHelper::create_test_dom(&HtmlTestHelper::paragraphs(1));

    let summary = service
        .translate_document(&dom, Some("https://blog.example.org/post"))
        .await
        .unwrap();

    assert_eq!(summary.outcome, TranslationOutcome::ExcludedDomain);
    assert_eq!(transport.request_count(), 0);
    assert!(inline_translate::translation::RenderTarget::find(&HtmlTestHelper::element(&dom, "p0")).is_none());
}
