//! The literal end-to-end scenarios from spec.md §8 (S1–S6).

use agentengine::providers::mock::{MockProvider, MockTurn};
use agentengine::{AssistantContentBlock, Engine, EngineError, Message, Tool, ToolUse, UserMessage};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;

async fn collect(engine: &Engine, model: &str, messages: Vec<Message>, tools: Vec<Tool>) -> Result<Vec<Message>, EngineError> {
    let mut stream = engine.stream(model, messages, tools, None).await?;
    let mut out = Vec::new();
    while let Some(event) = stream.next().await {
        out.push(event?);
    }
    Ok(out)
}

#[tokio::test]
async fn s1_simple_echo() {
    let engine = Engine::new();
    let provider = Arc::new(MockProvider::new(vec![MockTurn::text("hi")]));
    engine.add_provider("mock", Arc::new(move || Ok(provider.clone() as _)), false).await.unwrap();

    let events = collect(&engine, "mock/m", vec![Message::User(UserMessage::new("hello"))], vec![]).await.unwrap();

    assert_eq!(events.len(), 1);
    let assistant = events[0].as_assistant().expect("expected an assistant message");
    assert!(assistant.is_aggregate);
    assert!(matches!(&assistant.content[0], AssistantContentBlock::Text { text } if text == "hi"));
}

#[tokio::test]
async fn s2_single_tool_round_trip() {
    let engine = Engine::new();
    let mut params = serde_json::Map::new();
    params.insert("a".to_string(), json!(2));
    params.insert("b".to_string(), json!(3));
    let provider = Arc::new(MockProvider::new(vec![MockTurn::tool_use("t1", "add", params), MockTurn::text("5")]));
    engine.add_provider("mock", Arc::new(move || Ok(provider.clone() as _)), false).await.unwrap();

    let add_tool = Tool::from_fn("add", "adds two numbers", json!({}), |params| async move {
        let a = params.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
        let b = params.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(json!(a + b))
    });

    let events = collect(&engine, "mock/m", vec![Message::User(UserMessage::new("add 2+3"))], vec![add_tool]).await.unwrap();

    assert_eq!(events.len(), 3);
    let first_assistant = events[0].as_assistant().unwrap();
    assert!(matches!(&first_assistant.content[0], AssistantContentBlock::ToolUse(ToolUse { name, .. }) if name == "add"));

    match &events[1] {
        Message::Tool(tool_message) => {
            assert_eq!(tool_message.parent_id, first_assistant.id);
            assert_eq!(tool_message.content.len(), 1);
            assert_eq!(tool_message.content[0].tool_use_id, "t1");
            assert_eq!(tool_message.content[0].result, "5");
            assert!(!tool_message.content[0].is_error);
        }
        other => panic!("expected a ToolMessage, got {other:?}"),
    }

    let last_assistant = events[2].as_assistant().unwrap();
    assert!(matches!(&last_assistant.content[0], AssistantContentBlock::Text { text } if text == "5"));
}

#[tokio::test]
async fn s3_tool_error_isolation() {
    let engine = Engine::new();
    let turn = MockTurn {
        deltas: Vec::new(),
        content: vec![
            AssistantContentBlock::ToolUse(ToolUse {
                id: "ok-id".into(),
                name: "ok".into(),
                params: serde_json::Map::new(),
                metadata: Default::default(),
            }),
            AssistantContentBlock::ToolUse(ToolUse {
                id: "bad-id".into(),
                name: "bad".into(),
                params: serde_json::Map::new(),
                metadata: Default::default(),
            }),
        ],
    };
    let provider = Arc::new(MockProvider::new(vec![turn, MockTurn::text("done")]));
    engine.add_provider("mock", Arc::new(move || Ok(provider.clone() as _)), false).await.unwrap();

    let ok_tool = Tool::from_fn("ok", "", json!({}), |_| async move { Ok(json!("A")) });
    let bad_tool = Tool::from_fn("bad", "", json!({}), |_| async move { Err("boom".to_string()) });

    let events = collect(&engine, "mock/m", vec![Message::User(UserMessage::new("go"))], vec![ok_tool, bad_tool]).await.unwrap();

    let tool_message = events.iter().find_map(|m| match m {
        Message::Tool(t) => Some(t),
        _ => None,
    }).expect("expected a ToolMessage");

    assert_eq!(tool_message.content.len(), 2);
    let ok_result = tool_message.content.iter().find(|r| r.tool_use_id == "ok-id").unwrap();
    let bad_result = tool_message.content.iter().find(|r| r.tool_use_id == "bad-id").unwrap();
    assert!(!ok_result.is_error);
    assert_eq!(ok_result.result, "A");
    assert!(bad_result.is_error);
    assert!(bad_result.result.contains("boom"));
}

#[tokio::test]
async fn s4_missing_user_message_fails_validation_before_any_provider_call() {
    let engine = Engine::new();
    let provider = Arc::new(MockProvider::new(vec![MockTurn::text("unreachable")]));
    let provider_for_factory = provider.clone();
    engine.add_provider("mock", Arc::new(move || Ok(provider_for_factory.clone() as _)), false).await.unwrap();

    let err = match engine
        .stream("mock/m", vec![Message::System(agentengine::SystemMessage::new("x"))], vec![], None)
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected validation error"),
    };

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn s5_override_with_cache_eviction() {
    let engine = Engine::new();
    let f1 = Arc::new(MockProvider::new(vec![MockTurn::text("f1")]));
    let f1_for_factory = f1.clone();
    engine.add_provider("x", Arc::new(move || Ok(f1_for_factory.clone() as _)), false).await.unwrap();
    collect(&engine, "x/m", vec![Message::User(UserMessage::new("hi"))], vec![]).await.unwrap();

    let f2 = Arc::new(MockProvider::new(vec![MockTurn::text("f2")]));
    let f2_for_factory = f2.clone();
    engine.add_provider("x", Arc::new(move || Ok(f2_for_factory.clone() as _)), true).await.unwrap();
    collect(&engine, "x/m", vec![Message::User(UserMessage::new("hi again"))], vec![]).await.unwrap();

    assert_eq!(f1.call_count(), 1);
    assert_eq!(f2.call_count(), 1);
}

#[tokio::test]
async fn streamed_turn_yields_deltas_before_the_aggregate() {
    let engine = Engine::new();
    let deltas = vec![
        vec![AssistantContentBlock::Text { text: "Once ".into() }],
        vec![AssistantContentBlock::Text { text: "upon a time".into() }],
    ];
    let aggregate = vec![AssistantContentBlock::Text { text: "Once upon a time".into() }];
    let provider = Arc::new(MockProvider::new(vec![MockTurn::delta_then_aggregate(deltas, aggregate)]));
    engine.add_provider("mock", Arc::new(move || Ok(provider.clone() as _)), false).await.unwrap();

    let events = collect(&engine, "mock/m", vec![Message::User(UserMessage::new("tell me a story"))], vec![]).await.unwrap();

    // Two deltas (is_aggregate = false, never appended to history) followed
    // by the one aggregate that the loop does append.
    assert_eq!(events.len(), 3);
    for event in &events[..2] {
        let assistant = event.as_assistant().expect("expected an assistant message");
        assert!(!assistant.is_aggregate);
    }
    let last = events[2].as_assistant().unwrap();
    assert!(last.is_aggregate);
    assert!(matches!(&last.content[0], AssistantContentBlock::Text { text } if text == "Once upon a time"));
}

#[tokio::test]
async fn s6_max_iterations_cap() {
    let engine = Engine::new();
    let mut params = serde_json::Map::new();
    params.insert("noop".to_string(), json!(true));
    let provider = Arc::new(MockProvider::repeating(MockTurn::tool_use("t", "always", params)));
    engine.add_provider("mock", Arc::new(move || Ok(provider.clone() as _)), false).await.unwrap();

    let always_tool = Tool::from_fn("always", "", json!({}), |_| async move { Ok(json!("")) });

    let events = engine
        .send("mock/m", vec![Message::User(UserMessage::new("loop"))], vec![always_tool], Some(3))
        .await
        .unwrap();

    let assistant_count = events.iter().filter(|m| matches!(m, Message::Assistant(a) if a.is_aggregate)).count();
    let tool_message_count = events.iter().filter(|m| matches!(m, Message::Tool(_))).count();
    assert_eq!(assistant_count, 3);
    assert_eq!(tool_message_count, 3);
    assert_eq!(events.len(), 6);
}
