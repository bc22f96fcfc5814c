use std::sync::Arc;
use std::time::Duration;

use conduit_client::{BridgeClient, CallOptions, ChannelTransport, ClientError, ClientOptions};
use conduit_core::{BridgeError, DynamicValue, Event, ModuleContext, ScriptCallFormatter};
use conduit_host::{
    create_bridge, spawn_host, BridgeHost, ChannelSink, Dispatcher, EchoModule, EventEmitter,
    ModuleRegistry, ScriptSink,
};
use serde_json::json;
use tokio::sync::mpsc;

const NAMESPACE: &str = "window.TestBridge";

struct Harness {
    client: BridgeClient,
    emitter: EventEmitter,
}

/// Client → channel transport → host → script sink → client, plus an event
/// bridge feeding the same sink.
fn harness() -> Harness {
    let formatter = ScriptCallFormatter::new(NAMESPACE).unwrap();

    let registry = Arc::new(ModuleRegistry::new());
    registry.register(Arc::new(EchoModule::new()), true);

    let (sink, mut calls) = ChannelSink::new();
    let sink: Arc<dyn ScriptSink> = Arc::new(sink);
    let emitter = EventEmitter::new(64);
    create_bridge(&emitter, Arc::clone(&sink), formatter.clone());

    let host = BridgeHost::new(Dispatcher::new(registry), sink)
        .with_formatter(formatter.clone())
        .with_context(ModuleContext::new().with_extension(emitter.clone()));

    let (transport, inbound) = ChannelTransport::new(128);
    spawn_host(Arc::new(host), inbound);

    let client = BridgeClient::with_options(
        Arc::new(transport),
        ClientOptions {
            formatter,
            ..ClientOptions::default()
        },
    );

    let receiver = client.clone();
    tokio::spawn(async move {
        while let Some(call) = calls.recv().await {
            assert!(receiver.receive_script(&call), "unparseable call: {call}");
        }
    });

    Harness { client, emitter }
}

fn to_json(value: Option<DynamicValue>) -> serde_json::Value {
    value.map(serde_json::Value::from).unwrap_or_default()
}

#[tokio::test]
async fn echo_roundtrip() {
    let h = harness();
    let payload = DynamicValue::from(json!({"a": 1}));
    let out = h.client.call("echo", "echo", Some(payload)).await.unwrap();
    assert_eq!(to_json(out), json!({"a": 1}));
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test]
async fn awkward_strings_survive_the_script_boundary() {
    let h = harness();
    let text = "quote \" backslash \\ newline \n tab \t sep \u{2028}\u{2029} emoji 🚀 日本語";
    let out = h
        .client
        .call("echo", "echo", Some(DynamicValue::from(text)))
        .await
        .unwrap();
    assert_eq!(out.as_ref().and_then(DynamicValue::as_str), Some(text));
}

#[tokio::test]
async fn routing_failures_surface_as_server_errors() {
    let h = harness();

    let err = h.client.call("nope", "x", None).await.unwrap_err();
    assert!(matches!(&err, ClientError::Server { message, .. } if message == "Unknown module: nope"));
    assert_eq!(err.module(), "nope");

    let err = h.client.call("echo", "dance", None).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown action: dance");
    assert!(err.request_id().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_calls_correlate() {
    let h = harness();

    let calls: Vec<_> = (0..20i64)
        .map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move {
                match i % 3 {
                    0 => {
                        let out = client
                            .call("echo", "echo", Some(DynamicValue::from(i)))
                            .await?;
                        assert_eq!(out.and_then(|v| v.as_int()), Some(i));
                    }
                    1 => {
                        let payload = DynamicValue::from(json!({"ms": i, "value": i}));
                        let out = client.call("echo", "delay", Some(payload)).await?;
                        assert_eq!(out.and_then(|v| v.as_int()), Some(i));
                    }
                    _ => {
                        let out = client.call("echo", "info", None).await?;
                        assert_eq!(to_json(out)["module"], "echo");
                    }
                }
                Ok::<_, ClientError>(())
            })
        })
        .collect();

    let failures: Vec<_> = (0..10)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.call("echo", "error", None).await })
        })
        .collect();

    for call in calls {
        call.await.unwrap().unwrap();
    }
    for failure in failures {
        let err = failure.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Echo error");
    }
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test]
async fn slow_handler_times_out_and_late_response_is_dropped() {
    let h = harness();
    let payload = DynamicValue::from(json!({"ms": 150}));

    let err = h
        .client
        .call_with(
            "echo",
            "delay",
            Some(payload),
            CallOptions::with_timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    match err {
        ClientError::Timeout { elapsed, .. } => assert!(elapsed >= Duration::from_millis(20)),
        ref other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(BridgeError::from(&err).error_kind(), "timeout");
    assert_eq!(h.client.pending_count(), 0);

    // Let the host finish and deliver the late response; the client ignores it.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(h.client.pending_count(), 0);

    let out = h.client.call("echo", "echo", None).await.unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn module_emitted_events_reach_listeners() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.on("battery.low", move |event: &Event| {
        let _ = tx.send(event.data.clone());
    });

    let payload = DynamicValue::from(json!({"type": "battery.low", "data": {"level": 0.1}}));
    let out = h.client.call("echo", "emit", Some(payload)).await.unwrap();
    assert_eq!(to_json(out), json!({"delivered": 1}));

    let data = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(to_json(data), json!({"level": 0.1}));
}

#[tokio::test]
async fn native_events_reach_once_listener_once() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.once("app.resumed", move |event: &Event| {
        let _ = tx.send(event.event_type.clone());
    });

    h.emitter.emit("app.resumed", None);
    h.emitter.emit("app.resumed", None);

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(first.as_deref(), Some("app.resumed"));

    // Round-trip a call so both events have been processed.
    h.client.call("echo", "echo", None).await.unwrap();
    assert!(rx.try_recv().is_err());
    assert_eq!(h.client.listener_count("app.resumed"), 0);
}

#[tokio::test]
async fn missing_host_rejects_without_sending() {
    let (transport, inbound) = ChannelTransport::new(4);
    drop(inbound);
    let client = BridgeClient::new(Arc::new(transport));

    let err = client.call("echo", "echo", None).await.unwrap_err();
    assert_eq!(err.error_kind(), "transport_unavailable");
    assert_eq!(BridgeError::from(&err), BridgeError::TransportUnavailable);
    assert_eq!(client.pending_count(), 0);
}
