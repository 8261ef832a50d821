use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tower::ServiceExt;

use toolswarm::{
    engine::{EngineBuilder, EngineSettings},
    scenario::Scenario,
    web::{router, serve_on, spawn_engine, EngineHandle},
    PopulationConfig,
};

fn spawn() -> (EngineHandle, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let engine = EngineBuilder::standard(EngineSettings {
        config: PopulationConfig::default(),
        seed: 7,
    })
    .build()
    .expect("default config is valid");
    spawn_engine(engine, "web-test", Duration::from_millis(20))
}

async fn call(handle: &EngineHandle, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds");
    let response = router(handle.clone())
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn state_reports_full_population() {
    let (handle, _task) = spawn();
    let (status, body) = call(&handle, "GET", "/api/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scenario"], "web-test");
    assert_eq!(body["frame"]["score"], 0);
    assert_eq!(body["frame"]["active"], 30);
    assert_eq!(body["frame"]["tools"].as_array().map(Vec::len), Some(30));
}

#[tokio::test]
async fn collect_scores_known_and_unknown_ids() {
    let (handle, _task) = spawn();

    let (status, body) = call(&handle, "POST", "/api/tools/1/collect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["score"], 1);
    assert_eq!(body["found"], true);

    let (status, body) = call(&handle, "POST", "/api/tools/424242/collect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 2);
    assert_eq!(body["found"], false);

    let (_, state) = call(&handle, "GET", "/api/state").await;
    assert_eq!(state["frame"]["score"], 2);
    assert_eq!(state["frame"]["active"], 30);
}

#[tokio::test]
async fn reset_zeroes_score() {
    let (handle, _task) = spawn();
    for _ in 0..3 {
        handle
            .collect(toolswarm::ToolId::new(999))
            .await
            .expect("collect succeeds");
    }

    let (status, body) = call(&handle, "POST", "/api/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 0);
    assert_eq!(body["active"], 30);
    assert_eq!(body["overlay"]["visible"], false);
}

#[tokio::test]
async fn engine_task_exits_when_handles_drop() {
    let (handle, task) = spawn();
    let frame = handle.frame().await.expect("engine answers");
    assert_eq!(frame.active, 30);

    drop(handle);
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("engine task stops")
        .expect("engine task did not panic");
    assert!(result.is_ok());
}

#[tokio::test]
async fn subscribers_receive_frames() {
    let (handle, _task) = spawn();
    let mut frames = handle.subscribe();
    let payload = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("a frame is published")
        .expect("channel open");
    let frame: Value = serde_json::from_str(&payload).expect("frame is json");
    assert_eq!(frame["active"], 30);
}

#[tokio::test]
async fn shutdown_stops_engine_while_handles_live() {
    let (handle, task) = spawn();
    let _router = router(handle.clone());
    handle.shutdown();
    assert!(handle.is_shut_down());

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("engine task stops")
        .expect("engine task did not panic");
    assert!(result.is_ok());
    assert!(handle.frame().await.is_err());
}

#[tokio::test]
async fn server_shuts_down_with_event_stream_open() {
    let scenario = Scenario::from_yaml("name: web-shutdown\nseed: 3\n").expect("scenario parses");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_on(
        listener,
        scenario,
        Duration::from_millis(20),
        async move {
            let _ = stopped.await;
        },
    ));

    let mut client = TcpStream::connect(addr).await.expect("connect");
    client
        .write_all(b"GET /api/events HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n")
        .await
        .expect("request sent");
    let mut head = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut head))
        .await
        .expect("response arrives")
        .expect("socket readable");
    assert!(String::from_utf8_lossy(&head[..read]).starts_with("HTTP/1.1 200 OK"));

    stop.send(()).expect("server still waiting for the signal");
    let served = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server finishes with a client on the event stream")
        .expect("server task did not panic");
    assert!(served.is_ok(), "engine task ended cleanly: {served:?}");
}
