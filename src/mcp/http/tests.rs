use super::*;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_response(id: i64, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result})
}

#[tokio::test]
async fn test_json_response_round_trip() {
    let server = MockServer::start().await;
    // Echo the request id back: wiremock can't template, so capture via
    // a dynamic responder.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Mcp-Protocol-Version", "2024-11-05"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let id = body["id"].as_i64().unwrap();
            ResponseTemplate::new(200).set_body_json(rpc_response(id, serde_json::json!({"ok": 1})))
        })
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());
    let result = transport
        .call("tools/list", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result["ok"], 1);
}

#[tokio::test]
async fn test_session_id_learned_and_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let id = body["id"].as_i64().unwrap();
            ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", "S")
                .set_body_json(rpc_response(id, serde_json::json!({})))
        })
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());

    // First call: no session header yet.
    transport
        .call("initialize", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(transport.session_id().as_deref(), Some("S"));

    // Second call must carry the session header.
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Mcp-Session-Id", "S"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let id = body["id"].as_i64().unwrap();
            ResponseTemplate::new(200).set_body_json(rpc_response(id, serde_json::json!({})))
        })
        .expect(1)
        .mount(&server)
        .await;
    transport
        .call("tools/list", None, Duration::from_secs(5))
        .await
        .unwrap();

    // Close sends DELETE /mcp with the session header.
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("Mcp-Session-Id", "S"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    transport.close().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_sse_response_parsed_and_event_id_captured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let id = body["id"].as_i64().unwrap();
            let sse = format!(
                ": comment\nid: 42\ndata: {}\n\n",
                rpc_response(id, serde_json::json!({"via": "sse"}))
            );
            ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream")
        })
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());
    let result = transport
        .call("tools/call", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result["via"], "sse");
    assert_eq!(transport.last_event_id().as_deref(), Some("42"));

    // The notification stream replays the cursor.
    Mock::given(method("GET"))
        .and(path("/mcp"))
        .and(header("Last-Event-ID", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/ping\"}\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, rx) = std::sync::mpsc::channel();
    transport
        .start_event_stream(move |method, _params| {
            let _ = tx.send(method);
        })
        .await
        .unwrap();
    let method = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(method, "notifications/ping");
    server.verify().await;
}

#[tokio::test]
async fn test_notification_requires_202_or_200() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());
    transport
        .notify("notifications/initialized", None)
        .await
        .unwrap();

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let err = transport
        .notify("notifications/initialized", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unexpected status"));
}

#[tokio::test]
async fn test_rpc_error_in_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let id = body["id"].as_i64().unwrap();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32000, "message": "server exploded"}
            }))
        })
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());
    let err = transport
        .call("tools/call", None, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("server exploded"));
}

#[tokio::test]
async fn test_mismatched_response_id_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rpc_response(999_999, serde_json::json!({}))),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&server.uri());
    let err = transport
        .call("tools/list", None, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unexpected response id"));
}

#[tokio::test]
async fn test_close_without_session_skips_delete() {
    let server = MockServer::start().await;
    // No DELETE mock mounted: a DELETE request would 404 but close() is
    // best-effort and must not be attempted without a session id.
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let transport = Arc::new(HttpTransport::new(&server.uri()));
    transport.close().await.unwrap();
    transport.close().await.unwrap();
    server.verify().await;
}

#[test]
fn test_take_line_handles_partial_chunks() {
    let mut buf = b"id: 1\npartial".to_vec();
    assert_eq!(take_line(&mut buf).as_deref(), Some("id: 1"));
    assert_eq!(take_line(&mut buf), None);
    buf.extend_from_slice(b" line\n");
    assert_eq!(take_line(&mut buf).as_deref(), Some("partial line"));
}
