use super::*;
use crate::config::McpServerConfig;

fn server_config(script: &str) -> McpServerConfig {
    McpServerConfig {
        command: Some("sh".to_string()),
        args: vec!["-c".to_string(), script.to_string()],
        env: std::collections::BTreeMap::new(),
        url: None,
    }
}

/// Shell one-liner that echoes each request back as a response carrying
/// the request's id and method.
const ECHO_SERVER: &str = r#"
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"method":"%s"}}\n' "$id" "$method"
  fi
done
"#;

/// Reads two requests, then answers them in REVERSE order.
const OUT_OF_ORDER_SERVER: &str = r#"
read -r l1
read -r l2
id1=$(printf '%s' "$l1" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
m1=$(printf '%s' "$l1" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
id2=$(printf '%s' "$l2" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
m2=$(printf '%s' "$l2" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
printf '{"jsonrpc":"2.0","method":"notifications/noise"}\n'
printf '{"jsonrpc":"2.0","id":%s,"result":{"method":"%s"}}\n' "$id2" "$m2"
printf '{"jsonrpc":"2.0","id":%s,"result":{"method":"%s"}}\n' "$id1" "$m1"
cat >/dev/null
"#;

#[tokio::test]
async fn test_call_round_trip() {
    let transport = StdioTransport::spawn(&server_config(ECHO_SERVER)).unwrap();
    let result = transport
        .call("ping", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result["method"], "ping");
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_out_of_order_responses_demuxed_by_id() {
    let transport = Arc::new(StdioTransport::spawn(&server_config(OUT_OF_ORDER_SERVER)).unwrap());

    let t1 = transport.clone();
    let t2 = transport.clone();
    let first = tokio::spawn(async move { t1.call("first", None, Duration::from_secs(5)).await });
    // Give the first request a head start so request order is deterministic.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = tokio::spawn(async move { t2.call("second", None, Duration::from_secs(5)).await });

    let r1 = first.await.unwrap().unwrap();
    let r2 = second.await.unwrap().unwrap();
    assert_eq!(r1["method"], "first");
    assert_eq!(r2["method"], "second");

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_rpc_error_surfaces() {
    let script = r#"
read -r line
id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id"
cat >/dev/null
"#;
    let transport = StdioTransport::spawn(&server_config(script)).unwrap();
    let err = transport
        .call("nope", None, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("method not found"));
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_call_timeout_cleans_pending() {
    // Server that never responds.
    let transport = StdioTransport::spawn(&server_config("cat >/dev/null")).unwrap();
    let err = transport
        .call("slow", None, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert!(transport
        .pending
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .is_empty());
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_call_after_close_fails() {
    let transport = StdioTransport::spawn(&server_config(ECHO_SERVER)).unwrap();
    transport.close().await.unwrap();
    transport.close().await.unwrap();

    let err = transport
        .call("ping", None, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("transport is closed"));
}

#[tokio::test]
async fn test_notify_expects_no_reply() {
    let transport = StdioTransport::spawn(&server_config(ECHO_SERVER)).unwrap();
    transport
        .notify("notifications/initialized", None)
        .await
        .unwrap();
    // A real call still works afterwards.
    let result = transport
        .call("after", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result["method"], "after");
    transport.close().await.unwrap();
}

#[test]
fn test_dispatch_line_skips_malformed_and_unknown() {
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
    // Malformed JSON and unknown ids must not panic or consume entries.
    StdioTransport::dispatch_line(&pending, "not json at all");
    StdioTransport::dispatch_line(&pending, r#"{"jsonrpc":"2.0","id":999,"result":{}}"#);

    let (tx, mut rx) = oneshot::channel();
    pending
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(5, tx);
    // Notification must not be delivered to the pending call.
    StdioTransport::dispatch_line(&pending, r#"{"jsonrpc":"2.0","method":"noise"}"#);
    assert!(rx.try_recv().is_err());

    // The matching response is.
    StdioTransport::dispatch_line(&pending, r#"{"jsonrpc":"2.0","id":5,"result":{"ok":1}}"#);
    let outcome = rx.try_recv().unwrap().unwrap();
    assert_eq!(outcome["ok"], 1);
}
