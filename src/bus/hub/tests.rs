use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_outbound_routed_to_matching_subscriber_only() {
    let hub = Hub::new(10);
    let mut telegram_rx = hub.subscribe("telegram");
    let mut discord_rx = hub.subscribe("discord");
    let _router = hub.start_router();

    hub.outbound_sender()
        .unwrap()
        .send(OutboundMessage::new("discord", "c1", "for discord"))
        .await
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(1), discord_rx.recv())
        .await
        .expect("discord subscriber should receive")
        .unwrap();
    assert_eq!(got.content, "for discord");

    // Telegram must not have received anything.
    let nothing = tokio::time::timeout(Duration::from_millis(100), telegram_rx.recv()).await;
    assert!(nothing.is_err(), "telegram subscriber got an unexpected message");
}

#[tokio::test]
async fn test_outbound_for_unknown_channel_is_dropped() {
    let hub = Hub::new(10);
    let mut telegram_rx = hub.subscribe("telegram");
    let _router = hub.start_router();

    let tx = hub.outbound_sender().unwrap();
    tx.send(OutboundMessage::new("none", "c1", "nowhere"))
        .await
        .unwrap();
    tx.send(OutboundMessage::new("telegram", "c1", "after drop"))
        .await
        .unwrap();

    // Router survives the drop and keeps delivering.
    let got = tokio::time::timeout(Duration::from_secs(1), telegram_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.content, "after drop");
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_router() {
    let hub = Hub::new(2);
    // Subscribe but never drain - queue fills after 2 messages.
    let _stuck_rx = hub.subscribe("stuck");
    let mut live_rx = hub.subscribe("live");
    let _router = hub.start_router();

    let tx = hub.outbound_sender().unwrap();
    for i in 0..5 {
        tx.send(OutboundMessage::new("stuck", "c", format!("m{}", i)))
            .await
            .unwrap();
    }
    tx.send(OutboundMessage::new("live", "c", "still flowing"))
        .await
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(1), live_rx.recv())
        .await
        .expect("router must not be blocked by a slow subscriber")
        .unwrap();
    assert_eq!(got.content, "still flowing");
}

#[tokio::test]
async fn test_inbound_fifo_order() {
    let hub = Hub::new(10);
    let mut rx = hub.take_inbound_rx().unwrap();

    for i in 0..3 {
        hub.publish_inbound(InboundMessage::new("web", "s", "c", format!("m{}", i)))
            .await
            .unwrap();
    }

    for i in 0..3 {
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.content, format!("m{}", i));
    }
}

#[tokio::test]
async fn test_take_inbound_rx_is_single_consumer() {
    let hub = Hub::new(10);
    assert!(hub.take_inbound_rx().is_some());
    assert!(hub.take_inbound_rx().is_none());
}

#[tokio::test]
async fn test_close_closes_both_queues() {
    let hub = Hub::new(4);
    let inbound = hub.inbound_sender().unwrap();
    let outbound = hub.outbound_sender().unwrap();

    hub.close();

    // No new producers after close.
    assert!(hub.inbound_sender().is_err());
    assert!(hub.outbound_sender().is_err());
    assert!(hub.publish_inbound(InboundMessage::new("web", "s", "c", "late")).await.is_err());

    // Existing clones see send errors: close dropped the receivers the
    // hub still held, so both queues are gone.
    assert!(inbound
        .send(InboundMessage::new("web", "s", "c", "late"))
        .await
        .is_err());
    assert!(outbound
        .send(OutboundMessage::new("web", "c", "late"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_subscribers_observe_end_of_stream_on_close() {
    let hub = Hub::new(10);
    let mut rx = hub.subscribe("telegram");
    let router = hub.start_router();

    // close() alone must end the stream: it drops the hub's outbound
    // sender (so the router drains and exits) and the subscriber's
    // delivery sender (so recv returns None).
    hub.close();
    let _ = router.await;

    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert!(got.is_none(), "subscriber should see end-of-stream");
}
