// Composition root: idempotent init, subsystem wiring, timeouts
use courier_core::{
    ChannelHandle, ChannelName, Courier, CourierConfig, CourierError, MemoryTransport,
    ReplyEnvelope, Result, Transport,
};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Transport {}
    impl Transport for Transport {
        fn register_channel(&self, name: ChannelName) -> Result<Arc<dyn ChannelHandle>>;
    }
}

const COURIER_CHANNELS: [ChannelName; 4] = [
    ChannelName::Circuits,
    ChannelName::Members,
    ChannelName::Hotkeys,
    ChannelName::Notifications,
];

fn courier_with(config: CourierConfig) -> (Courier, courier_core::MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    (Courier::new(Arc::new(transport), config), peer)
}

#[tokio::test]
async fn double_init_registers_each_channel_once() -> Result<()> {
    let (memory, mut peer) = MemoryTransport::pair();
    let mut mock = MockTransport::new();
    for name in COURIER_CHANNELS {
        let handle = memory.register_channel(name)?;
        mock.expect_register_channel()
            .withf(move |n| *n == name)
            .times(1)
            .returning(move |_| Ok(Arc::clone(&handle)));
    }

    let courier = Courier::new(Arc::new(mock), CourierConfig::default());
    courier.init()?;

    let before = courier.members.get_me()?;
    courier.init()?;
    assert_eq!(courier.channels().len(), 4);
    assert_eq!(courier.members.subsystem().pending(), 1);

    let after = courier.members.get_me()?;
    assert_ne!(before.id(), after.id());

    for (channel, request) in peer.drain_requests() {
        let name = format!("member-{}", request.id());
        peer.reply(channel, request.reply(json!({ "username": name })));
    }
    assert_eq!(
        before.await?.reply.data,
        Some(json!({"username": "member-1"}))
    );
    assert_eq!(
        after.await?.reply.data,
        Some(json!({"username": "member-2"}))
    );
    assert_eq!(courier.members.me_username().as_deref(), Some("member-2"));
    assert_eq!(courier.pending_total(), 0);
    Ok(())
}

#[test]
fn failed_registration_surfaces_from_init() {
    let mut mock = MockTransport::new();
    mock.expect_register_channel()
        .returning(|_| Err(CourierError::Transport("counterpart unavailable".into())));

    let courier = Courier::new(Arc::new(mock), CourierConfig::default());
    let err = courier.init().unwrap_err();
    assert_eq!(err.code(), "TRANSPORT_ERROR");
    assert!(!courier.circuits.subsystem().is_initialized());
}

#[tokio::test]
async fn subsystems_correlate_independently() -> Result<()> {
    let (courier, mut peer) = courier_with(CourierConfig::default());
    courier.init()?;

    let circuit = courier.circuits.load_active_circuit()?;
    let shortcuts = courier.hotkeys.get_current_shortcuts()?;
    // Both registries start counting at 1.
    assert_eq!(circuit.id(), shortcuts.id());

    let sent = peer.drain_requests();
    assert_eq!(sent.len(), 2);
    for (channel, request) in sent.into_iter().rev() {
        peer.reply(channel, request.reply(json!({ "from": channel.as_str() })));
    }

    assert_eq!(
        circuit.await?.reply.data,
        Some(json!({"from": "circuits"}))
    );
    assert_eq!(
        shortcuts.await?.reply.data,
        Some(json!({"from": "hotkeys"}))
    );
    Ok(())
}

#[tokio::test]
async fn requests_before_init_fail() {
    let (courier, _peer) = courier_with(CourierConfig::default());
    let err = courier.circuits.start_wtf().unwrap_err();
    assert!(matches!(err, CourierError::NotInitialized(ChannelName::Circuits)));
    assert!(courier.notify("toast", json!({})).is_err());
}

#[tokio::test]
async fn notify_is_fire_and_forget() -> Result<()> {
    let (courier, mut peer) = courier_with(CourierConfig::default());
    courier.init()?;

    courier.notify("toast", json!({"text": "circuit solved"}))?;
    let (channel, envelope) = peer.try_next_request().expect("notification sent");
    assert_eq!(channel, ChannelName::Notifications);
    assert_eq!(envelope.request_type(), "toast");

    // A stray answer on the send-only channel goes nowhere.
    peer.reply(channel, ReplyEnvelope::ok(envelope.id(), "toast", json!(null)));
    let binding = courier
        .channels()
        .get(ChannelName::Notifications)
        .expect("bound");
    assert_eq!(binding.stats().dropped, 1);
    assert_eq!(courier.pending_total(), 0);
    Ok(())
}

#[tokio::test]
async fn resolve_without_timeout_waits() -> Result<()> {
    let (courier, mut peer) = courier_with(CourierConfig::default());
    courier.init()?;

    let pending = courier.hotkeys.update_shortcuts(json!({"toggle": "Ctrl+Shift+T"}))?;
    let (channel, request) = peer.try_next_request().expect("sent");
    let replier = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.reply(channel, request.reply(json!({"ok": true})));
        peer
    });

    let delivery = courier.resolve(pending).await?;
    assert_eq!(delivery.reply.data, Some(json!({"ok": true})));
    replier.await.expect("replier");
    Ok(())
}

#[tokio::test]
async fn resolve_with_timeout_withdraws_request() -> Result<()> {
    let (courier, _peer) = courier_with(CourierConfig {
        reply_timeout_ms: Some(20),
        ..CourierConfig::default()
    });
    courier.init()?;

    let pending = courier.circuits.get_circuit_with_all_details("angry_badger")?;
    let id = pending.id();
    let err = courier.resolve(pending).await.unwrap_err();
    assert!(matches!(err, CourierError::Timeout(t) if t == id));
    assert_eq!(courier.pending_total(), 0);
    Ok(())
}

#[tokio::test]
async fn sweep_needs_configured_age() -> Result<()> {
    let (courier, _peer) = courier_with(CourierConfig::default());
    courier.init()?;
    let _leaked = courier.circuits.start_wtf()?;
    assert_eq!(courier.sweep_expired(), 0);
    assert_eq!(courier.pending_total(), 1);
    courier.shutdown();

    let (courier, _peer) = courier_with(CourierConfig {
        pending_max_age_ms: Some(10),
        ..CourierConfig::default()
    });
    courier.init()?;
    let stale = courier.circuits.start_wtf()?;
    let _other = courier.members.get_member("m-9")?;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(courier.sweep_expired(), 2);
    assert_eq!(courier.pending_total(), 0);
    assert!(matches!(stale.await, Err(CourierError::Expired(_))));
    Ok(())
}
