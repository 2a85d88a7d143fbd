use courier_core::{
    ChannelBinding, ChannelName, ChannelRegistry, CorrelationRegistry, MemoryPeer,
    MemoryTransport, ReplyEnvelope, RequestId, Result,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// Helper: one circuits channel whose replies feed a fresh registry
fn circuits() -> (Arc<CorrelationRegistry>, Arc<ChannelBinding>, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let channels = ChannelRegistry::new(Arc::new(transport));
    let registry = Arc::new(CorrelationRegistry::new(ChannelName::Circuits));
    let binding = channels
        .create_channel(ChannelName::Circuits, "test", Some(registry.clone()))
        .expect("bind circuits");
    (registry, binding, peer)
}

#[tokio::test]
async fn reply_resolves_request_and_clears_entry() -> Result<()> {
    let (registry, binding, mut peer) = circuits();

    let pending = registry.dispatch(&binding, "get-me", json!({}))?;
    assert_eq!(pending.id(), RequestId(1));
    assert!(registry.contains(RequestId(1)));

    let (channel, request) = peer.try_next_request().expect("request sent");
    assert_eq!(channel, ChannelName::Circuits);
    assert_eq!(request.request_type(), "get-me");
    peer.reply(
        channel,
        ReplyEnvelope::ok(RequestId(1), "get-me", json!({"name": "Alice"})),
    );

    let delivery = pending.await?;
    assert_eq!(delivery.reply.data, Some(json!({"name": "Alice"})));
    assert_eq!(delivery.event.channel, ChannelName::Circuits);
    assert!(!registry.contains(RequestId(1)));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn out_of_order_replies_reach_their_own_requests() -> Result<()> {
    let (registry, binding, peer) = circuits();

    let a = registry.dispatch(&binding, "join-wtf", json!({"circuitName": "a"}))?;
    let b = registry.dispatch(&binding, "join-wtf", json!({"circuitName": "b"}))?;
    let (id_a, id_b) = (a.id(), b.id());

    peer.reply(
        ChannelName::Circuits,
        ReplyEnvelope::ok(id_b, "join-wtf", json!("reply-b")),
    );
    let got_b = b.await?;
    assert_eq!(got_b.reply.data, Some(json!("reply-b")));
    assert_eq!(registry.pending_ids(), vec![id_a]);

    peer.reply(
        ChannelName::Circuits,
        ReplyEnvelope::ok(id_a, "join-wtf", json!("reply-a")),
    );
    let got_a = a.await?;
    assert_eq!(got_a.reply.data, Some(json!("reply-a")));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn only_the_replied_request_resolves() -> Result<()> {
    let (registry, binding, peer) = circuits();

    let mut first = registry.dispatch(&binding, "a", json!(null))?;
    let second = registry.dispatch(&binding, "b", json!(null))?;
    peer.reply(
        ChannelName::Circuits,
        ReplyEnvelope::ok(second.id(), "b", json!(2)),
    );
    second.await?;

    let still_waiting = tokio::time::timeout(Duration::from_millis(50), &mut first).await;
    assert!(still_waiting.is_err(), "request 1 must stay pending");
    assert!(registry.contains(first.id()));
    Ok(())
}

#[tokio::test]
async fn duplicate_reply_is_dropped() -> Result<()> {
    let (registry, binding, peer) = circuits();
    let pending = registry.dispatch(&binding, "get-me", json!({}))?;
    let id = pending.id();

    peer.reply(ChannelName::Circuits, ReplyEnvelope::ok(id, "get-me", json!(1)));
    peer.reply(ChannelName::Circuits, ReplyEnvelope::ok(id, "get-me", json!(2)));

    let delivery = pending.await?;
    assert_eq!(delivery.reply.data, Some(json!(1)));
    assert!(registry.is_empty());
    assert_eq!(binding.stats().received, 2);
    Ok(())
}

#[tokio::test]
async fn error_reply_is_delivered_like_any_other() -> Result<()> {
    let (registry, binding, peer) = circuits();
    let pending = registry.dispatch(&binding, "solve-wtf", json!({}))?;
    peer.reply(
        ChannelName::Circuits,
        ReplyEnvelope::failed(pending.id(), "solve-wtf", json!({"message": "not owner"})),
    );

    let delivery = pending.await?;
    assert!(delivery.reply.is_error());
    assert_eq!(
        delivery.reply.into_result().unwrap_err(),
        json!({"message": "not owner"})
    );
    Ok(())
}

#[test]
fn unknown_reply_id_is_ignored() {
    let (registry, binding, peer) = circuits();
    let pending = registry.dispatch(&binding, "a", json!(null)).unwrap();

    assert!(peer.reply(
        ChannelName::Circuits,
        ReplyEnvelope::ok(RequestId(999), "a", json!(null))
    ));
    assert_eq!(registry.pending_ids(), vec![pending.id()]);
}

#[test]
fn pending_ids_are_distinct() {
    let (registry, binding, _peer) = circuits();
    let pendings: Vec<_> = (0..500)
        .map(|i| registry.dispatch(&binding, "load", json!(i)).unwrap())
        .collect();

    let ids: HashSet<RequestId> = pendings.iter().map(|p| p.id()).collect();
    assert_eq!(ids.len(), 500);
    assert_eq!(registry.len(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatch_and_reply_keeps_ids_unique() -> Result<()> {
    let (registry, binding, mut peer) = circuits();
    let total = 400usize;

    let mut callers = Vec::new();
    for i in 0..total {
        let registry = Arc::clone(&registry);
        let binding = Arc::clone(&binding);
        callers.push(tokio::spawn(async move {
            let pending = registry.dispatch(&binding, "echo", json!(i))?;
            let id = pending.id();
            let delivery = pending.await?;
            Ok::<_, courier_core::CourierError>((id, i, delivery.reply.data))
        }));
    }

    // Counterpart echoes every payload back, newest first.
    let mut requests = Vec::with_capacity(total);
    while requests.len() < total {
        let next = peer.next_request().await.expect("transport open");
        requests.push(next);
    }
    let echoed: HashSet<RequestId> = requests.iter().map(|(_, r)| r.id()).collect();
    assert_eq!(echoed.len(), total);
    for (channel, request) in requests.into_iter().rev() {
        peer.reply(channel, request.reply(request.payload().clone()));
    }

    for caller in callers {
        let (_, i, data) = caller.await.expect("task")?;
        assert_eq!(data, Some(json!(i)));
    }
    assert!(registry.is_empty());
    Ok(())
}
