mod counterpart;
use counterpart::Counterpart;
use courier_core::telemetry::init_tracing;
use courier_core::{Courier, CourierConfig, MemoryTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = CourierConfig::load()?;
    init_tracing(&cfg.log_filter);

    info!(target: "echo_counterpart", owner = %cfg.owner, "Starting Courier demo");

    let (transport, peer) = MemoryTransport::pair();
    let counterpart = tokio::spawn(Counterpart::new(peer, 4, Duration::from_millis(25)).run());

    let courier = Arc::new(Courier::new(Arc::new(transport), cfg));
    courier.init()?;
    // Repeated init is harmless
    courier.init()?;

    let me = courier.members.get_me()?;
    let circuit = courier.circuits.load_active_circuit()?;
    let shortcuts = courier.hotkeys.get_current_shortcuts()?;
    let join = courier.circuits.join_wtf("angry_badger")?;
    let unsupported = courier.circuits.pause_wtf("angry_badger")?;
    info!(
        target: "echo_counterpart",
        me = %me.id(),
        circuit = %circuit.id(),
        shortcuts = %shortcuts.id(),
        join = %join.id(),
        pending = courier.pending_total(),
        "Requests dispatched"
    );

    let (me, circuit, shortcuts, join, unsupported) = tokio::join!(
        courier.resolve(me),
        courier.resolve(circuit),
        courier.resolve(shortcuts),
        courier.resolve(join),
        courier.resolve(unsupported),
    );

    for (label, outcome) in [
        ("get-me", me),
        ("load-active-circuit", circuit),
        ("get-current-shortcuts", shortcuts),
        ("join-wtf", join),
        ("pause-wtf", unsupported),
    ] {
        match outcome.map(|d| d.reply.into_result()) {
            Ok(Ok(data)) => info!(target: "echo_counterpart", request = label, data = %data, "Reply"),
            Ok(Err(err)) => warn!(target: "echo_counterpart", request = label, error = %err, "Domain error"),
            Err(e) => warn!(target: "echo_counterpart", request = label, error = %e, code = e.code(), "No reply"),
        }
    }

    info!(
        target: "echo_counterpart",
        username = ?courier.members.me_username(),
        "Cached member"
    );

    courier.notify("toast", json!({ "text": "demo finished" }))?;
    courier.shutdown();

    drop(courier);
    if let Err(e) = counterpart.await {
        warn!(target: "echo_counterpart", error = %e, "Counterpart task failed");
    }
    Ok(())
}
