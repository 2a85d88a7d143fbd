use std::time::Duration;

use courier_core::{ChannelName, MemoryPeer, ReplyEnvelope, RequestEnvelope};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Simulated privileged process.
///
/// Requests are buffered until `batch` have arrived or the line goes quiet
/// for `idle`, then answered newest-first so callers see replies out of
/// order.
pub struct Counterpart {
    peer: MemoryPeer,
    batch: usize,
    idle: Duration,
}

impl Counterpart {
    pub fn new(peer: MemoryPeer, batch: usize, idle: Duration) -> Self {
        Self {
            peer,
            batch: batch.max(1),
            idle,
        }
    }

    pub async fn run(mut self) {
        let mut held: Vec<(ChannelName, RequestEnvelope)> = Vec::new();
        loop {
            match tokio::time::timeout(self.idle, self.peer.next_request()).await {
                Ok(Some(next)) => {
                    debug!(target: "counterpart", channel = %next.0, id = %next.1.id(), "Holding request");
                    held.push(next);
                    if held.len() < self.batch {
                        continue;
                    }
                }
                Ok(None) => break,
                Err(_) if held.is_empty() => continue,
                Err(_) => {}
            }
            self.flush(&mut held);
        }
        self.flush(&mut held);
        info!(target: "counterpart", "Process side closed; counterpart exiting");
    }

    fn flush(&self, held: &mut Vec<(ChannelName, RequestEnvelope)>) {
        while let Some((channel, request)) = held.pop() {
            if channel == ChannelName::Notifications {
                info!(target: "counterpart", kind = %request.request_type(), payload = %request.payload(), "Notification");
                continue;
            }
            self.peer.reply(channel, answer(channel, &request));
        }
    }
}

fn answer(channel: ChannelName, request: &RequestEnvelope) -> ReplyEnvelope {
    let data: Value = match request.request_type() {
        "get-me" | "load-me" => json!({ "id": "m-1", "username": "alice", "displayName": "Alice" }),
        "get-member" => json!({ "id": request.payload()["memberId"], "username": "bob" }),
        "load-active-circuit" => json!({ "circuitName": "angry_badger", "circuitState": "TROUBLESHOOT" }),
        "join-wtf" => json!({ "circuitName": request.payload()["circuitName"], "joined": true }),
        "get-current-shortcuts" => json!({ "toggleConsole": "Ctrl+Shift+Space" }),
        other => {
            return request.reply_error(json!({
                "message": format!("{other} is not supported on {channel}")
            }))
        }
    };
    request.reply(data)
}
