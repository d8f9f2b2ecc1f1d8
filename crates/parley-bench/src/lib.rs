//! Shared fixtures for Parley benchmarks.

use parley_core::{ConnectionId, Hub, HubConfig};
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// A benchmark participant: its id and the receiving end of its outbox.
pub struct Member {
    pub id: ConnectionId,
    pub inbox: UnboundedReceiver<Arc<ServerEvent>>,
}

impl Member {
    /// Discard every queued event, returning how many there were.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.inbox.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Build a hub with `members` sessions joined to `channel`.
pub async fn populated_hub(members: usize, channel: &str) -> (Hub, Vec<Member>) {
    let hub = Hub::with_config(HubConfig {
        max_connections: members + 16,
        ..HubConfig::default()
    });

    let mut joined = Vec::with_capacity(members);
    for i in 0..members {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let Ok(id) = hub.connect(outbox).await else {
            break;
        };
        let _ = hub.join(&id, &format!("user-{i}")).await;
        let _ = hub.join_channel(&id, channel).await;
        joined.push(Member { id, inbox });
    }

    for member in &mut joined {
        member.drain();
    }
    (hub, joined)
}
