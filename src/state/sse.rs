use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`super::AppState`].
pub struct SseState {
    public: EventHub,
    admin: AdminChannel,
}

impl SseState {
    /// Build the SSE sub-tree with per-stream channel capacities.
    pub fn new(public_capacity: usize, admin_capacity: usize) -> Self {
        Self {
            public: EventHub::new(public_capacity),
            admin: AdminChannel {
                hub: EventHub::new(admin_capacity),
                token: Mutex::new(None),
            },
        }
    }

    /// Hub fanning out game events to players and displays.
    pub fn public(&self) -> &EventHub {
        &self.public
    }

    /// Operator channel: claim details plus the token gating admin routes.
    pub fn admin(&self) -> &AdminChannel {
        &self.admin
    }
}

/// Operator event hub and the token issued to its single subscriber.
pub struct AdminChannel {
    hub: EventHub,
    token: Mutex<Option<String>>,
}

impl AdminChannel {
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn token(&self) -> &Mutex<Option<String>> {
        &self.token
    }
}

/// Broadcast fan-out of [`ServerEvent`]s; events sent with no subscriber are dropped.
pub struct EventHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
