use async_trait::async_trait;
use blog_core::events::Broadcaster;
use serde_json::Value;
use tokio::sync::broadcast;

/// Published once at shutdown; event streams end when they reach it.
pub const SERVER_SHUTDOWN: &str = "server:shutdown";

/// Serializable envelope that carries event names, target room, and optional payloads.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub name: &'static str,
    /// `None` addresses the default room, which every client is in.
    pub room: Option<String>,
    pub payload: Option<Value>,
}

impl ServerEvent {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            room: None,
            payload: None,
        }
    }

    pub fn with_payload(name: &'static str, payload: Value) -> Self {
        Self {
            name,
            room: None,
            payload: Some(payload),
        }
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn is_shutdown(&self) -> bool {
        self.name == SERVER_SHUTDOWN
    }

    /// Whether a client that joined `rooms` should receive this event.
    pub fn is_visible_to(&self, rooms: &[String]) -> bool {
        match &self.room {
            None => true,
            Some(room) => rooms.iter().any(|joined| joined == room),
        }
    }
}

/// Lightweight broadcast bus that fans out events to any connected clients.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ServerEvent) {
        // Lagging listeners are ignored to avoid blocking producers.
        if self.sender.send(event).is_err() {
            tracing::trace!("No connected clients; live event dropped");
        }
    }

    /// Ends every open event stream after the events already queued for it.
    pub fn close_streams(&self) {
        self.publish(ServerEvent::new(SERVER_SHUTDOWN));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Broadcaster for EventBus {
    async fn send(&self, channel: &'static str, batch: Vec<Value>) -> blog_core::Result<()> {
        tracing::debug!(
            "Broadcasting {} payload(s) on '{}' to {} client(s)",
            batch.len(),
            channel,
            self.subscriber_count()
        );
        self.publish(ServerEvent::with_payload(channel, Value::Array(batch)));
        Ok(())
    }
}
