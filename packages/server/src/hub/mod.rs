//! In-process registry of live user connections.
//!
//! Every connection is the sending half of a bounded channel drained by the
//! socket's writer task. The hub never awaits a socket: a connection whose
//! buffer is full or whose writer is gone is dropped on the spot.

pub mod socket;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::HubConfig;

pub type UserId = i64;
pub type ConnectionId = u64;

/// Event pushed to clients when a submission changes.
pub const SUBMISSION_UPDATE_EVENT: &str = "onSubmissionUpdate";

#[derive(Debug, Error)]
pub enum HubError {
    #[error("user {0} has no live connection")]
    UserNotConnected(UserId),

    #[error("connection {connection_id} of user {user_id} is gone")]
    ConnectionGone {
        user_id: UserId,
        connection_id: ConnectionId,
    },

    #[error("failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    QueueClosed,
}

/// Frame written to clients.
#[derive(Serialize)]
struct OutboundFrame<'a, T: ?Sized> {
    channel: &'a str,
    message: &'a T,
}

/// Frame read from clients.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub channel: String,
    #[serde(default)]
    pub message: Value,
}

/// One live socket as seen by the hub.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame. Returns false when the connection should be dropped.
    fn deliver(&self, frame: &str) -> bool {
        match self.tx.try_send(frame.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = self.id, "Outbound buffer full, dropping connection");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = self.id, "Connection closed, dropping");
                false
            }
        }
    }
}

/// Who sent an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundContext {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

/// Handles client-to-server frames addressed to one channel name.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, hub: &Hub, ctx: InboundContext, message: Value);
}

/// Replies `pong` with the same message to the connection that sent `ping`.
pub struct PingHandler;

#[async_trait]
impl ChannelHandler for PingHandler {
    async fn handle(&self, hub: &Hub, ctx: InboundContext, message: Value) {
        if let Err(e) = hub.send_to(ctx.user_id, ctx.connection_id, "pong", &message) {
            debug!(user_id = ctx.user_id, error = %e, "Could not answer ping");
        }
    }
}

pub struct Hub {
    connections: DashMap<UserId, VecDeque<Connection>>,
    handlers: DashMap<String, Arc<dyn ChannelHandler>>,
    max_per_user: usize,
    outbound_buffer: usize,
    next_connection_id: AtomicU64,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            connections: DashMap::new(),
            handlers: DashMap::new(),
            max_per_user: config.max_connections_per_user.max(1),
            outbound_buffer: config.outbound_buffer.max(1),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Create a connection and the receiver its writer task drains.
    pub fn new_connection(&self) -> (Connection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        (Connection { id, tx }, rx)
    }

    /// Add `connection` to the user's set.
    ///
    /// When the user is at the cap, the oldest connection is evicted first and
    /// its id returned. Dropping it closes that socket's writer.
    pub fn register(&self, user_id: UserId, connection: Connection) -> Option<ConnectionId> {
        let mut set = self.connections.entry(user_id).or_default();

        let evicted = if set.len() >= self.max_per_user {
            set.pop_front().map(|old| old.id)
        } else {
            None
        };
        let connection_id = connection.id;
        set.push_back(connection);
        let live = set.len();
        drop(set);

        if let Some(old) = evicted {
            info!(user_id, evicted = old, "Connection cap reached, evicted oldest");
        }
        debug!(user_id, connection_id, live, "Registered connection");
        evicted
    }

    /// Remove one connection. Returns false if it was not registered.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut set) => {
                let before = set.len();
                set.retain(|c| c.id != connection_id);
                before != set.len()
            }
            None => false,
        };
        self.connections.remove_if(&user_id, |_, set| set.is_empty());

        if removed {
            debug!(user_id, connection_id, "Unregistered connection");
        }
        removed
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.connections.get(&user_id).map_or(0, |set| set.len())
    }

    /// Fan `payload` out to every live connection of `user_id` as
    /// `{channel: event, message: payload}`.
    ///
    /// Returns how many connections accepted the frame. Connections that fail
    /// are removed. Zero accepted is [`HubError::UserNotConnected`].
    pub fn send<T>(&self, user_id: UserId, event: &str, payload: &T) -> Result<usize, HubError>
    where
        T: Serialize + ?Sized,
    {
        let frame = serde_json::to_string(&OutboundFrame {
            channel: event,
            message: payload,
        })?;

        let delivered = match self.connections.get_mut(&user_id) {
            Some(mut set) => {
                set.retain(|c| c.deliver(&frame));
                set.len()
            }
            None => 0,
        };

        if delivered == 0 {
            self.connections.remove_if(&user_id, |_, set| set.is_empty());
            return Err(HubError::UserNotConnected(user_id));
        }
        Ok(delivered)
    }

    /// Send to a single connection of `user_id`.
    pub fn send_to<T>(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        event: &str,
        payload: &T,
    ) -> Result<(), HubError>
    where
        T: Serialize + ?Sized,
    {
        let frame = serde_json::to_string(&OutboundFrame {
            channel: event,
            message: payload,
        })?;

        let delivered = match self.connections.get_mut(&user_id) {
            Some(mut set) => match set.iter().position(|c| c.id == connection_id) {
                Some(index) if set[index].deliver(&frame) => true,
                Some(index) => {
                    set.remove(index);
                    false
                }
                None => false,
            },
            None => false,
        };

        if !delivered {
            self.connections.remove_if(&user_id, |_, set| set.is_empty());
            return Err(HubError::ConnectionGone {
                user_id,
                connection_id,
            });
        }
        Ok(())
    }

    /// Register the handler for an inbound channel, replacing any previous one.
    pub fn register_handler(&self, channel: impl Into<String>, handler: Arc<dyn ChannelHandler>) {
        self.handlers.insert(channel.into(), handler);
    }

    /// Route one inbound text frame to its channel handler.
    ///
    /// Unknown channels are ignored.
    pub async fn dispatch_inbound(&self, ctx: InboundContext, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "Ignoring malformed inbound frame");
                return;
            }
        };

        // Clone out so no map guard is held across the await.
        let handler = self.handlers.get(&frame.channel).map(|h| Arc::clone(&h));
        match handler {
            Some(handler) => handler.handle(self, ctx, frame.message).await,
            None => debug!(channel = %frame.channel, "No handler for inbound channel"),
        }
    }
}

/// A push queued for the hub.
#[derive(Debug, Clone)]
pub struct Notification {
    pub user_id: UserId,
    pub event: String,
    pub payload: Value,
}

/// Producer side of the hand-off between the result consumer and the hub.
///
/// `notify` never waits: a full queue is reported and the push is lost.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub fn notify<T>(&self, user_id: UserId, event: &str, payload: &T) -> Result<(), HubError>
    where
        T: Serialize + ?Sized,
    {
        let notification = Notification {
            user_id,
            event: event.to_string(),
            payload: serde_json::to_value(payload)?,
        };
        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => HubError::QueueFull,
            TrySendError::Closed(_) => HubError::QueueClosed,
        })
    }
}

/// Deliver queued notifications until every [`Notifier`] is dropped.
pub async fn run_dispatcher(hub: Arc<Hub>, mut rx: mpsc::Receiver<Notification>) {
    info!("Starting notification dispatcher");

    while let Some(n) = rx.recv().await {
        match hub.send(n.user_id, &n.event, &n.payload) {
            Ok(delivered) => debug!(user_id = n.user_id, event = %n.event, delivered, "Pushed event"),
            Err(HubError::UserNotConnected(user_id)) => {
                debug!(user_id, event = %n.event, "User offline, push dropped")
            }
            Err(e) => warn!(user_id = n.user_id, error = %e, "Failed to push event"),
        }
    }

    info!("Notification dispatcher stopped");
}
