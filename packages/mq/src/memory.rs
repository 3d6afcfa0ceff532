use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::broker::{Acker, Broker, Delivery, DeliveryStream};
use crate::error::MqError;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected,
}

#[derive(Default)]
struct Topic {
    sender: Option<mpsc::UnboundedSender<Vec<u8>>>,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    subscribed: bool,
    published: Vec<Vec<u8>>,
}

impl Topic {
    /// Open the channel on first use. A closed topic stays closed.
    fn open(&mut self) {
        if self.sender.is_none() && self.receiver.is_none() && !self.subscribed {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sender = Some(tx);
            self.receiver = Some(rx);
        }
    }
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, Topic>>,
    settlements: Mutex<Vec<(String, Vec<u8>, Settlement)>>,
    unavailable: AtomicBool,
}

/// In-process broker.
///
/// Each topic buffers messages until its single subscriber drains them.
/// Every publish and settlement is recorded for inspection.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with [`MqError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Bodies published to `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        let topics = lock(&self.shared.topics);
        topics
            .get(topic)
            .map(|t| t.published.clone())
            .unwrap_or_default()
    }

    /// Settlements recorded for `topic`, in settlement order.
    pub fn settlements(&self, topic: &str) -> Vec<(Vec<u8>, Settlement)> {
        lock(&self.shared.settlements)
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, body, s)| (body.clone(), *s))
            .collect()
    }

    /// Close `topic`: its subscription stream ends once buffered messages are drained.
    pub fn close(&self, topic: &str) {
        let mut topics = lock(&self.shared.topics);
        if let Some(t) = topics.get_mut(topic) {
            t.sender = None;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MqError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(MqError::Unavailable);
        }

        let mut topics = lock(&self.shared.topics);
        let entry = topics.entry(topic.to_string()).or_default();
        entry.open();
        let sender = entry
            .sender
            .as_ref()
            .ok_or_else(|| MqError::Publish(format!("topic {topic} is closed")))?;
        sender
            .send(body.clone())
            .map_err(|_| MqError::Publish(format!("topic {topic} is closed")))?;
        entry.published.push(body);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, MqError> {
        let receiver = {
            let mut topics = lock(&self.shared.topics);
            let entry = topics.entry(topic.to_string()).or_default();
            entry.open();
            if entry.subscribed {
                return Err(MqError::AlreadySubscribed(topic.to_string()));
            }
            entry.subscribed = true;
            entry
                .receiver
                .take()
                .ok_or_else(|| MqError::AlreadySubscribed(topic.to_string()))?
        };

        let shared = Arc::clone(&self.shared);
        let topic = topic.to_string();

        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let shared = Arc::clone(&shared);
            let topic = topic.clone();
            async move {
                let body = receiver.recv().await?;
                let acker = MemoryAcker {
                    shared,
                    topic,
                    body: body.clone(),
                };
                Some((Ok(Delivery::new(body, Box::new(acker))), receiver))
            }
        });

        Ok(stream.boxed())
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    topic: String,
    body: Vec<u8>,
}

impl MemoryAcker {
    fn record(self, settlement: Settlement) {
        lock(&self.shared.settlements).push((self.topic, self.body, settlement));
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), MqError> {
        (*self).record(Settlement::Acked);
        Ok(())
    }

    async fn reject(self: Box<Self>) -> Result<(), MqError> {
        (*self).record(Settlement::Rejected);
        Ok(())
    }
}
