use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::MqError;

/// Stream of deliveries from a subscription. Ends when the subscription closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, MqError>>;

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<(), MqError>;

    /// Reject without requeue.
    async fn reject(self: Box<Self>) -> Result<(), MqError>;
}

/// One message received from a subscription, settled exactly once through
/// [`Delivery::ack`] or [`Delivery::reject`].
pub struct Delivery {
    body: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { body, acker }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> Result<(), MqError> {
        self.acker.ack().await
    }

    pub async fn reject(self) -> Result<(), MqError> {
        self.acker.reject().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.body.len())
            .finish()
    }
}

/// Message broker used by the grading pipeline.
///
/// Bodies are opaque bytes; callers own the encoding.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MqError>;

    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, MqError>;
}
