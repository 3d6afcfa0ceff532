use std::sync::Arc;

use async_trait::async_trait;
use broccoli_queue::brokers::broker::BrokerMessage;
use broccoli_queue::queue::BroccoliQueue;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::broker::{Acker, Broker, Delivery, DeliveryStream};
use crate::config::MqConfig;
use crate::error::MqError;

/// Broker backed by redis through broccoli_queue.
///
/// Bodies must be JSON; they travel as the queue message payload.
pub struct RedisBroker {
    queue: Arc<BroccoliQueue>,
}

impl RedisBroker {
    pub async fn connect(config: &MqConfig) -> Result<Self, MqError> {
        let queue = BroccoliQueue::builder(&config.url)
            .pool_connections(config.pool_size)
            .failed_message_retry_strategy(config.retry_strategy())
            .build()
            .await
            .map_err(|e| MqError::Connection(e.to_string()))?;

        Ok(Self {
            queue: Arc::new(queue),
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MqError> {
        let payload: Value = serde_json::from_slice(&body)?;
        let message = self
            .queue
            .publish(topic, None, &payload, None)
            .await
            .map_err(|e| MqError::Publish(e.to_string()))?;

        debug!(topic, task_id = %message.task_id, "Published message");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, MqError> {
        let state = (Arc::clone(&self.queue), topic.to_string());

        let stream = futures::stream::unfold(state, |(queue, topic)| async move {
            let item = match queue.consume::<Value>(&topic, None).await {
                Ok(message) => serde_json::to_vec(&message.payload)
                    .map(|body| {
                        let acker = RedisAcker {
                            queue: Arc::clone(&queue),
                            topic: topic.clone(),
                            message,
                        };
                        Delivery::new(body, Box::new(acker))
                    })
                    .map_err(MqError::from),
                Err(e) => Err(MqError::Consume(e.to_string())),
            };
            Some((item, (queue, topic)))
        });

        Ok(stream.boxed())
    }
}

struct RedisAcker {
    queue: Arc<BroccoliQueue>,
    topic: String,
    message: BrokerMessage<Value>,
}

#[async_trait]
impl Acker for RedisAcker {
    async fn ack(self: Box<Self>) -> Result<(), MqError> {
        let RedisAcker {
            queue,
            topic,
            message,
        } = *self;
        queue
            .acknowledge(&topic, message)
            .await
            .map_err(|e| MqError::AckFailed(e.to_string()))
    }

    async fn reject(self: Box<Self>) -> Result<(), MqError> {
        let RedisAcker {
            queue,
            topic,
            message,
        } = *self;
        queue
            .reject(&topic, message)
            .await
            .map_err(|e| MqError::AckFailed(e.to_string()))
    }
}
