//! Message broker abstraction (mechanics only).
//!
//! The broker is the only link between the replication producer and the
//! replication consumer. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory log, Redis Streams, or any log-style broker.
//! - **At-least-once delivery**: a message may be delivered more than once; consumers
//!   must be idempotent.
//! - **Fire-and-forget publish**: `publish` hands the message to the broker's writer and
//!   returns; it does not wait for a broker acknowledgment. A message can therefore be
//!   lost between a successful `publish` and the broker persisting it.
//! - **No ordering guarantee** beyond what a single topic log provides.
//!
//! Consumers acknowledge a message only after applying it, so a crash between read
//! and apply causes redelivery rather than loss.

use async_trait::async_trait;
use thiserror::Error;

use userlink_core::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command error: {0}")]
    Command(String),

    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    /// The writer or reader has been closed.
    #[error("broker handle closed")]
    Closed,
}

impl From<BrokerError> for Error {
    fn from(value: BrokerError) -> Self {
        Error::internal(value.to_string())
    }
}

/// A message read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Broker-assigned position, used for acknowledgment.
    pub id: String,
    pub payload: Vec<u8>,
}

/// Source side of a subscription, implemented per transport.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the source is exhausted (broker shut down).
    async fn next(&mut self) -> Result<Option<Message>, BrokerError>;

    /// Mark a message as applied so it is not redelivered.
    async fn ack(&mut self, message: &Message) -> Result<(), BrokerError>;

    /// Release the reader (group membership, connection).
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// A subscription to one topic.
///
/// Designed for single-task consumption: the consumer loop owns it.
pub struct Subscription {
    topic: String,
    source: Box<dyn MessageSource>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, source: Box<dyn MessageSource>) -> Self {
        Self {
            topic: topic.into(),
            source,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message. This is the consumer's suspension point.
    pub async fn next(&mut self) -> Result<Option<Message>, BrokerError> {
        self.source.next().await
    }

    pub async fn ack(&mut self, message: &Message) -> Result<(), BrokerError> {
        self.source.ack(message).await
    }

    pub async fn close(mut self) -> Result<(), BrokerError> {
        self.source.close().await
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Publish/subscribe broker.
///
/// `subscribe` doubles as the connectivity check: it fails while the broker is
/// unreachable or the consumer group cannot be joined yet.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Hand one message to the broker writer (unconfirmed).
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError>;

    /// Flush pending writes and close the writer.
    async fn close(&self) -> Result<(), BrokerError>;
}

#[async_trait]
impl<B> Broker for std::sync::Arc<B>
where
    B: Broker + ?Sized,
{
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        (**self).publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        (**self).subscribe(topic).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        (**self).close().await
    }
}
