//! In-memory broker for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::broker::{Broker, BrokerError, Message, MessageSource, Subscription};

#[derive(Debug, Default)]
struct TopicLog {
    messages: Vec<Vec<u8>>,
    /// Offset of the first message not yet acknowledged by the (single) group.
    committed: usize,
}

#[derive(Debug, Default)]
struct Shared {
    topics: Mutex<HashMap<String, TopicLog>>,
    notify: Notify,
    unavailable: AtomicBool,
    writer_closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TopicLog>>, BrokerError> {
        self.topics
            .lock()
            .map_err(|_| BrokerError::Command("in-memory broker lock poisoned".to_string()))
    }

    /// Read-only view for inspection; a poisoned lock still shows its data.
    fn snapshot(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("broker unavailable".to_string()));
        }
        Ok(())
    }
}

/// Log-structured in-memory broker.
///
/// - Each topic is an append-only log retained for the life of the broker
/// - One implicit consumer group per topic: a new subscription resumes at the
///   first unacknowledged offset, so unacked messages are redelivered
/// - Cloning shares the same logs
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable broker: publish and subscribe fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All payloads ever published to `topic`, in log order.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.shared
            .snapshot()
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Offset of the first unacknowledged message of `topic`.
    pub fn committed_offset(&self, topic: &str) -> usize {
        self.shared
            .snapshot()
            .get(topic)
            .map(|log| log.committed)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.shared.ensure_available()?;
        if self.shared.writer_closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        self.shared
            .lock()?
            .entry(topic.to_string())
            .or_default()
            .messages
            .push(payload);

        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        self.shared.ensure_available()?;

        let cursor = self
            .shared
            .lock()?
            .entry(topic.to_string())
            .or_default()
            .committed;

        let source = InMemorySource {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            cursor,
        };
        Ok(Subscription::new(topic, Box::new(source)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.shared.writer_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct InMemorySource {
    shared: Arc<Shared>,
    topic: String,
    cursor: usize,
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn next(&mut self) -> Result<Option<Message>, BrokerError> {
        loop {
            // Registered before the log check so a concurrent publish cannot be missed.
            let notified = self.shared.notify.notified();

            {
                let topics = self.shared.lock()?;
                if let Some(payload) = topics
                    .get(&self.topic)
                    .and_then(|log| log.messages.get(self.cursor))
                {
                    let message = Message {
                        id: self.cursor.to_string(),
                        payload: payload.clone(),
                    };
                    self.cursor += 1;
                    return Ok(Some(message));
                }
            }

            notified.await;
        }
    }

    async fn ack(&mut self, message: &Message) -> Result<(), BrokerError> {
        let offset: usize = message
            .id
            .parse()
            .map_err(|_| BrokerError::Command(format!("unknown message id {}", message.id)))?;

        let mut topics = self.shared.lock()?;
        let log = topics.entry(self.topic.clone()).or_default();
        log.committed = log.committed.max(offset + 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}
