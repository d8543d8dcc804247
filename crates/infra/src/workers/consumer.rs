//! Replication consumer: broker topic -> replica store.
//!
//! Ingestion is idempotent (insert-if-absent), so the at-least-once delivery
//! of the broker and the producer's restart duplicates are both harmless.
//! A message is acknowledged only after it has been applied.
//!
//! Failure policy:
//! - payload shorter than 8 bytes: fatal, [`ReplicationError::Malformed`]
//! - replica store error: fatal, propagated
//! - broker read error: fatal, propagated
//! - id already present: success
//!
//! Fatal errors end the loop; the process supervisor is expected to restart it.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use userlink_core::UserId;
use userlink_events::{Broker, Subscription, decode_user_id};

use super::{ReplicationError, WorkerHandle, WorkerState, stop_requested};
use crate::read_model::ReplicaStore;

/// Result of ingesting one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Inserted(UserId),
    AlreadyPresent(UserId),
}

pub struct ReplicationConsumer<R, B> {
    replica: R,
    broker: B,
    topic: String,
    connect_retry: Duration,
    connect_attempts: u32,
    state: watch::Sender<WorkerState>,
}

impl<R, B> ReplicationConsumer<R, B>
where
    R: ReplicaStore,
    B: Broker,
{
    pub fn new(replica: R, broker: B, topic: impl Into<String>) -> Self {
        let (state, _) = watch::channel(WorkerState::Connecting);
        Self {
            replica,
            broker,
            topic: topic.into(),
            connect_retry: Duration::from_secs(10),
            connect_attempts: 30,
            state,
        }
    }

    /// Connect retry policy. `attempts == 0` retries forever.
    pub fn with_connect_retry(mut self, every: Duration, attempts: u32) -> Self {
        self.connect_retry = every;
        self.connect_attempts = attempts;
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Decode one payload and insert the id if absent.
    pub async fn ingest(&self, payload: &[u8]) -> Result<Ingested, ReplicationError> {
        let id = decode_user_id(payload)?;

        if self.replica.exists_user_id(id).await? {
            return Ok(Ingested::AlreadyPresent(id));
        }
        match self.replica.insert_user_id(id).await {
            Ok(()) => Ok(Ingested::Inserted(id)),
            // Lost a race with another writer; the id is there either way.
            Err(err) if err.is_conflict() => Ok(Ingested::AlreadyPresent(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Subscribe, retrying while the broker is unreachable or the group is busy.
    ///
    /// `Ok(None)` means a stop was requested while waiting.
    pub async fn connect(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<Subscription>, ReplicationError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let last = match self.broker.subscribe(&self.topic).await {
                Ok(sub) => return Ok(Some(sub)),
                Err(err) => err,
            };

            if self.connect_attempts != 0 && attempt >= self.connect_attempts {
                return Err(ReplicationError::ConnectExhausted {
                    attempts: attempt,
                    last,
                });
            }
            info!(
                attempt,
                retry_in = ?self.connect_retry,
                error = %last,
                "broker not ready; retrying"
            );

            tokio::select! {
                biased;
                _ = stop_requested(stop) => return Ok(None),
                _ = tokio::time::sleep(self.connect_retry) => {}
            }
        }
    }

    /// Connect, then ingest messages until `stop` fires or a fatal error occurs.
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> Result<(), ReplicationError> {
        self.set_state(WorkerState::Connecting);

        let mut sub = match self.connect(&mut stop).await {
            Ok(Some(sub)) => sub,
            Ok(None) => return self.finish(None, Ok(())).await,
            Err(err) => {
                error!(error = %err, "replication consumer could not connect");
                return self.finish(None, Err(err)).await;
            }
        };

        self.set_state(WorkerState::Ticking);
        info!(topic = %self.topic, "replication consumer started");

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break Ok(()),
                next = sub.next() => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("subscription ended");
                    break Ok(());
                }
                Err(err) => break Err(ReplicationError::from(err)),
            };

            self.set_state(WorkerState::Inserting);
            let applied = match self.ingest(&message.payload).await {
                Ok(applied) => applied,
                Err(err) => break Err(err),
            };
            match applied {
                Ingested::Inserted(id) => info!(user_id = %id, "user id replicated"),
                Ingested::AlreadyPresent(id) => debug!(user_id = %id, "user id already replicated"),
            }
            if let Err(err) = sub.ack(&message).await {
                break Err(err.into());
            }
            self.set_state(WorkerState::Ticking);
        };

        if let Err(err) = &outcome {
            error!(error = %err, kind = %err.kind(), "replication consumer failed");
        }
        self.finish(Some(sub), outcome).await
    }

    async fn finish(
        self,
        sub: Option<Subscription>,
        outcome: Result<(), ReplicationError>,
    ) -> Result<(), ReplicationError> {
        self.set_state(WorkerState::Stopping);
        if let Some(sub) = sub {
            if let Err(err) = sub.close().await {
                warn!(error = %err, "broker reader close failed");
            }
        }
        if let Err(err) = self.replica.close().await {
            warn!(error = %err, "replica store close failed");
        }
        self.set_state(WorkerState::Closed);
        info!("replication consumer stopped");
        outcome
    }

    pub fn spawn(self) -> WorkerHandle
    where
        R: 'static,
        B: 'static,
    {
        let (shutdown, stop) = watch::channel(false);
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(stop));
        WorkerHandle::new(shutdown, state, join)
    }
}
