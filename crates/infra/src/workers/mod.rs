//! Replication workers.
//!
//! Both loops share one lifecycle:
//!
//! ```text
//! Connecting -> Ticking <-> (Publishing | Inserting) -> Stopping -> Closed
//! ```
//!
//! The stop signal is observed only while a loop is waiting (on its tick or on
//! a broker read). A publish or insert that has started always completes
//! before the loop exits.

pub mod consumer;
pub mod producer;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use userlink_core::{Error, ErrorKind, StoreError};
use userlink_events::{BrokerError, DecodeError};

pub use consumer::{Ingested, ReplicationConsumer};
pub use producer::{PublishedIdSet, ReplicationProducer, TickReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    Ticking,
    Publishing,
    Inserting,
    Stopping,
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    #[error(transparent)]
    Malformed(#[from] DecodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("broker unreachable after {attempts} attempts: {last}")]
    ConnectExhausted { attempts: u32, last: BrokerError },

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ReplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplicationError::Malformed(_) => ErrorKind::Malformed,
            ReplicationError::Store(e) => Error::from(e.clone()).kind(),
            _ => ErrorKind::Internal,
        }
    }
}

impl From<ReplicationError> for Error {
    fn from(value: ReplicationError) -> Self {
        match value {
            ReplicationError::Malformed(e) => e.into(),
            ReplicationError::Store(e) => e.into(),
            other => Error::internal(other.to_string()),
        }
    }
}

/// Stop signal: resolves once a stop is requested or the sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Handle to control and join a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WorkerState>,
    join: Option<JoinHandle<Result<(), ReplicationError>>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        shutdown: watch::Sender<bool>,
        state: watch::Receiver<WorkerState>,
        join: JoinHandle<Result<(), ReplicationError>>,
    ) -> Self {
        Self {
            shutdown,
            state,
            join: Some(join),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Returns the worker's own result, so a fatal error that ended the loop
    /// before the stop request is reported here.
    pub async fn shutdown(mut self) -> Result<(), ReplicationError> {
        let _ = self.shutdown.send(true);
        match self.join.take() {
            Some(join) => join
                .await
                .map_err(|e| ReplicationError::Worker(e.to_string()))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_follow_the_taxonomy() {
        let malformed = ReplicationError::from(DecodeError::TooShort { len: 3 });
        assert_eq!(malformed.kind(), ErrorKind::Malformed);
        assert_eq!(Error::from(malformed).kind(), ErrorKind::Malformed);

        let store = ReplicationError::from(StoreError::backend("down"));
        assert_eq!(store.kind(), ErrorKind::Internal);

        let broker = ReplicationError::from(BrokerError::Closed);
        assert_eq!(broker.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_stop() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), stop_requested(&mut rx))
            .await
            .unwrap();
    }
}
