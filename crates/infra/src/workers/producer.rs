//! Replication producer: credential store ids -> broker topic.
//!
//! Each tick lists every user id and publishes the ones this process has not
//! published yet. The [`PublishedIdSet`] is owned by the producer and lives
//! only as long as the process; after a restart every id is published again
//! and the consumer absorbs the duplicates.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use userlink_auth::CredentialStore;
use userlink_core::{StoreError, UserId};
use userlink_events::{Broker, encode_user_id};

use super::{ReplicationError, WorkerHandle, WorkerState, stop_requested};

/// Ids already handed to the broker by this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedIdSet {
    ids: BTreeSet<UserId>,
}

impl PublishedIdSet {
    pub fn contains(&self, id: UserId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn mark(&mut self, id: UserId) {
        self.ids.insert(id);
    }
}

/// Outcome of one producer tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub listed: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct ReplicationProducer<S, B> {
    store: S,
    broker: B,
    topic: String,
    tick: Duration,
    published: PublishedIdSet,
    state: watch::Sender<WorkerState>,
}

impl<S, B> ReplicationProducer<S, B>
where
    S: CredentialStore,
    B: Broker,
{
    pub fn new(store: S, broker: B, topic: impl Into<String>, tick: Duration) -> Self {
        let (state, _) = watch::channel(WorkerState::Connecting);
        Self {
            store,
            broker,
            topic: topic.into(),
            tick,
            published: PublishedIdSet::default(),
            state,
        }
    }

    pub fn published(&self) -> &PublishedIdSet {
        &self.published
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Poll the store once and publish every id not yet published.
    ///
    /// A listing failure aborts the tick. A publish failure leaves that id
    /// unmarked so the next tick retries it.
    pub async fn tick(&mut self) -> Result<TickReport, StoreError> {
        let mut ids = self.store.list_all_user_ids().await?;
        ids.sort_unstable();

        let mut report = TickReport {
            listed: ids.len(),
            ..TickReport::default()
        };

        for id in ids {
            if self.published.contains(id) {
                continue;
            }
            match self
                .broker
                .publish(&self.topic, encode_user_id(id).to_vec())
                .await
            {
                Ok(()) => {
                    self.published.mark(id);
                    report.published += 1;
                    debug!(user_id = %id, topic = %self.topic, "user id published");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(user_id = %id, error = %err, "publish failed; will retry next tick");
                }
            }
        }

        Ok(report)
    }

    /// Run until `stop` fires, then flush the broker writer and close the store.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), ReplicationError> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.set_state(WorkerState::Ticking);
        info!(topic = %self.topic, tick = ?self.tick, "replication producer started");

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break,
                _ = ticker.tick() => {
                    self.set_state(WorkerState::Publishing);
                    match self.tick().await {
                        Ok(report) if report.published > 0 || report.failed > 0 => {
                            info!(
                                listed = report.listed,
                                published = report.published,
                                failed = report.failed,
                                "producer tick"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "listing user ids failed; skipping tick"),
                    }
                    self.set_state(WorkerState::Ticking);
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        if let Err(err) = self.broker.close().await {
            warn!(error = %err, "broker writer close failed");
        }
        if let Err(err) = self.store.close().await {
            warn!(error = %err, "credential store close failed");
        }
        self.set_state(WorkerState::Closed);
        info!(published = self.published.len(), "replication producer stopped");
        Ok(())
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> WorkerHandle
    where
        S: 'static,
        B: 'static,
    {
        let (shutdown, stop) = watch::channel(false);
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(stop));
        WorkerHandle::new(shutdown, state, join)
    }
}
