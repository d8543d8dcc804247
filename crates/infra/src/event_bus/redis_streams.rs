//! Redis Streams-backed broker (durable, at-least-once delivery).
//!
//! - **Topic**: one Redis stream key per topic
//! - **Payload**: the raw message bytes under the single field `value`
//! - **Connections**: [`ConnectionManager`], which reconnects after a drop
//! - **Publish**: `publish` enqueues onto a bounded channel drained by a
//!   writer task that issues `XADD`. A transient failure is retried once on
//!   the reconnected link; a failure after that is logged, the message is
//!   lost, and the broker turns degraded. While degraded, `publish` writes
//!   directly and returns the error, so callers see the outage. `close`
//!   drains the queue before returning.
//! - **Subscribe**: consumer group (`XGROUP CREATE ... MKSTREAM`), read with
//!   `XREADGROUP`, `XACK` after the consumer has applied the message. Entries
//!   left pending by a previous run of the same consumer name are redelivered
//!   first; entries pending under another consumer name for longer than
//!   `claim_idle` are taken over with `XPENDING` + `XCLAIM` (Redis 6.2+).
//!   Entries still buffered at `close` stay pending and come back on restart.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamClaimReply, StreamId, StreamReadReply};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use userlink_events::{Broker, BrokerError, Message, MessageSource, Subscription};

const PAYLOAD_FIELD: &str = "value";
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_READ_COUNT: usize = 16;
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);

/// One row of the extended `XPENDING` reply: id, owner, idle ms, deliveries.
type PendingEntry = (String, String, u64, u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisStreamsOptions {
    pub group: String,
    pub consumer: String,
    /// `XREADGROUP BLOCK` duration.
    pub block: Duration,
    pub queue_capacity: usize,
    pub read_count: usize,
    /// Minimum idle time before another consumer's pending entry is claimed.
    pub claim_idle: Duration,
}

impl RedisStreamsOptions {
    pub fn new(group: impl Into<String>, consumer: impl Into<String>, block: Duration) -> Self {
        Self {
            group: group.into(),
            consumer: consumer.into(),
            block,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_count: DEFAULT_READ_COUNT,
            claim_idle: DEFAULT_CLAIM_IDLE,
        }
    }

    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }
}

struct Writer {
    tx: mpsc::Sender<(String, Vec<u8>)>,
    join: JoinHandle<()>,
    conn: ConnectionManager,
}

enum WriterSlot {
    Idle,
    Running(Writer),
    Closed,
}

pub struct RedisStreamsBroker {
    client: Arc<redis::Client>,
    options: RedisStreamsOptions,
    writer: Mutex<WriterSlot>,
    /// Set by the writer after an `XADD` it could not recover.
    degraded: Arc<AtomicBool>,
}

impl RedisStreamsBroker {
    /// No I/O happens here; connections are opened on first publish/subscribe.
    pub fn new(redis_url: impl AsRef<str>, options: RedisStreamsOptions) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            options,
            writer: Mutex::new(WriterSlot::Idle),
            degraded: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, BrokerError> {
        self.client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Ensure the consumer group exists (idempotent).
    async fn ensure_consumer_group(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
    ) -> Result<(), BrokerError> {
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.options.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(conn)
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(BrokerError::ConsumerGroup(e.to_string())),
        }
    }

    fn spawn_writer(&self, conn: ConnectionManager) -> Writer {
        let (tx, rx) = mpsc::channel(self.options.queue_capacity.max(1));
        let join = tokio::spawn(writer_loop(conn.clone(), rx, self.degraded.clone()));
        Writer { tx, join, conn }
    }
}

impl core::fmt::Debug for RedisStreamsBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStreamsBroker")
            .field("options", &self.options)
            .field("degraded", &self.degraded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn xadd(conn: &mut ConnectionManager, stream: &str, payload: &[u8]) -> redis::RedisResult<String> {
    redis::cmd("XADD")
        .arg(stream)
        .arg("*")
        .arg(PAYLOAD_FIELD)
        .arg(payload)
        .query_async(conn)
        .await
}

/// Failures a reconnect can cure. Server replies such as `WRONGTYPE` are not.
fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

async fn writer_loop(
    mut conn: ConnectionManager,
    mut rx: mpsc::Receiver<(String, Vec<u8>)>,
    degraded: Arc<AtomicBool>,
) {
    let mut written: u64 = 0;
    let mut dropped: u64 = 0;
    while let Some((stream, payload)) = rx.recv().await {
        let added = match xadd(&mut conn, &stream, &payload).await {
            Err(e) if is_transient(&e) => {
                debug!(stream = %stream, error = %e, "XADD failed; retrying once");
                xadd(&mut conn, &stream, &payload).await
            }
            other => other,
        };

        match added {
            Ok(id) => {
                written += 1;
                if degraded.swap(false, Ordering::AcqRel) {
                    info!(stream = %stream, "broker writer recovered");
                }
                debug!(stream = %stream, message_id = %id, "XADD");
            }
            Err(e) => {
                dropped += 1;
                degraded.store(true, Ordering::Release);
                warn!(stream = %stream, error = %e, "XADD failed; message dropped");
            }
        }
    }
    info!(written, dropped, "broker writer drained");
}

#[async_trait]
impl Broker for RedisStreamsBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let (tx, mut conn) = {
            let mut slot = self.writer.lock().await;
            match &*slot {
                WriterSlot::Running(writer) => (writer.tx.clone(), writer.conn.clone()),
                WriterSlot::Closed => return Err(BrokerError::Closed),
                WriterSlot::Idle => {
                    let conn = self.connection().await?;
                    let writer = self.spawn_writer(conn);
                    let handles = (writer.tx.clone(), writer.conn.clone());
                    *slot = WriterSlot::Running(writer);
                    handles
                }
            }
        };

        if self.degraded.load(Ordering::Acquire) {
            let id = xadd(&mut conn, topic, &payload)
                .await
                .map_err(|e| BrokerError::Command(format!("XADD failed: {e}")))?;
            self.degraded.store(false, Ordering::Release);
            info!(stream = %topic, message_id = %id, "broker publish recovered");
            return Ok(());
        }

        tx.send((topic.to_string(), payload))
            .await
            .map_err(|_| BrokerError::Closed)
    }

    #[instrument(skip(self), fields(group = %self.options.group, consumer = %self.options.consumer), err)]
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        let mut conn = self.connection().await?;
        self.ensure_consumer_group(&mut conn, topic).await?;

        let source = RedisStreamSource {
            conn,
            stream: topic.to_string(),
            group: self.options.group.clone(),
            consumer: self.options.consumer.clone(),
            block_ms: self.options.block.as_millis() as u64,
            claim_idle_ms: self.options.claim_idle.as_millis() as u64,
            read_count: self.options.read_count,
            buffered: VecDeque::new(),
            backlog_done: false,
        };
        Ok(Subscription::new(topic, Box::new(source)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let previous = std::mem::replace(&mut *self.writer.lock().await, WriterSlot::Closed);
        if let WriterSlot::Running(Writer { tx, join, .. }) = previous {
            drop(tx);
            join.await
                .map_err(|e| BrokerError::Command(format!("writer task failed: {e}")))?;
        }
        Ok(())
    }
}

struct RedisStreamSource {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    block_ms: u64,
    claim_idle_ms: u64,
    read_count: usize,
    buffered: VecDeque<Message>,
    /// Set once this consumer's pending entries have been re-read.
    backlog_done: bool,
}

impl RedisStreamSource {
    /// Own backlog first, then abandoned entries, then new ones.
    async fn read_batch(&mut self) -> Result<Vec<Message>, BrokerError> {
        if !self.backlog_done {
            let own = self.read_group("0", None).await?;
            if !own.is_empty() {
                return Ok(own);
            }
            self.backlog_done = true;
        }

        let claimed = self.claim_abandoned().await?;
        if !claimed.is_empty() {
            return Ok(claimed);
        }

        self.read_group(">", Some(self.block_ms)).await
    }

    async fn read_group(&mut self, from: &str, block_ms: Option<u64>) -> Result<Vec<Message>, BrokerError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.read_count);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(from);

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(|e| BrokerError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply.map(messages_from_reply).unwrap_or_default())
    }

    async fn claim_abandoned(&mut self) -> Result<Vec<Message>, BrokerError> {
        let pending: Vec<PendingEntry> = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("IDLE")
            .arg(self.claim_idle_ms)
            .arg("-")
            .arg("+")
            .arg(self.read_count)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| BrokerError::Command(format!("XPENDING failed: {e}")))?;

        let ids = claimable_ids(&pending, &self.consumer, self.claim_idle_ms);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let reply: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle_ms)
            .arg(&ids[..])
            .query_async(&mut self.conn)
            .await
            .map_err(|e| BrokerError::Command(format!("XCLAIM failed: {e}")))?;

        let messages = messages_from_entries(reply.ids);
        if !messages.is_empty() {
            info!(stream = %self.stream, claimed = messages.len(), "claimed idle entries from other consumers");
        }
        Ok(messages)
    }
}

/// Ids pending under some other consumer for at least `min_idle_ms`.
fn claimable_ids(pending: &[PendingEntry], me: &str, min_idle_ms: u64) -> Vec<String> {
    pending
        .iter()
        .filter(|(_, owner, idle_ms, _)| owner != me && *idle_ms >= min_idle_ms)
        .map(|(id, ..)| id.clone())
        .collect()
}

fn messages_from_reply(reply: StreamReadReply) -> Vec<Message> {
    messages_from_entries(reply.keys.into_iter().flat_map(|key| key.ids).collect())
}

/// An entry without a readable `value` field yields an empty payload, which
/// the consumer rejects as malformed.
fn messages_from_entries(entries: Vec<StreamId>) -> Vec<Message> {
    entries
        .into_iter()
        .map(|entry| {
            let payload = entry
                .map
                .get(PAYLOAD_FIELD)
                .and_then(|v| redis::from_redis_value::<Vec<u8>>(v).ok())
                .unwrap_or_default();
            Message {
                id: entry.id,
                payload,
            }
        })
        .collect()
}

#[async_trait]
impl MessageSource for RedisStreamSource {
    async fn next(&mut self) -> Result<Option<Message>, BrokerError> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                return Ok(Some(message));
            }
            let batch = self.read_batch().await?;
            self.buffered.extend(batch);
        }
    }

    async fn ack(&mut self, message: &Message) -> Result<(), BrokerError> {
        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&message.id)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| BrokerError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.buffered.is_empty() {
            debug!(stream = %self.stream, left = self.buffered.len(), "unacked entries stay pending");
        }
        self.buffered.clear();
        Ok(())
    }
}
