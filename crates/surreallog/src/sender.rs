use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use surreal_rpc::{Datetime, RpcError, SurrealClient};
use tokio::{sync::Mutex, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use workflow_commands::{Event, Properties};

/// Wire form of one event as stored in the run table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub kind: i8,
    pub time: Datetime,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<Properties>,
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            kind: event.kind.code(),
            time: Datetime(event.timestamp),
            text: event.text,
            data: event.data,
            opts: event.properties,
        }
    }
}

/// Destination for flushed batches.
pub trait BatchSink: Send + Sync + 'static {
    type Error: Display + Send;

    fn submit(
        &self,
        batch: &[EventRecord],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// When buffered events are flushed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FlushPolicy {
    /// Flush after this long without a new event.
    pub idle: Duration,
    /// Flush as soon as the buffered events' sizes add up to this many bytes.
    pub max_buffer_bytes: u64,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(2),
            max_buffer_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct BufferStats {
    pub records: usize,
    pub bytes: u64,
}

#[derive(Default)]
struct Buffer {
    records: Vec<EventRecord>,
    bytes: u64,
    idle: Option<CancellationToken>,
}

struct Shared<S> {
    sink: S,
    policy: FlushPolicy,
    buffer: Mutex<Buffer>,
}

impl<S: BatchSink> Shared<S> {
    /// Submits and clears the buffer. The buffer is cleared whether or not
    /// the submission succeeds; nothing is retried.
    async fn flush_locked(&self, buffer: &mut Buffer) {
        if let Some(idle) = buffer.idle.take() {
            idle.cancel();
        }
        if buffer.records.is_empty() {
            return;
        }

        let count = buffer.records.len();
        let bytes = buffer.bytes;
        match self.sink.submit(&buffer.records).await {
            Ok(()) => debug!(count, bytes, "flushed batch"),
            Err(err) => warn!(count, bytes, "failed to flush batch: {err}"),
        }
        buffer.records.clear();
        buffer.bytes = 0;
    }
}

/// Accumulates events and hands them to a [`BatchSink`] in batches.
///
/// A batch goes out when the buffered sizes reach
/// [`FlushPolicy::max_buffer_bytes`], when no event has arrived for
/// [`FlushPolicy::idle`], or on an explicit [`flush`](Self::flush). Every
/// path takes the same buffer lock for the whole append-or-flush.
pub struct BatchingSender<S> {
    shared: Arc<Shared<S>>,
}

impl<S: BatchSink> BatchingSender<S> {
    pub fn new(sink: S, policy: FlushPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                policy,
                buffer: Mutex::new(Buffer::default()),
            }),
        }
    }

    pub fn sink(&self) -> &S {
        &self.shared.sink
    }

    pub fn policy(&self) -> FlushPolicy {
        self.shared.policy
    }

    pub async fn write(&self, event: Event) {
        let mut buffer = self.shared.buffer.lock().await;
        buffer.bytes = buffer.bytes.saturating_add(event.size as u64);
        buffer.records.push(EventRecord::from(event));

        if let Some(previous) = buffer.idle.replace(self.arm_idle_timer()) {
            previous.cancel();
        }

        if buffer.bytes >= self.shared.policy.max_buffer_bytes {
            self.shared.flush_locked(&mut buffer).await;
        }
    }

    pub async fn flush(&self) {
        let mut buffer = self.shared.buffer.lock().await;
        self.shared.flush_locked(&mut buffer).await;
    }

    pub async fn stats(&self) -> BufferStats {
        let buffer = self.shared.buffer.lock().await;
        BufferStats {
            records: buffer.records.len(),
            bytes: buffer.bytes,
        }
    }

    fn arm_idle_timer(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = time::sleep(shared.policy.idle) => {
                    let mut buffer = shared.buffer.lock().await;
                    // A write may have re-armed the timer while we waited for the lock.
                    if !cancelled.is_cancelled() {
                        shared.flush_locked(&mut buffer).await;
                    }
                }
            }
        });
        token
    }
}

/// Inserts batches into the run's table.
pub struct SurrealSink {
    client: Arc<SurrealClient>,
    statement: String,
}

impl SurrealSink {
    pub fn new(client: Arc<SurrealClient>, statement: String) -> Self {
        Self { client, statement }
    }
}

#[derive(Serialize)]
struct InsertVars<'a> {
    data: &'a [EventRecord],
}

impl BatchSink for SurrealSink {
    type Error = RpcError;

    fn submit(
        &self,
        batch: &[EventRecord],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            self.client
                .query(&self.statement, InsertVars { data: batch })
                .await?
                .ensure_ok()
        }
    }
}
