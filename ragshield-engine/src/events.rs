//! Event bus and durable event log
//!
//! Publishers enqueue; a single writer task appends JSON lines to
//! `events.jsonl` (flushed per record) and then fans each event out on a
//! broadcast channel. That single serialization point makes the durable
//! order, the fan-out order, and the `event_id` order identical.

use crate::error::{Error, Result};
use chrono::Utc;
use ragshield_common::events::{Event, EventCode, EventLevel};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Events queued ahead of the writer before publishers see backpressure
const QUEUE_CAPACITY: usize = 1024;

/// Per-subscriber broadcast buffer; a subscriber that falls this far behind
/// is disconnected rather than slowing the publisher
const FANOUT_CAPACITY: usize = 256;

enum WriterMessage {
    Append(Box<Event>),
    /// Ack once everything queued ahead of it is on disk
    Flush(tokio::sync::oneshot::Sender<()>),
}

struct PublishState {
    next_id: u64,
    tx: Option<mpsc::Sender<WriterMessage>>,
}

struct Inner {
    // One lock covers id assignment and enqueue, so event_id order always
    // matches queue (and therefore log) order
    publish: Mutex<PublishState>,
    fanout: broadcast::Sender<Event>,
    log_path: PathBuf,
    writer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the process-wide event bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Open the bus over `log_path`, resuming the event-id sequence from the
    /// existing log, and start the writer task.
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let next_id = last_event_id(&log_path)?.map_or(1, |id| id + 1);

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);

        let writer = tokio::spawn(writer_task(log_path.clone(), rx, fanout.clone()));

        info!(path = %log_path.display(), next_id, "event bus started");
        Ok(Self {
            inner: Arc::new(Inner {
                publish: Mutex::new(PublishState {
                    next_id,
                    tx: Some(tx),
                }),
                fanout,
                log_path,
                writer: tokio::sync::Mutex::new(Some(writer)),
            }),
        })
    }

    /// Publish an event: assign its id, enqueue for durable append, return.
    /// Never blocks on I/O.
    pub fn publish(
        &self,
        code: EventCode,
        level: EventLevel,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<u64> {
        let mut state = self
            .inner
            .publish
            .lock()
            .map_err(|_| Error::Internal("event bus lock poisoned".to_string()))?;

        let tx = state
            .tx
            .as_ref()
            .ok_or_else(|| Error::Internal("event bus closed".to_string()))?;

        let event = Event {
            event_id: state.next_id,
            code,
            level,
            category: code.category(),
            message: message.into(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.map(str::to_string),
            payload,
        };

        tx.try_send(WriterMessage::Append(Box::new(event)))
            .map_err(|e| Error::Internal(format!("event queue unavailable: {e}")))?;

        let id = state.next_id;
        state.next_id += 1;
        Ok(id)
    }

    /// Publish, absorbing failures with a warning. Event-sink trouble must
    /// never fail the query in flight.
    pub fn emit(
        &self,
        code: EventCode,
        level: EventLevel,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.publish(code, level, message, correlation_id, payload) {
            warn!(code = %code, error = %e, "event publish failed");
        }
    }

    /// Subscribe to live events (future events only; use [`recent`] for the
    /// historical tail). A receiver that lags is disconnected.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.fanout.subscribe()
    }

    /// Wait until everything published so far is durable. No-op once the
    /// bus is closed.
    pub async fn flush(&self) {
        let tx = match self.inner.publish.lock() {
            Ok(state) => state.tx.clone(),
            Err(_) => None,
        };
        let Some(tx) = tx else { return };
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        if tx.send(WriterMessage::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Last `limit` events from the durable log, newest first, from a
    /// point-in-time snapshot of the file taken after draining the queue.
    pub async fn recent(&self, limit: usize, level: Option<EventLevel>) -> Result<Vec<Event>> {
        self.flush().await;
        let contents = match tokio::fs::read_to_string(&self.inner.log_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in contents.lines().rev() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Event>(line) else {
                // Malformed lines are skipped, not fatal
                continue;
            };
            if let Some(wanted) = level {
                if event.level != wanted {
                    continue;
                }
            }
            events.push(event);
            if events.len() >= limit {
                break;
            }
        }
        Ok(events)
    }

    /// Truncate the durable log (demo reset). The id sequence keeps
    /// advancing; event ids stay unique for the process lifetime.
    pub async fn reset(&self) -> Result<()> {
        self.flush().await;
        tokio::fs::write(&self.inner.log_path, b"").await?;
        Ok(())
    }

    /// Stop accepting events, drain the queue to disk, and join the writer.
    /// Pending events are durable once this returns.
    pub async fn shutdown(&self) {
        if let Ok(mut state) = self.inner.publish.lock() {
            state.tx = None;
        }
        let handle = self.inner.writer.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "event writer task failed during shutdown");
            }
        }
    }
}

/// Serialized appender: one event at a time, flushed, then fanned out
async fn writer_task(
    log_path: PathBuf,
    mut rx: mpsc::Receiver<WriterMessage>,
    fanout: broadcast::Sender<Event>,
) {
    while let Some(message) = rx.recv().await {
        let event = match message {
            WriterMessage::Append(event) => *event,
            WriterMessage::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };
        match append_event(&log_path, &event).await {
            Ok(()) => {
                // No receivers is fine; send errors are not
                let _ = fanout.send(event);
            }
            Err(e) => {
                // The durable sink is unwritable: surface a CRITICAL copy of
                // the event through the in-memory fan-out and keep going
                error!(error = %e, code = %event.code, "event sink unwritable");
                let mut critical = event;
                critical.level = EventLevel::Critical;
                critical.message = format!("event sink unwritable: {e}; original: {}", critical.message);
                let _ = fanout.send(critical);
            }
        }
    }
}

async fn append_event(log_path: &Path, event: &Event) -> Result<()> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Resume point for the id sequence: highest event_id in the existing log
fn last_event_id(log_path: &Path) -> Result<Option<u64>> {
    let contents = match std::fs::read_to_string(log_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(contents
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Event>(line).ok())
        .map(|event| event.event_id)
        .next())
}
