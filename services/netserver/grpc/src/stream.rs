//! Frame and event log streams.
//!
//! Every gateway and device has a bounded log of recent items. Publishers
//! append to the log and fan the item out to live subscribers over a
//! broadcast channel. Streaming RPCs first replay the retained history and
//! then forward live items until the client goes away.
//!
//! A log is dropped from the hub once it has neither retained items nor
//! subscribers.

use crate::config::MonitoringConfig;
use crate::helpers::datetime_to_prost_timestamp;
use chrono::Utc;
use dashmap::DashMap;
use ns_api::api;
use ns_storage::Eui64;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, warn};

const BROADCAST_CAPACITY: usize = 256;
const STREAM_BUFFER: usize = 32;

/// Log a stream belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Frames received or sent by a gateway
    GatewayFrame,
    /// Frames of a device
    DeviceFrame,
    /// Events of a device
    DeviceEvent,
}

impl StreamKind {
    /// Key of the log for the given gateway id or DevEUI
    pub fn key(&self, id: &Eui64) -> String {
        match self {
            StreamKind::GatewayFrame => format!("gw:{{{}}}:stream:frame", id),
            StreamKind::DeviceFrame => format!("device:{{{}}}:stream:frame", id),
            StreamKind::DeviceEvent => format!("device:{{{}}}:stream:event", id),
        }
    }
}

struct LogStream {
    history: Mutex<VecDeque<api::LogItem>>,
    tx: broadcast::Sender<api::LogItem>,
}

impl LogStream {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            history: Mutex::new(VecDeque::new()),
            tx,
        }
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<api::LogItem>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_idle(&self) -> bool {
        self.tx.receiver_count() == 0 && self.history().is_empty()
    }
}

type StreamMap = DashMap<String, LogStream>;

/// Remove the log under `key` when nothing is retained or listening
fn release_idle(streams: &StreamMap, key: &str) {
    if streams.remove_if(key, |_, s| s.is_idle()).is_some() {
        debug!(key = %key, "Idle log stream released");
    }
}

/// In-process hub of all frame and event logs
pub struct LogStreams {
    streams: Arc<StreamMap>,
    frame_log_max_history: usize,
    event_log_max_history: usize,
    seq: AtomicU64,
}

impl LogStreams {
    /// Create an empty hub
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            frame_log_max_history: config.frame_log_max_history,
            event_log_max_history: config.event_log_max_history,
            seq: AtomicU64::new(0),
        }
    }

    fn max_history(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::GatewayFrame | StreamKind::DeviceFrame => self.frame_log_max_history,
            StreamKind::DeviceEvent => self.event_log_max_history,
        }
    }

    /// Append an item to a log and deliver it to the live subscribers.
    ///
    /// Returns the id of the new item.
    pub async fn publish(
        &self,
        kind: StreamKind,
        id: &Eui64,
        description: &str,
        body: &serde_json::Value,
        properties: HashMap<String, String>,
    ) -> String {
        let now = Utc::now();
        let item_id = format!(
            "{}-{}",
            now.timestamp_millis(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );
        let item = api::LogItem {
            id: item_id.clone(),
            time: Some(datetime_to_prost_timestamp(&now)),
            description: description.to_string(),
            body: body.to_string(),
            properties,
        };

        let key = kind.key(id);
        let max_history = self.max_history(kind);
        let receivers = {
            // The entry guard orders history and live delivery against
            // concurrent subscribers and releases.
            let stream = self
                .streams
                .entry(key.clone())
                .or_insert_with(LogStream::new);
            let mut history = stream.history();
            history.push_back(item.clone());
            while history.len() > max_history {
                history.pop_front();
            }
            stream.tx.send(item).unwrap_or(0)
        };
        release_idle(&self.streams, &key);

        debug!(key = %key, item_id = %item_id, receivers, "Log item published");
        item_id
    }

    /// Retained history plus a receiver for items published afterwards
    pub async fn subscribe(
        &self,
        kind: StreamKind,
        id: &Eui64,
    ) -> (Vec<api::LogItem>, broadcast::Receiver<api::LogItem>) {
        let stream = self
            .streams
            .entry(kind.key(id))
            .or_insert_with(LogStream::new);
        let history = stream.history().iter().cloned().collect();
        (history, stream.tx.subscribe())
    }

    /// Number of live subscribers of a log
    pub fn subscriber_count(&self, kind: StreamKind, id: &Eui64) -> usize {
        self.streams
            .get(&kind.key(id))
            .map(|s| s.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Server stream replaying the history of a log followed by live items.
    ///
    /// The forwarding task ends when the client drops the stream.
    pub async fn stream_items(
        &self,
        kind: StreamKind,
        id: &Eui64,
    ) -> ReceiverStream<Result<api::LogItem, Status>> {
        let key = kind.key(id);
        let streams = self.streams.clone();
        let (history, rx) = self.subscribe(kind, id).await;
        let (tx, out) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            forward(history, rx, tx, &key).await;
            release_idle(&streams, &key);
        });

        ReceiverStream::new(out)
    }
}

/// Send the replayed history, then live items, until the client goes away
async fn forward(
    history: Vec<api::LogItem>,
    mut rx: broadcast::Receiver<api::LogItem>,
    tx: mpsc::Sender<Result<api::LogItem, Status>>,
    key: &str,
) {
    for item in history {
        if tx.send(Ok(item)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(key = %key, "Log stream client disconnected");
                return;
            }
            res = rx.recv() => match res {
                Ok(item) => {
                    if tx.send(Ok(item)).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(key = %key, skipped, "Log stream subscriber lagged, items dropped");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}
