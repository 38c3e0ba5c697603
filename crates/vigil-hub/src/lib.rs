use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default number of recent lines retained per session for late subscribers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

// Subscriber channels get headroom beyond a full replay so a live tail does
// not immediately hit the drop path.
const SUBSCRIBER_HEADROOM: usize = 64;

struct Subscriber {
    id: u64,
    tx: SyncSender<String>,
}

struct SessionChannel {
    buffer: VecDeque<String>,
    subscribers: Vec<Subscriber>,
    done: bool,
    next_subscriber_id: u64,
}

impl SessionChannel {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            subscribers: Vec::new(),
            done: false,
            next_subscriber_id: 0,
        }
    }
}

struct HubInner {
    sessions: Mutex<HashMap<i64, SessionChannel>>,
    capacity: usize,
}

/// Multiplexes live session output to any number of subscribers.
///
/// Each session owns a bounded ring buffer of recent lines; a late
/// subscriber first receives the buffered history in order, then the live
/// tail. Publishing never blocks: a subscriber that cannot keep up loses
/// lines rather than stalling the stream pump.
///
/// `Hub` is a cheap handle; clones share the same state.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

/// A live handle onto one session's line stream.
///
/// Dropping the subscription detaches it from the hub.
pub struct Subscription {
    rx: Receiver<String>,
    hub: Hub,
    session_id: i64,
    subscriber_id: u64,
}

impl Subscription {
    pub fn recv(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.rx.iter()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.session_id, self.subscriber_id);
    }
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: Mutex::new(HashMap::new()),
                capacity,
            }),
        }
    }

    /// Register a session before its first line is published.
    pub fn open(&self, session_id: i64) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let capacity = self.inner.capacity;
        sessions
            .entry(session_id)
            .or_insert_with(|| SessionChannel::new(capacity));
    }

    /// Append a line to the session buffer and fan it out to subscribers.
    ///
    /// No-op for unknown or already-closed sessions. Slow subscribers drop
    /// the line instead of blocking the publisher.
    pub fn publish(&self, session_id: i64, line: &str) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let Some(channel) = sessions.get_mut(&session_id) else {
            return;
        };
        if channel.done {
            return;
        }

        if channel.buffer.len() == self.inner.capacity {
            channel.buffer.pop_front();
        }
        channel.buffer.push_back(line.to_string());

        for subscriber in &channel.subscribers {
            match subscriber.tx.try_send(line.to_string()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(
                        session_id,
                        subscriber = subscriber.id,
                        "dropping line for slow subscriber"
                    );
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// Attach to a session: replay buffered history, then tail live output.
    ///
    /// On a session that has already closed, the returned subscription
    /// yields the history and then ends. Unknown sessions return `None`.
    pub fn subscribe(&self, session_id: i64) -> Option<Subscription> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let channel = sessions.get_mut(&session_id)?;

        let (tx, rx) = sync_channel(self.inner.capacity + SUBSCRIBER_HEADROOM);
        for line in &channel.buffer {
            // Capacity exceeds the buffer, so replay cannot fill the channel.
            let _ = tx.try_send(line.clone());
        }

        let subscriber_id = channel.next_subscriber_id;
        channel.next_subscriber_id += 1;

        if !channel.done {
            channel.subscribers.push(Subscriber {
                id: subscriber_id,
                tx,
            });
        }
        // For a done session the sender is dropped here, closing the channel
        // right after the replay.

        Some(Subscription {
            rx,
            hub: self.clone(),
            session_id,
            subscriber_id,
        })
    }

    fn unsubscribe(&self, session_id: i64, subscriber_id: u64) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(channel) = sessions.get_mut(&session_id) {
            channel.subscribers.retain(|s| s.id != subscriber_id);
        }
    }

    /// Mark the session finished: subscribers see end-of-stream after any
    /// lines still in flight, and further publishes are ignored. History
    /// stays available to new subscribers until `remove`.
    pub fn close(&self, session_id: i64) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(channel) = sessions.get_mut(&session_id) {
            channel.done = true;
            channel.subscribers.clear();
        }
    }

    /// Drop the session entirely, freeing its buffer. No-op if unknown.
    pub fn remove(&self, session_id: i64) {
        let mut sessions = self.inner.sessions.lock().unwrap();
        if let Some(mut channel) = sessions.remove(&session_id) {
            channel.subscribers.clear();
        }
    }

    pub fn is_active(&self, session_id: i64) -> bool {
        let sessions = self.inner.sessions.lock().unwrap();
        sessions
            .get(&session_id)
            .map(|channel| !channel.done)
            .unwrap_or(false)
    }
}
