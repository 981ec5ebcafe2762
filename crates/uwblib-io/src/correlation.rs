//! Latest-reply-per-key cache used to match commands to their replies.
//!
//! The reader loop is the only writer. Every insert overwrites the previous
//! frame for the key and bumps a per-key arrival counter. A caller captures
//! the counter with [`CorrelationStore::sequence`] before writing its
//! command, then waits for an arrival with a strictly greater counter, so a
//! reply left over from an earlier call is never mistaken for a fresh one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use uwblib_core::{Error, Result};
use uwblib_protocol::{Frame, MessageKey};

#[derive(Debug)]
struct Entry {
    frame: Frame,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<MessageKey, Entry>,
    closed: bool,
}

/// Concurrency-safe map from message key to the most recent frame.
#[derive(Debug)]
pub struct CorrelationStore {
    inner: Mutex<Inner>,
    /// Bumped on every insert and on close to wake waiters.
    arrivals: watch::Sender<u64>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        CorrelationStore {
            inner: Mutex::new(Inner::default()),
            arrivals: watch::Sender::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame` as the latest for its key and return its arrival counter.
    pub fn insert(&self, frame: Frame) -> u64 {
        let seq = {
            let mut inner = self.lock();
            let seq = inner.entries.get(&frame.key).map_or(0, |e| e.seq) + 1;
            inner.entries.insert(frame.key, Entry { frame, seq });
            seq
        };
        self.arrivals.send_modify(|n| *n += 1);
        seq
    }

    /// Current arrival counter for `key`; `0` if nothing has arrived yet.
    pub fn sequence(&self, key: MessageKey) -> u64 {
        self.lock().entries.get(&key).map_or(0, |e| e.seq)
    }

    /// The latest frame for `key` with its arrival counter.
    pub fn latest(&self, key: MessageKey) -> Option<(u64, Frame)> {
        self.lock()
            .entries
            .get(&key)
            .map(|e| (e.seq, e.frame.clone()))
    }

    /// The latest frame for `key` if it arrived after `baseline`.
    pub fn newer_than(&self, key: MessageKey, baseline: u64) -> Option<Frame> {
        self.lock()
            .entries
            .get(&key)
            .filter(|e| e.seq > baseline)
            .map(|e| e.frame.clone())
    }

    /// Wait until a frame for `key` with a counter above `baseline` arrives.
    ///
    /// Fails with [`Error::Closed`] once the store is closed and no such
    /// frame is present. Callers bound the wait with their own timeout.
    pub async fn wait_newer(&self, key: MessageKey, baseline: u64) -> Result<Frame> {
        let mut arrivals = self.arrivals.subscribe();
        loop {
            {
                let inner = self.lock();
                if let Some(entry) = inner.entries.get(&key) {
                    if entry.seq > baseline {
                        return Ok(entry.frame.clone());
                    }
                }
                if inner.closed {
                    return Err(Error::Closed);
                }
            }
            if arrivals.changed().await.is_err() {
                return Err(Error::Closed);
            }
        }
    }

    /// Mark the store closed and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.arrivals.send_modify(|n| *n += 1);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use uwblib_protocol::FieldValue;

    fn r01(id: i64) -> Frame {
        Frame::new(MessageKey::response(1), vec![FieldValue::Int(id)])
    }

    #[test]
    fn insert_bumps_per_key_counter() {
        let store = CorrelationStore::new();
        assert_eq!(store.sequence(MessageKey::response(1)), 0);

        assert_eq!(store.insert(r01(1)), 1);
        assert_eq!(store.insert(r01(2)), 2);
        assert_eq!(
            store.insert(Frame::new(MessageKey::response(5), vec![])),
            1
        );

        let (seq, frame) = store.latest(MessageKey::response(1)).unwrap();
        assert_eq!(seq, 2);
        assert_eq!(frame, r01(2));
    }

    #[test]
    fn newer_than_ignores_stale_entry() {
        let store = CorrelationStore::new();
        store.insert(r01(1));
        let baseline = store.sequence(MessageKey::response(1));

        assert!(store.newer_than(MessageKey::response(1), baseline).is_none());
        store.insert(r01(2));
        assert_eq!(
            store.newer_than(MessageKey::response(1), baseline),
            Some(r01(2))
        );
    }

    #[tokio::test]
    async fn wait_newer_wakes_on_insert() {
        let store = Arc::new(CorrelationStore::new());
        store.insert(r01(1));
        let baseline = store.sequence(MessageKey::response(1));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.insert(Frame::new(MessageKey::response(5), vec![]));
                store.insert(r01(7));
            })
        };

        let frame = tokio::time::timeout(
            Duration::from_secs(2),
            store.wait_newer(MessageKey::response(1), baseline),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(frame, r01(7));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn wait_newer_returns_immediately_when_already_fresh() {
        let store = CorrelationStore::new();
        store.insert(r01(3));
        let frame = store.wait_newer(MessageKey::response(1), 0).await.unwrap();
        assert_eq!(frame, r01(3));
    }

    #[tokio::test]
    async fn close_fails_pending_waiters() {
        let store = Arc::new(CorrelationStore::new());

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_newer(MessageKey::response(1), 0).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Closed)));
        assert!(store.is_closed());
    }
}
