//! Callback registry for unsolicited and reply messages.
//!
//! Maps a [`MessageKey`] to the ordered list of handlers registered for it.
//! Registration and deregistration happen on the caller's side while the
//! dispatcher reads; the dispatcher takes a [`snapshot`](CallbackRegistry::snapshot)
//! per item so a concurrent change never yields a half-updated list.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use uwblib_core::Result;
use uwblib_protocol::{FieldValue, MessageKey};

/// A handler invoked by the dispatcher with the decoded fields of a frame
/// and the extra arguments bound at registration time.
///
/// Handlers run on the dispatcher's own thread and may block. A returned
/// error or a panic is logged and does not affect other handlers.
pub trait Callback: Send + Sync + 'static {
    fn call(&self, fields: &[FieldValue], extra: &[FieldValue]) -> Result<()>;
}

impl<F> Callback for F
where
    F: Fn(&[FieldValue], &[FieldValue]) -> Result<()> + Send + Sync + 'static,
{
    fn call(&self, fields: &[FieldValue], extra: &[FieldValue]) -> Result<()> {
        self(fields, extra)
    }
}

/// Identifies one registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    key: MessageKey,
    id: u64,
}

impl RegistrationHandle {
    /// The message key this registration listens on.
    pub fn key(&self) -> MessageKey {
        self.key
    }
}

/// One registered handler with its bound arguments.
#[derive(Clone)]
pub struct Registration {
    id: u64,
    handler: Arc<dyn Callback>,
    extra: Arc<[FieldValue]>,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invoke the handler with `fields` and the bound extra arguments.
    pub fn invoke(&self, fields: &[FieldValue]) -> Result<()> {
        self.handler.call(fields, &self.extra)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("extra", &self.extra)
            .finish_non_exhaustive()
    }
}

/// Thread-safe mapping from message key to handlers in registration order.
#[derive(Debug)]
pub struct CallbackRegistry {
    /// IDs start at 1.
    next_id: AtomicU64,
    handlers: RwLock<HashMap<MessageKey, Vec<Registration>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        CallbackRegistry {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append `handler` to the list for `key`.
    pub fn register(
        &self,
        key: MessageKey,
        handler: Arc<dyn Callback>,
        extra: Vec<FieldValue>,
    ) -> RegistrationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            id,
            handler,
            extra: extra.into(),
        };
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(registration);
        RegistrationHandle { key, id }
    }

    /// Remove a registration. Returns `false` if it was already removed.
    pub fn deregister(&self, handle: RegistrationHandle) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&handle.key) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&handle.key);
        }
        removed
    }

    /// Copy of the handlers currently registered for `key`.
    pub fn snapshot(&self, key: MessageKey) -> Vec<Registration> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for `key`.
    pub fn count(&self, key: MessageKey) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map_or(0, Vec::len)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn Callback> {
        let log = log.clone();
        Arc::new(move |fields: &[FieldValue], extra: &[FieldValue]| -> Result<()> {
            log.lock()
                .unwrap()
                .push(format!("{tag}:{}:{}", fields.len(), extra.len()));
            Ok(())
        })
    }

    #[test]
    fn handlers_keep_registration_order() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = MessageKey::spontaneous(1);

        registry.register(key, recorder(&log, "a"), vec![]);
        registry.register(key, recorder(&log, "b"), vec![FieldValue::Int(9)]);

        for reg in registry.snapshot(key) {
            reg.invoke(&[FieldValue::Int(1), FieldValue::Float(0.5)])
                .unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["a:2:0", "b:2:1"]);
    }

    #[test]
    fn deregister_removes_only_that_handler() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = MessageKey::spontaneous(3);

        let first = registry.register(key, recorder(&log, "a"), vec![]);
        registry.register(key, recorder(&log, "b"), vec![]);
        assert_eq!(registry.count(key), 2);

        assert!(registry.deregister(first));
        assert!(!registry.deregister(first));
        assert_eq!(registry.count(key), 1);
        assert_eq!(first.key(), key);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = MessageKey::spontaneous(2);

        let handle = registry.register(key, recorder(&log, "a"), vec![]);
        let snapshot = registry.snapshot(key);
        registry.deregister(handle);

        assert_eq!(snapshot.len(), 1);
        assert!(registry.snapshot(key).is_empty());
    }

    #[test]
    fn unknown_key_has_no_handlers() {
        let registry = CallbackRegistry::new();
        assert!(registry.snapshot(MessageKey::spontaneous(42)).is_empty());
        assert_eq!(registry.count(MessageKey::spontaneous(42)), 0);
    }
}
