//! Dispatch queue and the dispatcher loop.
//!
//! The reader loop pushes every decoded frame onto an unbounded queue
//! without ever waiting. The dispatcher drains it on a blocking-pool thread
//! and runs the handlers registered for each frame's key, in queue order.
//! A handler may block for as long as it likes; only later items wait.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use uwblib_protocol::{FieldValue, Frame, MessageKey};

use crate::registry::CallbackRegistry;
use crate::state::{LoopState, ModuleState};

/// A decoded frame waiting for callback delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCallback {
    pub key: MessageKey,
    pub fields: Vec<FieldValue>,
}

impl From<Frame> for PendingCallback {
    fn from(frame: Frame) -> Self {
        PendingCallback {
            key: frame.key,
            fields: frame.fields,
        }
    }
}

pub type DispatchSender = mpsc::UnboundedSender<PendingCallback>;
pub type DispatchReceiver = mpsc::UnboundedReceiver<PendingCallback>;

/// Create the queue between the reader loop and the dispatcher.
pub fn dispatch_queue() -> (DispatchSender, DispatchReceiver) {
    mpsc::unbounded_channel()
}

/// Run the dispatcher until the queue's sender is dropped.
///
/// Blocks the calling thread; spawn it with `spawn_blocking`. When `cancel`
/// fires, items still queued are dropped. Otherwise (the reader stopped on
/// its own) everything already queued is delivered before returning.
pub fn run_dispatcher(
    mut queue: DispatchReceiver,
    registry: Arc<CallbackRegistry>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ModuleState>>,
) {
    debug!("dispatcher loop started");

    while let Some(item) = queue.blocking_recv() {
        if cancel.is_cancelled() {
            debug!(dropped = queue.len() + 1, "dispatcher cancelled");
            break;
        }
        dispatch_one(&registry, &item);
    }

    state.send_modify(|s| s.dispatcher = LoopState::Stopping);
    queue.close();
    state.send_modify(|s| s.dispatcher = LoopState::Stopped);
    debug!("dispatcher loop stopped");
}

/// Deliver one item to every handler registered for its key.
pub fn dispatch_one(registry: &CallbackRegistry, item: &PendingCallback) {
    let handlers = registry.snapshot(item.key);
    if handlers.is_empty() {
        trace!(key = %item.key, "no callbacks registered");
        return;
    }

    for registration in &handlers {
        match panic::catch_unwind(AssertUnwindSafe(|| registration.invoke(&item.fields))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(key = %item.key, handler = registration.id(), error = %e, "callback failed");
            }
            Err(payload) => {
                error!(
                    key = %item.key,
                    handler = registration.id(),
                    panic = panic_message(payload.as_ref()),
                    "callback panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uwblib_core::{Error, Result};

    use crate::registry::Callback;

    fn item(key: MessageKey, v: i64) -> PendingCallback {
        PendingCallback {
            key,
            fields: vec![FieldValue::Int(v)],
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<i64>>>) -> Arc<dyn Callback> {
        let log = log.clone();
        Arc::new(move |fields: &[FieldValue], _: &[FieldValue]| -> Result<()> {
            log.lock().unwrap().push(fields[0].as_i64().unwrap());
            Ok(())
        })
    }

    fn run(
        registry: Arc<CallbackRegistry>,
        items: Vec<PendingCallback>,
        cancel: CancellationToken,
    ) -> ModuleState {
        let (tx, rx) = dispatch_queue();
        for i in items {
            tx.send(i).unwrap();
        }
        drop(tx);
        let (state_tx, state_rx) = watch::channel(ModuleState::RUNNING);
        run_dispatcher(rx, registry, cancel, Arc::new(state_tx));
        *state_rx.borrow()
    }

    #[test]
    fn delivers_in_queue_order() {
        let registry = Arc::new(CallbackRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(MessageKey::spontaneous(1), recorder(&log), vec![]);
        registry.register(MessageKey::spontaneous(2), recorder(&log), vec![]);

        let items = vec![
            item(MessageKey::spontaneous(1), 1),
            item(MessageKey::spontaneous(2), 2),
            item(MessageKey::spontaneous(9), 99),
            item(MessageKey::spontaneous(1), 3),
        ];
        let state = run(registry, items, CancellationToken::new());

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(state.dispatcher, LoopState::Stopped);
    }

    #[test]
    fn failing_and_panicking_handlers_are_contained() {
        let registry = Arc::new(CallbackRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = MessageKey::spontaneous(1);

        registry.register(
            key,
            Arc::new(|_: &[FieldValue], _: &[FieldValue]| -> Result<()> {
                Err(Error::Handler("nope".into()))
            }),
            vec![],
        );
        registry.register(
            key,
            Arc::new(|_: &[FieldValue], _: &[FieldValue]| -> Result<()> {
                panic!("handler blew up")
            }),
            vec![],
        );
        registry.register(key, recorder(&log), vec![]);

        run(
            registry,
            vec![item(key, 1), item(key, 2)],
            CancellationToken::new(),
        );

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancelled_dispatcher_drops_queued_items() {
        let registry = Arc::new(CallbackRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(MessageKey::spontaneous(1), recorder(&log), vec![]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let state = run(
            registry,
            vec![item(MessageKey::spontaneous(1), 1)],
            cancel,
        );

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(state.dispatcher, LoopState::Stopped);
    }

    #[test]
    fn extra_arguments_are_passed_through() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        registry.register(
            MessageKey::spontaneous(3),
            Arc::new(move |fields: &[FieldValue], extra: &[FieldValue]| -> Result<()> {
                *sink.lock().unwrap() = Some((fields.to_vec(), extra.to_vec()));
                Ok(())
            }),
            vec![FieldValue::from("tag")],
        );

        dispatch_one(
            &registry,
            &PendingCallback {
                key: MessageKey::spontaneous(3),
                fields: vec![FieldValue::Bytes(vec![0xab])],
            },
        );

        let (fields, extra) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(fields, vec![FieldValue::Bytes(vec![0xab])]);
        assert_eq!(extra, vec![FieldValue::Text("tag".into())]);
    }
}
