//! UwbModule -- the public handle to one UWB module.
//!
//! A module owns the transport while stopped. [`start`](UwbModule::start)
//! moves it into the reader task and spawns the dispatcher;
//! [`stop`](UwbModule::stop) cancels both and takes the transport back, so
//! the module can be started again.
//!
//! ```no_run
//! use std::time::Duration;
//! use uwblib_io::UwbBuilder;
//! use uwblib_protocol::{FieldValue, specifiers};
//!
//! # async fn example() -> uwblib_core::Result<()> {
//! let module = UwbBuilder::new().serial_port("/dev/ttyUSB0").build().await?;
//!
//! // Single-sided ranging with module 2: target, ds_twr, meas_at_target, get_cir.
//! let fields: [FieldValue; 4] = [2u64.into(), false.into(), false.into(), false.into()];
//! let reply = module
//!     .call(specifiers::DO_TWR, &fields, Duration::from_secs(1))
//!     .await?;
//! println!("range: {:?}", reply.fields[0].as_f32());
//!
//! module.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uwblib_core::{Error, Result, Transport};
use uwblib_protocol::{FieldValue, Frame, MessageClass, MessageKey, SpecifierTable, codec};

use crate::config::ModuleConfig;
use crate::correlation::CorrelationStore;
use crate::dispatch::{self, dispatch_queue};
use crate::reader::{self, ReaderContext, Request};
use crate::registry::{Callback, CallbackRegistry, RegistrationHandle};
use crate::state::{LoopState, ModuleState};

/// Handles to the tasks of one start/stop cycle.
struct Session {
    requests: mpsc::Sender<Request>,
    store: Arc<CorrelationStore>,
    cancel: CancellationToken,
    reader: JoinHandle<Box<dyn Transport>>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Cancel both loops, wait for them, and recover the transport.
    async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.cancel.cancel();
        let transport = self
            .reader
            .await
            .map_err(|e| Error::Transport(format!("reader task failed: {e}")))?;
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "dispatcher task failed");
        }
        Ok(transport)
    }
}

/// A UWB module driven over a byte-stream transport.
pub struct UwbModule {
    table: Arc<SpecifierTable>,
    config: ModuleConfig,
    registry: Arc<CallbackRegistry>,
    state: Arc<watch::Sender<ModuleState>>,
    /// Present while stopped.
    transport: Mutex<Option<Box<dyn Transport>>>,
    /// Present while started.
    session: Mutex<Option<Session>>,
}

impl UwbModule {
    /// Create a stopped module. Use [`UwbBuilder`](crate::UwbBuilder) for
    /// the usual construction path.
    pub fn new(transport: Box<dyn Transport>, table: SpecifierTable, config: ModuleConfig) -> Self {
        UwbModule {
            table: Arc::new(table),
            config,
            registry: Arc::new(CallbackRegistry::new()),
            state: Arc::new(watch::Sender::new(ModuleState::default())),
            transport: Mutex::new(Some(transport)),
            session: Mutex::new(None),
        }
    }

    pub fn specifiers(&self) -> &SpecifierTable {
        &self.table
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Start the reader and dispatcher loops.
    ///
    /// Fails with [`Error::InvalidParameter`] if the loops are already
    /// running and with [`Error::NotConnected`] after [`close`](Self::close).
    /// A module whose reader stopped on its own (e.g. after a disconnect)
    /// can be started again; the old tasks are reaped first.
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.take() {
            if !current.reader.is_finished() {
                *session = Some(current);
                return Err(Error::InvalidParameter("module already running".into()));
            }
            debug!("reaping stopped session before restart");
            let transport = current.shutdown().await?;
            *self.transport.lock().await = Some(transport);
        }

        let transport = self
            .transport
            .lock()
            .await
            .take()
            .ok_or(Error::NotConnected)?;

        let store = Arc::new(CorrelationStore::new());
        let (queue_tx, queue_rx) = dispatch_queue();
        let (req_tx, req_rx) = mpsc::channel(self.config.request_queue_depth.max(1));
        let cancel = CancellationToken::new();

        self.state.send_replace(ModuleState::RUNNING);

        let reader = tokio::spawn(reader::reader_loop(ReaderContext {
            transport,
            table: self.table.clone(),
            config: self.config.clone(),
            store: store.clone(),
            queue: queue_tx,
            requests: req_rx,
            cancel: cancel.clone(),
            state: self.state.clone(),
        }));

        let dispatcher = {
            let registry = self.registry.clone();
            let cancel = cancel.clone();
            let state = self.state.clone();
            tokio::task::spawn_blocking(move || {
                dispatch::run_dispatcher(queue_rx, registry, cancel, state)
            })
        };

        *session = Some(Session {
            requests: req_tx,
            store,
            cancel,
            reader,
            dispatcher,
        });
        info!("module started");
        Ok(())
    }

    /// Stop both loops and take the transport back.
    ///
    /// Pending [`call`](Self::call)s fail with [`Error::Closed`]. Items still
    /// queued for callbacks are dropped; a handler that is already running
    /// is waited for. Stopping a stopped module is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let Some(current) = self.session.lock().await.take() else {
            return Ok(());
        };
        let transport = current.shutdown().await?;
        *self.transport.lock().await = Some(transport);
        info!("module stopped");
        Ok(())
    }

    /// Stop the loops and close the transport. The module cannot be
    /// started again afterwards.
    pub async fn close(&self) -> Result<()> {
        self.stop().await?;
        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.close().await?;
        }
        info!("module closed");
        Ok(())
    }

    /// Current state of both loops.
    pub fn state(&self) -> ModuleState {
        *self.state.borrow()
    }

    pub fn reader_state(&self) -> LoopState {
        self.state().reader
    }

    pub fn dispatcher_state(&self) -> LoopState {
        self.state().dispatcher
    }

    /// Watch state transitions, e.g. to notice the reader stopping after
    /// the transport went away.
    pub fn subscribe_state(&self) -> watch::Receiver<ModuleState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.reader_state() == LoopState::Running
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    /// Send a command and wait for the first reply that arrives after it.
    ///
    /// The reply is the `R` message with the same ID as `key`. Only a reply
    /// received after this call captured its baseline is accepted, so a
    /// reply cached from an earlier call is never returned.
    ///
    /// Errors:
    /// - encoding errors from [`codec::encode`], before anything is written;
    /// - [`Error::TransportWrite`] if the transport rejects the bytes;
    /// - [`Error::Timeout`] if no fresh reply arrives within `timeout`;
    /// - [`Error::Closed`] if the module is stopped or stops while waiting.
    ///
    /// Concurrent calls with the same ID may each observe the other's reply.
    pub async fn call(
        &self,
        key: MessageKey,
        values: &[FieldValue],
        timeout: Duration,
    ) -> Result<Frame> {
        if key.class != MessageClass::Command {
            return Err(Error::InvalidParameter(format!("{key} is not a command")));
        }
        let bytes = codec::encode(&self.table, key, values)?;
        let reply_key = key.reply();
        self.table.lookup(reply_key)?;

        let (requests, store) = {
            let session = self.session.lock().await;
            let session = session.as_ref().ok_or(Error::Closed)?;
            (session.requests.clone(), session.store.clone())
        };
        if store.is_closed() {
            return Err(Error::Closed);
        }

        let baseline = store.sequence(reply_key);
        debug!(%key, baseline, "sending command");

        let exchange = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            requests
                .send(Request::Write {
                    bytes,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| Error::Closed)?;
            match reply_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(Error::Closed)) | Err(_) => return Err(Error::Closed),
                Ok(Err(e)) => return Err(Error::TransportWrite(e.to_string())),
            }
            store.wait_newer(reply_key, baseline).await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%key, ?timeout, "command timed out");
                Err(Error::Timeout)
            }
        }
    }

    // -----------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------

    /// Register `handler` for messages with `key`. `extra` is passed to
    /// every invocation after the decoded fields.
    ///
    /// Handlers for one key run in registration order on the dispatcher
    /// thread. Unknown keys are rejected here rather than silently never
    /// firing.
    pub fn register<F>(
        &self,
        key: MessageKey,
        handler: F,
        extra: Vec<FieldValue>,
    ) -> Result<RegistrationHandle>
    where
        F: Fn(&[FieldValue], &[FieldValue]) -> Result<()> + Send + Sync + 'static,
    {
        self.register_callback(key, Arc::new(handler), extra)
    }

    /// Register a shared [`Callback`] implementation.
    pub fn register_callback(
        &self,
        key: MessageKey,
        handler: Arc<dyn Callback>,
        extra: Vec<FieldValue>,
    ) -> Result<RegistrationHandle> {
        self.table.lookup(key)?;
        if key.class == MessageClass::Command {
            return Err(Error::InvalidParameter(format!(
                "{key} is a command; callbacks can only receive responses and spontaneous messages"
            )));
        }
        let handle = self.registry.register(key, handler, extra);
        debug!(%key, "callback registered");
        Ok(handle)
    }

    /// Remove a registration. Returns `false` if it was already removed.
    pub fn deregister(&self, handle: RegistrationHandle) -> bool {
        self.registry.deregister(handle)
    }
}

impl Drop for UwbModule {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            session.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for UwbModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UwbModule")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
