//! The reader loop: the single task that owns the transport.
//!
//! It multiplexes three things with a biased `select!`:
//!
//! 1. cancellation,
//! 2. outbound writes requested by [`UwbModule::call`](crate::UwbModule::call),
//! 3. a bounded-wait read of incoming bytes.
//!
//! Every decoded frame is stored in the [`CorrelationStore`] and then pushed
//! onto the dispatch queue. Frames that fail to decode are logged and
//! dropped. The loop stops on cancellation, on a fatal transport error or
//! after too many consecutive read errors, and hands the transport back.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use uwblib_core::{Error, Result, Transport};
use uwblib_protocol::{FrameExtractor, SpecifierTable, codec};

use crate::config::ModuleConfig;
use crate::correlation::CorrelationStore;
use crate::dispatch::{DispatchSender, PendingCallback};
use crate::state::{LoopState, ModuleState};

/// A request sent from the module to the reader task.
#[derive(Debug)]
pub(crate) enum Request {
    /// Write an encoded command to the transport.
    Write {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Everything the reader loop needs, moved into its task.
pub(crate) struct ReaderContext {
    pub transport: Box<dyn Transport>,
    pub table: Arc<SpecifierTable>,
    pub config: ModuleConfig,
    pub store: Arc<CorrelationStore>,
    pub queue: DispatchSender,
    pub requests: mpsc::Receiver<Request>,
    pub cancel: CancellationToken,
    pub state: Arc<watch::Sender<ModuleState>>,
}

/// Run the reader loop until shutdown. Returns the transport.
pub(crate) async fn reader_loop(ctx: ReaderContext) -> Box<dyn Transport> {
    let ReaderContext {
        mut transport,
        table,
        config,
        store,
        queue,
        mut requests,
        cancel,
        state,
    } = ctx;

    let mut extractor = FrameExtractor::with_max_buffer(config.max_buffer);
    let mut buf = vec![0u8; config.read_chunk_size.max(1)];
    let mut read_errors = 0u32;

    debug!("reader loop started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("reader loop cancelled");
                break;
            }

            req = requests.recv() => {
                let Some(Request::Write { bytes, reply }) = req else {
                    debug!("request channel closed, exiting reader loop");
                    break;
                };
                trace!(len = bytes.len(), "writing command");
                let result = transport.send(&bytes).await;
                let fatal = matches!(&result, Err(e) if e.is_fatal_transport());
                if let Err(e) = &result {
                    warn!(error = %e, "transport write failed");
                }
                let _ = reply.send(result);
                if fatal {
                    error!("transport lost during write, stopping reader loop");
                    break;
                }
            }

            result = transport.receive(&mut buf, config.poll_interval) => {
                match result {
                    Ok(0) | Err(Error::Timeout) => read_errors = 0,
                    Ok(n) => {
                        read_errors = 0;
                        trace!(len = n, "read bytes");
                        for raw in extractor.extract(&buf[..n]) {
                            handle_frame(&table, &store, &queue, &raw);
                        }
                    }
                    Err(e) if e.is_fatal_transport() => {
                        error!(error = %e, "transport lost, stopping reader loop");
                        break;
                    }
                    Err(e) => {
                        read_errors += 1;
                        warn!(error = %e, read_errors, "transport read failed");
                        if read_errors >= config.max_read_errors {
                            error!(read_errors, "too many read errors, stopping reader loop");
                            break;
                        }
                    }
                }
            }
        }
    }

    state.send_modify(|s| s.reader = LoopState::Stopping);

    store.close();
    drop(queue);
    requests.close();
    while let Ok(Request::Write { reply, .. }) = requests.try_recv() {
        let _ = reply.send(Err(Error::Closed));
    }
    if extractor.buffered() > 0 {
        debug!(
            len = extractor.buffered(),
            "discarding partial frame on shutdown"
        );
    }

    state.send_modify(|s| s.reader = LoopState::Stopped);
    debug!("reader loop stopped");
    transport
}

/// Decode one extracted frame and publish it.
fn handle_frame(
    table: &SpecifierTable,
    store: &CorrelationStore,
    queue: &DispatchSender,
    raw: &[u8],
) {
    match codec::decode(table, raw) {
        Ok(frame) => {
            trace!(key = %frame.key, fields = frame.fields.len(), "frame decoded");
            store.insert(frame.clone());
            if queue.send(PendingCallback::from(frame)).is_err() {
                debug!("dispatch queue closed, frame not delivered to callbacks");
            }
        }
        Err(e) => {
            warn!(
                error = %e,
                frame = ?String::from_utf8_lossy(raw),
                "dropping undecodable frame"
            );
        }
    }
}
