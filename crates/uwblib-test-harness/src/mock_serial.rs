//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a receive buffer that tests can feed at any
//! time through a [`MockHandle`].
//!
//! # Example
//!
//! ```
//! use uwblib_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the module sends "C05,1,0,0,0\r", answer with "R05,1.234500\r".
//! mock.expect(b"C05,1,0,0,0\r", b"R05,1.234500\r");
//!
//! // Keep a handle around to inject spontaneous messages later.
//! let handle = mock.handle();
//! handle.inject(b"S03,6869,1\r");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use uwblib_core::error::{Error, Result};
use uwblib_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// Bytes queued for reading once the matching request is sent.
    response: Vec<u8>,
}

#[derive(Debug)]
struct State {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    rx: VecDeque<u8>,
    /// Upper bound on bytes returned per `receive()`, to force partial reads.
    chunk_size: Option<usize>,
    connected: bool,
    /// Number of upcoming `receive()` calls that fail with a transient error.
    failing_reads: u32,
    sent_log: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control handle for a [`MockTransport`].
///
/// All handles and the transport itself share one state, so a handle taken
/// before the transport is moved into a module can still drive it.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// Add an expected request/response pair.
    ///
    /// Expectations are consumed in order. When `send()` is called with data
    /// matching `request`, `response` is appended to the receive buffer.
    /// An empty `response` means the module stays silent.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Append unsolicited bytes to the receive buffer and wake a pending
    /// `receive()`.
    pub fn inject(&self, data: &[u8]) {
        self.shared.lock().rx.extend(data.iter().copied());
        self.shared.readable.notify_one();
    }

    /// Limit every `receive()` to at most `size` bytes.
    pub fn set_chunk_size(&self, size: usize) {
        self.shared.lock().chunk_size = Some(size.max(1));
    }

    /// Make the next `count` `receive()` calls fail with
    /// [`Error::Transport`], a non-fatal error, before any buffered bytes
    /// are returned.
    pub fn fail_reads(&self, count: u32) {
        self.shared.lock().failing_reads = count;
        self.shared.readable.notify_one();
    }

    /// Simulate the device going away. Pending and future `send()` and
    /// `receive()` calls fail with [`Error::NotConnected`].
    pub fn disconnect(&self) {
        self.set_connected(false);
    }

    /// Set the connected state of the mock transport.
    pub fn set_connected(&self, connected: bool) {
        self.shared.lock().connected = connected;
        self.shared.readable.notify_one();
    }

    /// All data sent through the transport, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Number of injected or scripted bytes not yet read.
    pub fn pending_rx(&self) -> usize {
        self.shared.lock().rx.len()
    }
}

/// A mock [`Transport`] for testing without hardware.
///
/// When `send()` is called, the sent data is recorded and matched against
/// the next expectation. If no expectation is queued or the bytes differ, the
/// send fails with [`Error::Transport`].
///
/// `receive()` returns buffered bytes as soon as any are available and
/// otherwise waits up to its timeout before failing with [`Error::Timeout`].
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            handle: MockHandle {
                shared: Arc::new(Shared {
                    state: Mutex::new(State {
                        expectations: VecDeque::new(),
                        rx: VecDeque::new(),
                        chunk_size: None,
                        connected: true,
                        failing_reads: 0,
                        sent_log: Vec::new(),
                    }),
                    readable: Notify::new(),
                }),
            },
        }
    }

    /// A control handle sharing this transport's state.
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    /// See [`MockHandle::expect`].
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.handle.expect(request, response);
    }

    /// See [`MockHandle::inject`].
    pub fn inject(&self, data: &[u8]) {
        self.handle.inject(data);
    }

    /// See [`MockHandle::sent_data`].
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle.sent_data()
    }

    /// See [`MockHandle::remaining_expectations`].
    pub fn remaining_expectations(&self) -> usize {
        self.handle.remaining_expectations()
    }

    /// See [`MockHandle::set_connected`].
    pub fn set_connected(&self, connected: bool) {
        self.handle.set_connected(connected);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let shared = &self.handle.shared;
        {
            let mut state = shared.lock();
            if !state.connected {
                return Err(Error::NotConnected);
            }

            state.sent_log.push(data.to_vec());

            let expectation = state.expectations.pop_front().ok_or_else(|| {
                Error::Transport("no more expectations in mock transport".into())
            })?;
            if data != expectation.request.as_slice() {
                return Err(Error::Transport(format!(
                    "unexpected send data: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&expectation.request),
                    String::from_utf8_lossy(data)
                )));
            }
            state.rx.extend(expectation.response);
        }
        shared.readable.notify_one();
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let shared = &self.handle.shared;
        let deadline = Instant::now() + timeout;

        loop {
            let readable = shared.readable.notified();
            {
                let mut state = shared.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if state.failing_reads > 0 {
                    state.failing_reads -= 1;
                    return Err(Error::Transport("simulated read failure".into()));
                }
                if !state.rx.is_empty() {
                    let limit = state.chunk_size.unwrap_or(usize::MAX);
                    let n = state.rx.len().min(buf.len()).min(limit);
                    for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if tokio::time::timeout_at(deadline, readable).await.is_err() {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.handle.shared.lock();
        state.connected = false;
        state.rx.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.shared.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect(b"C01\r", b"R01,4\r");

        mock.send(b"C01\r").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"R01,4\r");
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data() {
        let mut mock = MockTransport::new();
        mock.expect(b"C01\r", b"");
        mock.expect(b"C05,2\r", b"");

        mock.send(b"C01\r").await.unwrap();
        mock.send(b"C05,2\r").await.unwrap();

        let sent = mock.sent_data();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"C01\r");
        assert_eq!(sent[1], b"C05,2\r");
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"C01\r", b"R01,4\r");

        let result = mock.send(b"C05,1\r").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(b"C01\r").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn mock_transport_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_transport_injected_bytes_wake_receiver() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        let injector = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.inject(b"S03,00ff\r");
        });

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf[..n], b"S03,00ff\r");
        injector.await.unwrap();
    }

    #[tokio::test]
    async fn mock_transport_chunked_receive() {
        let mut mock = MockTransport::new();
        mock.handle().set_chunk_size(2);
        mock.inject(b"R01,4\r");

        let mut collected = Vec::new();
        let mut buf = [0u8; 64];
        while collected.len() < 6 {
            let n = mock
                .receive(&mut buf, Duration::from_millis(100))
                .await
                .unwrap();
            assert!(n <= 2);
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"R01,4\r");
    }

    #[tokio::test]
    async fn mock_transport_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.handle().disconnect();
        assert!(!mock.is_connected());

        assert!(matches!(mock.send(b"C01\r").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_transport_disconnect_wakes_pending_receive() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        let unplug = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.disconnect();
        });

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        unplug.await.unwrap();
    }

    #[tokio::test]
    async fn mock_transport_failing_reads_come_first() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.inject(b"R01,4\r");
        handle.fail_reads(2);

        let mut buf = [0u8; 64];
        for _ in 0..2 {
            let result = mock.receive(&mut buf, Duration::from_millis(100)).await;
            assert!(matches!(result, Err(Error::Transport(_))));
        }
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"R01,4\r");
    }

    #[tokio::test]
    async fn mock_transport_close() {
        let mut mock = MockTransport::new();
        mock.inject(b"R01,4\r");
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert_eq!(mock.handle().pending_rx(), 0);
    }
}
