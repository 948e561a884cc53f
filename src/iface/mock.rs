//! In-memory [`RawDevice`] for exercising the pumps without a TUN device
//!
//! Reads behave like an idle TUN: `recv` with nothing pending blocks until
//! the peer injects something, and only `wait_readable` gives up on time.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::lock;
use super::tun::RawDevice;

/// Readiness wait the pump tests configure
pub(crate) const POLL: Duration = Duration::from_millis(10);

/// Upper bound for waiting on pump output in tests
pub(crate) const WAIT: Duration = Duration::from_secs(2);

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub(crate) struct MockDevice {
    name: String,
    inbound: Receiver<io::Result<Vec<u8>>>,
    /// Taken off `inbound` by `wait_readable`, handed out by the next `recv`
    pending: Mutex<Option<io::Result<Vec<u8>>>>,
    outbound: Sender<Vec<u8>>,
    failing_sends: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

/// The kernel's side of a [`MockDevice`]
pub(crate) struct MockPeer {
    inbound: Sender<io::Result<Vec<u8>>>,
    outbound: Receiver<Vec<u8>>,
    failing_sends: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl MockDevice {
    pub fn new(name: &str) -> (MockDevice, MockPeer) {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        let failing_sends = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));
        (
            MockDevice {
                name: name.to_string(),
                inbound: inbound_rx,
                pending: Mutex::new(None),
                outbound: outbound_tx,
                failing_sends: failing_sends.clone(),
                reads: reads.clone(),
            },
            MockPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
                failing_sends,
                reads,
            },
        )
    }
}

impl RawDevice for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pending = lock(&self.pending);
        if pending.is_some() {
            return Ok(true);
        }
        match self.inbound.recv_timeout(timeout) {
            Ok(next) => {
                *pending = Some(next);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(false)
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let pending = lock(&self.pending).take();
        let next = match pending {
            Some(next) => next,
            None => self
                .inbound
                .recv()
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?,
        };
        let bytes = next?;
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(io::Error::other("injected send failure"));
        }
        self.outbound
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }
}

impl MockPeer {
    /// Queue a frame for the device to read
    pub fn inject(&self, bytes: &[u8]) {
        self.inbound.send(Ok(bytes.to_vec())).unwrap();
    }

    /// Make the next device read fail
    pub fn inject_error(&self) {
        self.inbound
            .send(Err(io::Error::other("injected read failure")))
            .unwrap();
    }

    /// Make the next `count` device writes fail
    pub fn fail_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Number of `recv` calls the device has served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Next frame the device wrote, if one shows up in time
    pub fn transmitted(&self) -> Option<Vec<u8>> {
        self.outbound.recv_timeout(WAIT).ok()
    }

    /// Whether the device has written nothing within `timeout`
    pub fn idle_for(&self, timeout: Duration) -> bool {
        matches!(
            self.outbound.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Whether the device side has been dropped
    pub fn device_released(&self) -> bool {
        matches!(
            self.outbound.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

/// Poll `check` until it holds or [`WAIT`] runs out
pub(crate) fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
