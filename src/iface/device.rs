//! Raw-frame pump over a virtual network device
//!
//! A [`VirtualDevice`] owns the device handle and turns its blocking
//! read/write calls into two bounded queues:
//! - a receive thread reads frames and pushes them onto the incoming queue
//! - a transmit thread pops the outgoing queue and writes each frame
//!
//! Full queues block the producer; nothing is dropped. Syscall errors are
//! logged and the loops carry on. Both threads share one cancellation token,
//! which [`VirtualDevice::close`] triggers.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, trace, warn};

use super::cancel::Cancellation;
use super::frame::RawFrame;
use super::lock;
use super::queue::{Queues, State};
use super::tun::{open_tun, RawDevice};
use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// A TUN device with queue-backed frame I/O
pub struct VirtualDevice {
    name: String,
    config: DeviceConfig,
    /// Released on close; the pump threads hold their own references
    raw: Mutex<Option<Arc<dyn RawDevice>>>,
    queues: Queues<RawFrame, RawFrame>,
}

impl VirtualDevice {
    /// Open the TUN interface `name` with default queue sizing
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(DeviceConfig::new(name))
    }

    /// Open the TUN interface described by `config`
    pub fn open_with(config: DeviceConfig) -> Result<Self> {
        let iface = open_tun(&config.name)?;
        Ok(Self::with_raw(iface, config))
    }

    /// Pump frames through any [`RawDevice`]
    ///
    /// The device name is taken from `raw`, which may differ from
    /// `config.name` when the kernel picked the name.
    pub fn with_raw(raw: impl RawDevice, config: DeviceConfig) -> Self {
        let name = raw.name().to_string();
        let raw: Arc<dyn RawDevice> = Arc::new(raw);
        VirtualDevice {
            name,
            queues: Queues::new(config.queue_capacity, || Error::DeviceClosed),
            raw: Mutex::new(Some(raw)),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.queues.state()
    }

    /// Start the receive and transmit threads
    ///
    /// Fails with `AlreadyStarted` on a second call and `DeviceClosed` after
    /// [`close`](Self::close).
    pub fn start_pump(&self) -> Result<()> {
        let raw = lock(&self.raw).clone().ok_or(Error::DeviceClosed)?;
        let ends = self.queues.take_ends()?;
        let cancel = self.queues.cancellation();

        let receiver = ReceiveLoop {
            raw: raw.clone(),
            incoming: ends.incoming,
            cancel: cancel.clone(),
            device: self.name.clone(),
            frame_size: self.config.frame_size,
            poll_interval: self.config.poll_interval,
        };
        let transmitter = TransmitLoop {
            raw,
            outgoing: ends.outgoing,
            cancel: cancel.clone(),
            device: self.name.clone(),
        };

        let spawned = self
            .queues
            .spawn(format!("{}-rx", self.name), move || receiver.run())
            .and_then(|()| {
                self.queues
                    .spawn(format!("{}-tx", self.name), move || transmitter.run())
            });
        if let Err(e) = spawned {
            self.close();
            return Err(e);
        }

        info!(
            device = %self.name,
            queue_capacity = self.config.queue_capacity,
            frame_size = self.config.frame_size,
            "packet pump started"
        );
        Ok(())
    }

    /// Next frame received from the device
    ///
    /// Blocks while the incoming queue is empty. Once the device is closed,
    /// frames already queued are still returned, then `QueueClosed`.
    pub fn read(&self) -> Result<RawFrame> {
        self.queues.recv(None)
    }

    /// Queue `frame` for transmission
    ///
    /// Blocks while the outgoing queue is full; returns `DeviceClosed` as
    /// soon as the device is closing instead of waiting for space.
    pub fn write(&self, frame: RawFrame) -> Result<()> {
        self.queues.send(frame, None)
    }

    /// [`read`](Self::read) that also gives up with `Cancelled` when `token` fires
    pub(crate) fn read_or_cancel(&self, token: &Cancellation) -> Result<RawFrame> {
        self.queues.recv(Some(token))
    }

    /// [`write`](Self::write) that also gives up with `Cancelled` when `token` fires
    pub(crate) fn write_or_cancel(&self, frame: RawFrame, token: &Cancellation) -> Result<()> {
        self.queues.send(frame, Some(token))
    }

    /// Stop both pump threads and release the device handle
    ///
    /// The receive thread only reads once the device reports a frame ready,
    /// so it notices within one `poll_interval` even on an idle interface.
    /// A write already in progress finishes first. The file descriptor is
    /// closed when the last thread lets go. Queued frames are not drained.
    /// Calling this again is a no-op.
    pub fn close(&self) {
        if !self.queues.close() {
            return;
        }
        drop(lock(&self.raw).take());
        info!(device = %self.name, "device closing");
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pause after a failed read or readiness wait, so a device stuck in an
/// error state is not spun on
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Reads that mean "nothing yet" rather than a failure
fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

struct ReceiveLoop {
    raw: Arc<dyn RawDevice>,
    incoming: Sender<RawFrame>,
    cancel: Arc<Cancellation>,
    device: String,
    frame_size: usize,
    poll_interval: Duration,
}

impl ReceiveLoop {
    fn run(self) {
        while !self.cancel.is_cancelled() {
            match self.raw.wait_readable(self.poll_interval) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if is_retryable(&e) => continue,
                Err(e) => {
                    warn!(device = %self.device, error = %e, "TUN poll failed");
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            }

            let mut buf = vec![0u8; self.frame_size];
            let len = match self.raw.recv(&mut buf) {
                Ok(0) => {
                    trace!(device = %self.device, "empty read skipped");
                    continue;
                }
                Ok(len) => len,
                // Readiness was spurious; go back to waiting
                Err(e) if is_retryable(&e) => continue,
                Err(e) => {
                    warn!(device = %self.device, error = %e, "TUN read failed");
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };

            trace!(device = %self.device, len, "frame received");
            let frame = RawFrame::new(buf, len);
            let queued = select! {
                send(self.incoming, frame) -> res => res.is_ok(),
                recv(self.cancel.signal()) -> _ => false,
            };
            if !queued {
                break;
            }
        }
        debug!(device = %self.device, "receive loop stopped");
    }
}

struct TransmitLoop {
    raw: Arc<dyn RawDevice>,
    outgoing: Receiver<RawFrame>,
    cancel: Arc<Cancellation>,
    device: String,
}

impl TransmitLoop {
    fn run(self) {
        loop {
            let next = select! {
                recv(self.outgoing) -> frame => frame.ok(),
                recv(self.cancel.signal()) -> _ => None,
            };
            let Some(frame) = next else { break };
            if self.cancel.is_cancelled() {
                break;
            }

            match self.raw.send(frame.as_bytes()) {
                Ok(written) if written < frame.len() => {
                    warn!(device = %self.device, written, len = frame.len(), "short TUN write");
                }
                Ok(_) => trace!(device = %self.device, len = frame.len(), "frame sent"),
                Err(e) => warn!(device = %self.device, error = %e, "TUN write failed"),
            }
        }
        debug!(device = %self.device, "transmit loop stopped");
    }
}
