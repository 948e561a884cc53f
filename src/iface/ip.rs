//! IPv4 packet queues on top of a [`VirtualDevice`]
//!
//! The pipeline runs its own pair of threads: one decodes frames read from
//! the device into [`IpPacket`]s, the other forwards outgoing frames to the
//! device unchanged. It has its own cancellation token, so closing the
//! pipeline leaves the device running.

use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, trace, warn};

use super::cancel::Cancellation;
use super::device::VirtualDevice;
use super::frame::RawFrame;
use super::queue::{Queues, State};
use crate::config::QUEUE_SIZE;
use crate::error::{Error, Result};
use crate::network::ipv4::Ipv4Header;

/// A received frame together with its decoded IPv4 header
#[derive(Debug, Clone)]
pub struct IpPacket {
    header: Ipv4Header,
    frame: RawFrame,
}

impl IpPacket {
    pub fn header(&self) -> &Ipv4Header {
        &self.header
    }

    /// The frame exactly as read from the device
    pub fn frame(&self) -> &RawFrame {
        &self.frame
    }

    /// Bytes after the header, up to the header's total length
    ///
    /// Clamped to what the frame actually holds.
    pub fn payload(&self) -> &[u8] {
        let bytes = self.frame.as_bytes();
        let end = (self.header.total_len as usize).min(bytes.len());
        let start = self.header.header_len().min(end);
        &bytes[start..end]
    }

    pub fn into_parts(self) -> (Ipv4Header, RawFrame) {
        (self.header, self.frame)
    }
}

/// Typed packet queues fed by a [`VirtualDevice`]
pub struct IpPacketPipeline {
    queues: Queues<IpPacket, RawFrame>,
}

impl IpPacketPipeline {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_SIZE)
    }

    /// Pipeline whose two queues hold `capacity` items each
    pub fn with_capacity(capacity: usize) -> Self {
        IpPacketPipeline {
            queues: Queues::new(capacity, || Error::PipelineClosed),
        }
    }

    pub fn state(&self) -> State {
        self.queues.state()
    }

    /// Start decoding from and forwarding to `device`
    ///
    /// The device's own pump must be started separately.
    pub fn start(&self, device: Arc<VirtualDevice>) -> Result<()> {
        let ends = self.queues.take_ends()?;
        let cancel = self.queues.cancellation();
        let name = device.name().to_string();

        let decoder = DecodeLoop {
            device: device.clone(),
            incoming: ends.incoming,
            cancel: cancel.clone(),
        };
        let forwarder = ForwardLoop {
            device,
            outgoing: ends.outgoing,
            cancel: cancel.clone(),
        };

        let spawned = self
            .queues
            .spawn(format!("{}-ip-rx", name), move || decoder.run())
            .and_then(|()| {
                self.queues
                    .spawn(format!("{}-ip-tx", name), move || forwarder.run())
            });
        if let Err(e) = spawned {
            self.close();
            return Err(e);
        }

        info!(device = %name, "IP pipeline started");
        Ok(())
    }

    /// Next decoded packet
    ///
    /// Returns `QueueClosed` once the pipeline, or the device feeding it, has
    /// shut down and the queue is drained.
    pub fn read(&self) -> Result<IpPacket> {
        self.queues.recv(None)
    }

    /// Queue a raw frame for the device
    ///
    /// The frame is forwarded as-is; build it with
    /// [`Ipv4Header::with_payload`] or [`Ipv4Header::to_bytes`].
    pub fn write(&self, frame: RawFrame) -> Result<()> {
        self.queues.send(frame, None)
    }

    /// Stop the pipeline threads; the device is left alone
    pub fn close(&self) {
        if self.queues.close() {
            info!("IP pipeline closing");
        }
    }
}

impl Default for IpPacketPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IpPacketPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

struct DecodeLoop {
    device: Arc<VirtualDevice>,
    incoming: Sender<IpPacket>,
    cancel: Arc<Cancellation>,
}

impl DecodeLoop {
    fn run(self) {
        while !self.cancel.is_cancelled() {
            let frame = match self.device.read_or_cancel(&self.cancel) {
                Ok(frame) => frame,
                Err(Error::Cancelled) => break,
                Err(e) => {
                    debug!(
                        device = %self.device.name(),
                        error = %e,
                        "device stopped delivering frames"
                    );
                    break;
                }
            };

            let header = match Ipv4Header::parse(frame.as_bytes()) {
                Ok(header) => header,
                Err(e) => {
                    debug!(
                        device = %self.device.name(),
                        len = frame.len(),
                        error = %e,
                        "dropping undecodable frame"
                    );
                    continue;
                }
            };

            trace!(device = %self.device.name(), %header, "packet decoded");
            let packet = IpPacket { header, frame };
            let queued = select! {
                send(self.incoming, packet) -> res => res.is_ok(),
                recv(self.cancel.signal()) -> _ => false,
            };
            if !queued {
                break;
            }
        }
        debug!(device = %self.device.name(), "decode loop stopped");
    }
}

struct ForwardLoop {
    device: Arc<VirtualDevice>,
    outgoing: Receiver<RawFrame>,
    cancel: Arc<Cancellation>,
}

impl ForwardLoop {
    fn run(self) {
        loop {
            let next = select! {
                recv(self.outgoing) -> frame => frame.ok(),
                recv(self.cancel.signal()) -> _ => None,
            };
            let Some(frame) = next else { break };

            match self.device.write_or_cancel(frame, &self.cancel) {
                Ok(()) => {}
                Err(Error::Cancelled) => break,
                Err(e) => warn!(
                    device = %self.device.name(),
                    error = %e,
                    "forwarding frame failed"
                ),
            }
        }
        debug!(device = %self.device.name(), "forward loop stopped");
    }
}
