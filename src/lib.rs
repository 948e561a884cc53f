//! The bottom layer of a TCP/IP stack in Rust
//!
//! This library moves IPv4 packets between a Linux TUN device and userspace:
//! - Raw frame pump over the TUN device with bounded queues
//! - IPv4 header parsing, serialization and checksums
//! - A pipeline that hands out decoded packets and forwards outgoing ones
//!
//! ```no_run
//! use std::sync::Arc;
//! use tun_ip_stack::{IpPacketPipeline, VirtualDevice};
//!
//! # fn main() -> tun_ip_stack::Result<()> {
//! let device = Arc::new(VirtualDevice::open("tun0")?);
//! device.start_pump()?;
//!
//! let pipeline = IpPacketPipeline::new();
//! pipeline.start(device.clone())?;
//! while let Ok(packet) = pipeline.read() {
//!     println!("{}", packet.header());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod iface;
pub mod network;

// Re-export commonly used types
pub use config::DeviceConfig;
pub use error::{Error, Result};
pub use iface::{IpPacket, IpPacketPipeline, RawDevice, RawFrame, State, VirtualDevice};
pub use network::{checksum, checksum_with, Ipv4Header, OddByte};
