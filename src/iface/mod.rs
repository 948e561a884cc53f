//! Device and packet pipeline layer
//!
//! This module bridges the kernel TUN device and the IP layer:
//! - Raw device access behind the [`RawDevice`] trait
//! - The raw-frame pump ([`VirtualDevice`])
//! - The decoded IPv4 packet pipeline ([`IpPacketPipeline`])

pub mod cancel;
pub mod device;
pub mod frame;
pub mod ip;
pub mod queue;
pub mod tun;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used items
pub use cancel::Cancellation;
pub use device::VirtualDevice;
pub use frame::RawFrame;
pub use ip::{IpPacket, IpPacketPipeline};
pub use queue::State;
pub use tun::{open_tun, RawDevice};

/// Lock ignoring poisoning; the guarded lifecycle data has no broken invariants
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
