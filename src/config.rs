//! Device and queue sizing

use std::time::Duration;

/// Interface name used when none is given
pub const DEFAULT_INTERFACE: &str = "tun0";

/// Capacity of every incoming and outgoing queue
pub const QUEUE_SIZE: usize = 10;

/// Size of the buffer handed to each raw read
pub const FRAME_SIZE: usize = 2048;

/// Longest the receive thread waits for readability before it re-checks
/// for cancellation
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest interface name the kernel accepts (IFNAMSIZ minus the NUL)
pub const MAX_INTERFACE_NAME: usize = 15;

/// Settings for a [`VirtualDevice`](crate::iface::device::VirtualDevice)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub queue_capacity: usize,
    pub frame_size: usize,
    pub poll_interval: Duration,
}

impl DeviceConfig {
    /// Default sizing for the interface `name`
    pub fn new(name: impl Into<String>) -> Self {
        DeviceConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: DEFAULT_INTERFACE.to_string(),
            queue_capacity: QUEUE_SIZE,
            frame_size: FRAME_SIZE,
            poll_interval: POLL_INTERVAL,
        }
    }
}
