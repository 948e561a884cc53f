//! Error type shared by the device, codec and pipeline layers

use std::io;

use thiserror::Error;

/// Errors returned by this crate
///
/// Setup failures (`DeviceOpen`, `InvalidInterfaceName`, `Spawn`) are fatal.
/// The closed-resource variants are the normal way a consumer learns that a
/// device or pipeline has shut down.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to open TUN device {name}: {source}")]
    DeviceOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid interface name {0:?}: must be 1 to 15 bytes")]
    InvalidInterfaceName(String),

    #[error("failed to spawn pump thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("IPv4 header too short: got {len} bytes, need at least 20")]
    HeaderTooShort { len: usize },

    #[error("invalid IPv4 header: {0}")]
    InvalidHeader(&'static str),

    #[error("incoming queue is closed")]
    QueueClosed,

    #[error("device closed")]
    DeviceClosed,

    #[error("pipeline closed")]
    PipelineClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("pump already started")]
    AlreadyStarted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
