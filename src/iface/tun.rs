//! Raw access to the kernel TUN device
//!
//! [`RawDevice`] is the seam between the pump threads and the kernel: one
//! `recv` yields one frame, one `send` writes one frame. The production
//! implementation is `tun_tap::Iface` opened in TUN mode without packet info.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::info;
use tun_tap::{Iface, Mode};

use crate::config::MAX_INTERFACE_NAME;
use crate::error::{Error, Result};

/// A handle that moves whole frames to and from a point-to-point device
///
/// `recv` and `send` may block. Implementations must be usable from the
/// receive and transmit threads at the same time.
pub trait RawDevice: Send + Sync + 'static {
    /// Interface name as assigned by the kernel
    fn name(&self) -> &str;

    /// Wait up to `timeout` for a frame to become readable
    ///
    /// `Ok(false)` means nothing arrived in time. The receive loop only
    /// calls `recv` after `Ok(true)`, so an idle device never parks the
    /// loop inside a syscall it cannot be cancelled out of.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;

    /// Read one frame into `buf`, returning its length
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `buf` as one frame
    fn send(&self, buf: &[u8]) -> io::Result<usize>;
}

impl RawDevice for Iface {
    fn name(&self) -> &str {
        Iface::name(self)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        // SAFETY: the fd is owned by `self` and outlives the poll call
        let fd = unsafe { BorrowedFd::borrow_raw(self.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(errno) => Err(errno.into()),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        Iface::recv(self, buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        Iface::send(self, buf)
    }
}

/// Check that `name` fits the kernel's NUL-terminated 16-byte name buffer
pub fn check_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME || name.as_bytes().contains(&0) {
        return Err(Error::InvalidInterfaceName(name.to_string()));
    }
    Ok(())
}

/// Open `/dev/net/tun` and attach it to interface `name`
///
/// Issues `TUNSETIFF` with `IFF_TUN | IFF_NO_PI`, so frames are bare IP
/// packets. Needs `CAP_NET_ADMIN`.
pub fn open_tun(name: &str) -> Result<Iface> {
    check_interface_name(name)?;

    let iface = Iface::without_packet_info(name, Mode::Tun).map_err(|source| Error::DeviceOpen {
        name: name.to_string(),
        source,
    })?;

    info!(requested = name, device = %iface.name(), "TUN device created");
    Ok(iface)
}
