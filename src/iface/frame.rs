//! Raw frames as they cross the device boundary

use std::fmt;

/// One frame as read from or written to the device
///
/// A buffer plus the number of valid bytes in it. Frames move through the
/// queues by value, so exactly one owner holds a frame at any time.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    buf: Vec<u8>,
    len: usize,
}

impl RawFrame {
    /// Wrap `buf`, of which the first `len` bytes are valid
    ///
    /// `len` is clamped to the buffer size.
    pub fn new(buf: Vec<u8>, len: usize) -> Self {
        let len = len.min(buf.len());
        RawFrame { buf, len }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }

    /// The valid bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the underlying buffer
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(buf: Vec<u8>) -> Self {
        let len = buf.len();
        RawFrame { buf, len }
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        let bytes = self.as_bytes();
        let mut list = f.debug_list();
        list.entries(bytes.iter().take(PREVIEW).map(|b| format!("{:02x}", b)));
        if bytes.len() > PREVIEW {
            list.entry(&format_args!("... {} bytes", bytes.len()));
        }
        list.finish()
    }
}
