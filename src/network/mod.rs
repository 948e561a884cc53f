//! Network layer protocols implementation
//!
//! This module contains the IPv4 header codec and the internet checksum
//! shared by everything that builds or checks headers.

pub mod ipv4;

// Re-export commonly used items
pub use ipv4::{flags, protocol, Ipv4Header, IPV4_HEADER_LEN};

/// How a trailing odd byte enters the checksum sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OddByte {
    /// RFC 1071: the byte is the high half of a word padded with a zero low byte
    #[default]
    PadLow,
    /// The byte is added as-is, as the low half of the word
    Unpadded,
}

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit big-endian chunks, fold the carry bits back
/// into the sum, and return the one's complement of the result.
/// Odd-length data is padded with a zero byte as RFC 1071 prescribes.
pub fn checksum(data: &[u8]) -> u16 {
    checksum_with(data, OddByte::PadLow)
}

/// Calculate Internet checksum with an explicit rule for a trailing odd byte
///
/// Even-length input gives the same result for every `OddByte`.
pub fn checksum_with(data: &[u8], odd: OddByte) -> u16 {
    let mut sum = 0u32;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }

    if let [last] = chunks.remainder() {
        sum += match odd {
            OddByte::PadLow => (*last as u32) << 8,
            OddByte::Unpadded => *last as u32,
        };
    }

    // Add carry bits
    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}
