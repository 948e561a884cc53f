//! IPv4 protocol implementation
//!
//! This module provides byte-exact translation between the RFC 791 wire
//! header and [`Ipv4Header`].
//!
//! Features:
//! - IPv4 header parsing and serialization
//! - Checksum calculation and validation
//! - Header creation with sensible defaults

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::network::checksum;
use byteorder::{BigEndian, ByteOrder};

/// Length of a header without options
pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
const DEFAULT_TTL: u8 = 64;

/// IPv4 packet header structure
///
/// Represents the standard 20-byte IPv4 header as defined in RFC 791.
/// `flags` holds the 3 flag bits and `frag_offset` the 13-bit fragment offset;
/// on the wire they share the 16-bit word at offset 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length, in 32-bit words
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags: u8,
    pub frag_offset: u16,
    pub ttl: u8,      // Time to Live
    pub protocol: u8, // Next Protocol
    pub checksum: u16,
    pub src_addr: [u8; 4], // Source IP Address
    pub dst_addr: [u8; 4], // Destination IP Address
}

impl Ipv4Header {
    /// Create a new IPv4 header with specified parameters
    ///
    /// Version is 4 and IHL is 5 (20 bytes). The checksum is filled in.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tos: u8,
        total_len: u16,
        id: u16,
        flags: u8,
        frag_offset: u16,
        ttl: u8,
        protocol: u8,
        src_addr: [u8; 4],
        dst_addr: [u8; 4],
    ) -> Self {
        let mut header = Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos,
            total_len,
            id,
            flags: flags & flags::MASK,
            frag_offset: frag_offset & flags::FRAGMENT_OFFSET_MASK,
            ttl,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        };
        header.update_checksum();
        header
    }

    /// Create a new IPv4 header with default values
    ///
    /// Only requires the essential parameters; total length covers the
    /// 20-byte header plus `payload_len`.
    pub fn new_simple(
        protocol: u8,
        src_addr: [u8; 4],
        dst_addr: [u8; 4],
        payload_len: u16,
    ) -> Self {
        Self::new(
            0, // TOS: Normal service
            (IPV4_HEADER_LEN as u16).saturating_add(payload_len),
            0, // ID
            0, // No flags
            0, // First fragment
            DEFAULT_TTL,
            protocol,
            src_addr,
            dst_addr,
        )
    }

    /// Parse IPv4 header from byte slice
    ///
    /// Only the length is checked; use [`validate`](Self::validate) for the
    /// semantic checks.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(Error::HeaderTooShort { len: data.len() });
        }

        let flags_frag_offset = BigEndian::read_u16(&data[6..8]);
        let mut src_addr = [0u8; 4];
        let mut dst_addr = [0u8; 4];
        src_addr.copy_from_slice(&data[12..16]);
        dst_addr.copy_from_slice(&data[16..20]);

        Ok(Ipv4Header {
            version: data[0] >> 4,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags: (flags_frag_offset >> 13) as u8,
            frag_offset: flags_frag_offset & flags::FRAGMENT_OFFSET_MASK,
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr,
            dst_addr,
        })
    }

    /// Convert IPv4 header to bytes
    ///
    /// Serializes the header to a 20-byte array ready for transmission. The
    /// checksum is always recomputed; `self.checksum` is not consulted.
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = self.to_bytes_unchecked();
        let sum = checksum(&bytes);
        BigEndian::write_u16(&mut bytes[10..12], sum);
        bytes
    }

    /// Header bytes with a zero checksum field
    fn to_bytes_unchecked(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        bytes[0] = (self.version << 4) | (self.ihl & 0x0F);
        bytes[1] = self.tos;
        BigEndian::write_u16(&mut bytes[2..4], self.total_len);
        BigEndian::write_u16(&mut bytes[4..6], self.id);
        BigEndian::write_u16(&mut bytes[6..8], self.flags_frag_offset());
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        // bytes[10..12] stays 0 for checksum calculation
        bytes[12..16].copy_from_slice(&self.src_addr);
        bytes[16..20].copy_from_slice(&self.dst_addr);
        bytes
    }

    /// The combined flags and fragment offset word
    pub fn flags_frag_offset(&self) -> u16 {
        ((self.flags as u16) << 13) | (self.frag_offset & flags::FRAGMENT_OFFSET_MASK)
    }

    /// Checksum of this header with the checksum field treated as zero
    pub fn compute_checksum(&self) -> u16 {
        checksum(&self.to_bytes_unchecked())
    }

    /// Update checksum after modifying header fields
    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Get payload length
    ///
    /// Returns total length minus header length, or 0 if the header claims
    /// more than the total.
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }

    /// Create a complete IPv4 packet with payload
    ///
    /// The total length field is set to header plus payload, and the
    /// checksum recomputed, before the header is written in front of it.
    pub fn with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut header = *self;
        header.total_len = (IPV4_HEADER_LEN + payload.len())
            .try_into()
            .unwrap_or(u16::MAX);
        let mut packet = Vec::with_capacity(IPV4_HEADER_LEN + payload.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_addr)
    }

    pub fn dont_fragment(&self) -> bool {
        self.flags & flags::DONT_FRAGMENT != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.flags & flags::MORE_FRAGMENTS != 0
    }

    /// Validate IPv4 header structure
    ///
    /// Checks version, IHL, total length, TTL and the checksum.
    pub fn validate(&self) -> Result<()> {
        if self.version != IPV4_VERSION {
            return Err(Error::InvalidHeader("version is not 4"));
        }

        // Check IHL (minimum 5 for 20-byte header)
        if self.ihl < DEFAULT_IHL {
            return Err(Error::InvalidHeader("header length below 5 words"));
        }

        if (self.total_len as usize) < self.header_len() {
            return Err(Error::InvalidHeader("total length smaller than header"));
        }

        if self.ttl == 0 {
            return Err(Error::InvalidHeader("TTL expired"));
        }

        if self.compute_checksum() != self.checksum {
            return Err(Error::InvalidHeader("checksum mismatch"));
        }

        Ok(())
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv{} {} -> {} proto={} len={} id={:#06x} flags={:#05b} off={} ttl={} tos={:#04x} csum={:#06x}",
            self.version,
            self.source(),
            self.destination(),
            self.protocol,
            self.total_len,
            self.id,
            self.flags,
            self.frag_offset,
            self.ttl,
            self.tos,
            self.checksum,
        )
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// IPv4 flags constants, as the 3-bit value stored in [`Ipv4Header::flags`]
pub mod flags {
    pub const RESERVED: u8 = 0b100;
    pub const DONT_FRAGMENT: u8 = 0b010;
    pub const MORE_FRAGMENTS: u8 = 0b001;
    pub const MASK: u8 = 0b111;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}
