mod error;
mod protocol;
#[cfg(feature = "server")]
mod server;

pub use self::error::{Error, Result};
pub use self::protocol::{encode_response, encode_response_with_address};
#[cfg(feature = "server")]
pub use server::{CannedAnswer, Handler, Server};

use bitflags::bitflags;
use std::net::Ipv4Addr;

/// Size of the fixed DNS header.
pub const HEADER_LENGTH: usize = 12;

/// Largest datagram read from the socket; longer queries are truncated.
pub const MAX_DATAGRAM_SIZE: usize = 512;

/// Compression pointer to offset 12, where the first question's name starts.
pub const ANSWER_NAME_POINTER: u16 = 0xC00C;

pub const ANSWER_TTL: u32 = 600;

/// RFC 5737 documentation address.
pub const DEFAULT_ANSWER_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const RESPONSE            = 0x8000;
        const AUTHORITATIVE       = 0x0400;
        const TRUNCATED           = 0x0200;
        const RECURSION_DESIRED   = 0x0100;
        const RECURSION_AVAILABLE = 0x0080;

        const STANDARD_RESPONSE = Self::RESPONSE.bits()
            | Self::RECURSION_DESIRED.bits()
            | Self::RECURSION_AVAILABLE.bits();
    }
}

impl Flags {
    pub fn opcode(self) -> u8 {
        ((self.bits() >> 11) & 0b1111) as u8
    }

    pub fn response_code(self) -> u8 {
        (self.bits() & 0b1111) as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

/// A question borrowed from the request buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Question<'a> {
    /// Wire-format labels, including the zero-length terminator.
    pub name: &'a [u8],
    pub qtype: u16,
    pub qclass: u16,
    /// The question exactly as it appeared in the request.
    pub raw: &'a [u8],
}
