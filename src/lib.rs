#![deny(missing_docs)]

//! `bgpwire` provides codecs for BGP-4 ([RFC4271]) formatted streams,
//! restricted to the multiprotocol extension ([RFC4760]) for standard
//! unicast IPv4 and labeled VPN-IPv4 ([RFC4364]) NLRI, plus a minimal
//! session engine that runs the hold-timer/keepalive clockwork on top of a
//! framed byte stream.
//!
//! [RFC4271]: https://www.iana.org/go/rfc4271
//! [RFC4760]: https://www.iana.org/go/rfc4760
//! [RFC4364]: https://www.iana.org/go/rfc4364
//!
//! # Examples
//!
//! ## Decoding a single message from a byte slice
//! ```
//! use bgpwire::{Header, Message};
//!
//! let mut data = vec![0xff; 16];
//! data.extend_from_slice(&[0, 19, 4]); // length=19, type=4 (KEEPALIVE)
//! let mut cursor = std::io::Cursor::new(data);
//! let header = Header::parse(&mut cursor).unwrap();
//! let message = Message::parse(&header, &mut cursor).unwrap();
//! assert!(matches!(message, Message::KeepAlive));
//! ```

/// Error types returned by the codec and session layers.
pub mod error;
/// Notification message body.
pub mod notification;
/// Optional-parameter and capability handling for the OPEN message.
pub mod open;
/// The session engine: frame reader, hold-timer state machine, NOTIFICATION emission.
pub mod session;
/// UPDATE message body: path attributes and NLRI.
pub mod update;

pub use crate::error::{Error, Result};
pub use crate::notification::Notification;
pub use crate::open::{Capabilities, Open};
pub use crate::update::attributes::*;
pub use crate::update::nlri::*;
pub use crate::update::Update;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// The 16-byte marker every BGP message header carries. Fixed to all-ones;
/// this crate does not implement the (obsolete) authenticated header.
pub const MARKER: [u8; 16] = [0xff; 16];

/// Maximum total message length (header + body), per RFC4271.
pub const MAX_MESSAGE_LENGTH: u16 = 4096;

/// Length of the fixed message header in bytes.
pub const HEADER_LENGTH: u16 = 19;

/// Address Family Identifier. Only IPv4 is recognized; this crate does not
/// implement IPv6.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AFI {
    /// Internet Protocol version 4 (32 bits)
    IPv4 = 1,
}

impl AFI {
    fn try_from(value: u16) -> Result<AFI> {
        match value {
            1 => Ok(AFI::IPv4),
            _ => Err(Error::MalformedAttribute(format!(
                "unsupported address family {}",
                value
            ))),
        }
    }
}

/// Subsequent Address Family Identifier. Only unicast and MPLS/VPN are
/// recognized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SAFI {
    /// Unicast forwarding (AFI=1, SAFI=1)
    Unicast = 1,
    /// Labeled VPN-IPv4 forwarding (AFI=1, SAFI=128), RFC4364
    MplsVpn = 128,
}

impl SAFI {
    fn try_from(value: u8) -> Result<SAFI> {
        match value {
            1 => Ok(SAFI::Unicast),
            128 => Ok(SAFI::MplsVpn),
            _ => Err(Error::MalformedAttribute(format!(
                "unsupported subsequent address family {}",
                value
            ))),
        }
    }
}

/// The fixed 19-byte header that precedes every BGP message.
#[derive(Debug, Clone)]
pub struct Header {
    /// Predefined marker, must be all-ones.
    pub marker: [u8; 16],
    /// Total length of the message, header included, in bytes.
    pub length: u16,
    /// Message type: 1=OPEN, 2=UPDATE, 3=NOTIFICATION, 4=KEEPALIVE.
    pub record_type: u8,
}

impl Header {
    /// Reads a header from a stream. Does not validate the marker or the
    /// length bounds — that validation belongs to [`session::FrameReader`],
    /// which has the buffering context to report it as a NOTIFICATION.
    pub fn parse(stream: &mut impl Read) -> Result<Header> {
        let mut marker = [0u8; 16];
        stream.read_exact(&mut marker)?;
        let length = stream.read_u16::<BigEndian>()?;
        let record_type = stream.read_u8()?;
        Ok(Header {
            marker,
            length,
            record_type,
        })
    }

    fn write(&self, write: &mut impl Write) -> Result<()> {
        write.write_all(&self.marker)?;
        write.write_u16::<BigEndian>(self.length)?;
        write.write_u8(self.record_type)?;
        Ok(())
    }
}

/// A single BGP message.
#[derive(Debug, Clone)]
pub enum Message {
    /// BGP OPEN message.
    Open(Open),
    /// BGP UPDATE message.
    Update(Update),
    /// BGP KEEPALIVE message. Carries no body.
    KeepAlive,
    /// BGP NOTIFICATION message.
    Notification(Notification),
}

impl Message {
    /// The wire type byte for this message.
    pub fn record_type(&self) -> u8 {
        match self {
            Message::Open(_) => 1,
            Message::Update(_) => 2,
            Message::Notification(_) => 3,
            Message::KeepAlive => 4,
        }
    }

    /// Parses the message body that follows `header`. `header.record_type`
    /// selects the decoder; the frame reader is responsible for rejecting
    /// types outside `1..=4` before calling this.
    pub fn parse(header: &Header, stream: &mut impl Read) -> Result<Message> {
        match header.record_type {
            1 => Ok(Message::Open(Open::parse(stream)?)),
            2 => Ok(Message::Update(Update::parse(header, stream)?)),
            3 => Ok(Message::Notification(Notification::parse(header, stream)?)),
            4 => Ok(Message::KeepAlive),
            other => Err(Error::BadMsg(other)),
        }
    }

    fn encode_body(&self, write: &mut impl Write) -> Result<()> {
        match self {
            Message::Open(open) => open.encode(write),
            Message::Update(update) => update.encode(write),
            Message::Notification(notification) => notification.encode(write),
            Message::KeepAlive => Ok(()),
        }
    }

    /// Encodes the message with its 19-byte header prepended.
    pub fn encode(&self, write: &mut impl Write) -> Result<()> {
        let mut body = Vec::with_capacity(32);
        self.encode_body(&mut body)?;
        let total_length = HEADER_LENGTH as usize + body.len();
        if total_length > MAX_MESSAGE_LENGTH as usize {
            return Err(Error::MalformedAttribute(format!(
                "encoded message length {} exceeds {}",
                total_length, MAX_MESSAGE_LENGTH
            )));
        }
        let header = Header {
            marker: MARKER,
            length: total_length as u16,
            record_type: self.record_type(),
        };
        header.write(write)?;
        write.write_all(&body)?;
        Ok(())
    }
}
