//! The NOTIFICATION message body: an error code/subcode pair plus optional
//! diagnostic data.

use std::fmt;

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::Error;
use crate::{Header, Result};

/// A BGP NOTIFICATION message.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Major error code, RFC4271 §4.5.
    pub code: u8,
    /// Minor error subcode, RFC4271 §4.5.
    pub subcode: u8,
    /// Optional diagnostic data, opaque to this crate.
    pub data: Vec<u8>,
}

impl Notification {
    /// Decodes a NOTIFICATION body: the fixed 2-byte code/subcode, then
    /// whatever remains of `header.length` as data.
    pub fn parse(header: &Header, stream: &mut impl std::io::Read) -> Result<Notification> {
        let code = stream.read_u8()?;
        let subcode = stream.read_u8()?;
        let data = if header.length > 21 {
            let mut data = vec![0u8; header.length as usize - 21];
            stream.read_exact(&mut data)?;
            data
        } else {
            Vec::new()
        };
        Ok(Notification { code, subcode, data })
    }

    /// Encodes the code/subcode pair followed by the data bytes.
    pub fn encode(&self, buf: &mut impl std::io::Write) -> Result<()> {
        buf.write_u8(self.code)?;
        buf.write_u8(self.subcode)?;
        buf.write_all(&self.data)?;
        Ok(())
    }

    /// Builds the NOTIFICATION that should be sent in reply to a framing or
    /// decode error, if that error is one the session reports rather than
    /// one that closes silently.
    pub fn from_error(error: &Error) -> Option<Notification> {
        error.notification().map(|(code, subcode, data)| Notification {
            code,
            subcode,
            data,
        })
    }

    /// Human-readable major error description.
    pub fn major(&self) -> String {
        match self.code {
            1 => "Message Header Error".to_string(),
            2 => "OPEN Message Error".to_string(),
            3 => "UPDATE Message Error".to_string(),
            4 => "Hold Timer Expired".to_string(),
            5 => "Finite State Machine Error".to_string(),
            6 => "Cease".to_string(),
            other => format!("Major Code {}", other),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} / {}", self.major(), self.subcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_roundtrip_with_data() {
        let notification = Notification {
            code: 2,
            subcode: 1,
            data: b"Unsupported Capability".to_vec(),
        };
        let mut bytes = Vec::new();
        notification.encode(&mut bytes).unwrap();

        let header = Header {
            marker: crate::MARKER,
            length: 19 + bytes.len() as u16,
            record_type: 3,
        };
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Notification::parse(&header, &mut cursor).unwrap();
        assert_eq!(decoded, notification);
        assert_eq!(decoded.to_string(), "OPEN Message Error / 1");
    }

    #[test]
    fn notification_roundtrip_without_data() {
        let notification = Notification {
            code: 6,
            subcode: 3,
            data: vec![],
        };
        let mut bytes = Vec::new();
        notification.encode(&mut bytes).unwrap();

        let header = Header {
            marker: crate::MARKER,
            length: 19 + bytes.len() as u16,
            record_type: 3,
        };
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Notification::parse(&header, &mut cursor).unwrap();
        assert_eq!(decoded, notification);
        assert_eq!(decoded.to_string(), "Cease / 3");
    }

    #[test]
    fn not_sync_maps_to_header_error() {
        let notification = Notification::from_error(&Error::NotSync).unwrap();
        assert_eq!(notification.code, 1);
        assert_eq!(notification.subcode, 1);
        assert!(notification.data.is_empty());
    }

    #[test]
    fn io_error_has_no_notification() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(Notification::from_error(&io_err).is_none());
    }
}
