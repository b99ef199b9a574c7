//! The OPEN message body: version/ASN/holdtime/identifier plus the optional
//! parameters that carry capability negotiation.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::io::{Cursor, Read, Write};
use std::net::Ipv4Addr;

use crate::error::Error;
use crate::{Result, AFI, SAFI};

/// A BGP OPEN message.
#[derive(Debug, Clone, PartialEq)]
pub struct Open {
    /// Protocol version; always 4 for BGP-4.
    pub version: u8,
    /// The sender's Autonomous System number.
    pub peer_asn: u16,
    /// Seconds the sender proposes for the hold timer.
    pub hold_timer: u16,
    /// The sender's BGP identifier.
    pub identifier: Ipv4Addr,
    /// Recognized capabilities, negotiated out of the optional parameters.
    pub capabilities: Capabilities,
    /// Optional parameters of a type other than capabilities (type 2),
    /// preserved verbatim as `(type, value)`.
    pub other_parameters: Vec<(u8, Vec<u8>)>,
}

impl Open {
    /// Decodes an OPEN body: the fixed 10-byte header, then optional
    /// parameters until `paramlen` is consumed.
    pub fn parse(stream: &mut impl Read) -> Result<Open> {
        let version = stream.read_u8()?;
        let peer_asn = stream.read_u16::<BigEndian>()?;
        let hold_timer = stream.read_u16::<BigEndian>()?;
        let identifier = Ipv4Addr::from(stream.read_u32::<BigEndian>()?);
        let param_len = stream.read_u8()?;

        let mut param_bytes = vec![0u8; usize::from(param_len)];
        stream.read_exact(&mut param_bytes)?;
        let mut cursor = Cursor::new(param_bytes);

        let mut capabilities = Capabilities::default();
        let mut other_parameters = Vec::new();

        while (cursor.position() as usize) < param_bytes_len(param_len) {
            let param_type = cursor.read_u8()?;
            let param_length = cursor.read_u8()?;
            let mut value = vec![0u8; usize::from(param_length)];
            cursor.read_exact(&mut value)?;

            if param_type == 2 {
                capabilities.absorb(&value)?;
            } else {
                other_parameters.push((param_type, value));
            }
        }

        Ok(Open {
            version,
            peer_asn,
            hold_timer,
            identifier,
            capabilities,
            other_parameters,
        })
    }

    /// Encodes the OPEN body: non-capability parameters first, then one
    /// parameter-type-2 envelope per capability value, in label order.
    pub fn encode(&self, buf: &mut impl Write) -> Result<()> {
        buf.write_u8(self.version)?;
        buf.write_u16::<BigEndian>(self.peer_asn)?;
        buf.write_u16::<BigEndian>(self.hold_timer)?;
        buf.write_all(&self.identifier.octets())?;

        let mut params = Vec::with_capacity(16);
        for (param_type, value) in &self.other_parameters {
            params.write_u8(*param_type)?;
            params.write_u8(value.len() as u8)?;
            params.write_all(value)?;
        }
        self.capabilities.emit(&mut params)?;

        if params.len() > std::u8::MAX as usize {
            return Err(Error::MalformedAttribute(format!(
                "OPEN optional-parameter block of {} bytes does not fit in one byte",
                params.len()
            )));
        }
        buf.write_u8(params.len() as u8)?;
        buf.write_all(&params)?;
        Ok(())
    }
}

fn param_bytes_len(param_len: u8) -> usize {
    usize::from(param_len)
}

/// The four capability codes this crate recognizes, each kept as an
/// ordered, multiplicity-preserving collection — a peer may legally send
/// the same capability more than once (e.g. one `mbgp` entry per
/// address family).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Code 1: multiprotocol extension, one `(afi, safi)` per occurrence.
    pub mbgp: Vec<(AFI, SAFI)>,
    /// Code 2: route refresh. Carries no value; only its occurrence count
    /// is meaningful.
    pub refresh_count: usize,
    /// Code 64: graceful restart, kept as the raw capability value since
    /// this crate does not implement graceful-restart machinery.
    pub graceful_restart: Vec<Vec<u8>>,
    /// Code 65: 4-octet ASN support, carrying the advertised ASN.
    pub four_byte_asn: Vec<u32>,
}

impl Capabilities {
    fn absorb(&mut self, parameter_value: &[u8]) -> Result<()> {
        let mut cursor = Cursor::new(parameter_value);
        let total = parameter_value.len() as u64;
        while cursor.position() < total {
            let cap_code = cursor.read_u8()?;
            let cap_length = cursor.read_u8()?;
            let mut value = vec![0u8; usize::from(cap_length)];
            cursor.read_exact(&mut value)?;

            match cap_code {
                1 => {
                    if cap_length != 4 {
                        return Err(Error::MalformedAttribute(
                            "multiprotocol capability must be 4 bytes".to_string(),
                        ));
                    }
                    let afi = AFI::try_from(u16::from_be_bytes([value[0], value[1]]))?;
                    // value[2] is the RFC5492 reserved byte.
                    let safi = SAFI::try_from(value[3])?;
                    self.mbgp.push((afi, safi));
                }
                2 => self.refresh_count += 1,
                64 => self.graceful_restart.push(value),
                65 => {
                    if cap_length != 4 {
                        return Err(Error::MalformedAttribute(
                            "4-octet ASN capability must be 4 bytes".to_string(),
                        ));
                    }
                    self.four_byte_asn
                        .push(u32::from_be_bytes([value[0], value[1], value[2], value[3]]));
                }
                // Capability negotiation beyond these four codes is out of
                // scope; unrecognized capabilities are dropped.
                _ => {}
            }
        }
        Ok(())
    }

    fn emit(&self, params: &mut Vec<u8>) -> Result<()> {
        for (afi, safi) in &self.mbgp {
            let mut cap = Vec::with_capacity(4);
            cap.write_u16::<BigEndian>(*afi as u16)?;
            cap.write_u8(0)?;
            cap.write_u8(*safi as u8)?;
            Self::emit_one(params, 1, &cap)?;
        }
        for _ in 0..self.refresh_count {
            Self::emit_one(params, 2, &[])?;
        }
        for raw in &self.graceful_restart {
            Self::emit_one(params, 64, raw)?;
        }
        for asn in &self.four_byte_asn {
            Self::emit_one(params, 65, &asn.to_be_bytes())?;
        }
        Ok(())
    }

    fn emit_one(params: &mut Vec<u8>, cap_code: u8, value: &[u8]) -> Result<()> {
        let mut capability = Vec::with_capacity(2 + value.len());
        capability.write_u8(cap_code)?;
        capability.write_u8(value.len() as u8)?;
        capability.write_all(value)?;

        params.write_u8(2)?;
        params.write_u8(capability.len() as u8)?;
        params.write_all(&capability)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_decode_scenario() {
        let bytes: &[u8] = &[0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0xC0, 0xA8, 0x01, 0x01, 0x00];
        let mut cursor = Cursor::new(bytes);
        let open = Open::parse(&mut cursor).unwrap();
        assert_eq!(open.version, 4);
        assert_eq!(open.peer_asn, 0xDEAD);
        assert_eq!(open.hold_timer, 0xBEEF);
        assert_eq!(open.identifier, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(open.capabilities, Capabilities::default());
        assert!(open.other_parameters.is_empty());
    }

    #[test]
    fn open_roundtrip_with_capabilities() {
        let open = Open {
            version: 4,
            peer_asn: 65001,
            hold_timer: 90,
            identifier: Ipv4Addr::new(10, 0, 0, 1),
            capabilities: Capabilities {
                mbgp: vec![(AFI::IPv4, SAFI::Unicast), (AFI::IPv4, SAFI::MplsVpn)],
                refresh_count: 1,
                graceful_restart: vec![],
                four_byte_asn: vec![65001],
            },
            other_parameters: vec![],
        };

        let mut bytes = Vec::new();
        open.encode(&mut bytes).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = Open::parse(&mut cursor).unwrap();
        assert_eq!(decoded, open);
    }

    #[test]
    fn multiprotocol_capability_preserves_multiplicity_and_order() {
        let open = Open {
            version: 4,
            peer_asn: 1,
            hold_timer: 30,
            identifier: Ipv4Addr::new(1, 1, 1, 1),
            capabilities: Capabilities {
                mbgp: vec![
                    (AFI::IPv4, SAFI::Unicast),
                    (AFI::IPv4, SAFI::MplsVpn),
                    (AFI::IPv4, SAFI::Unicast),
                ],
                ..Capabilities::default()
            },
            other_parameters: vec![],
        };
        let mut bytes = Vec::new();
        open.encode(&mut bytes).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = Open::parse(&mut cursor).unwrap();
        assert_eq!(decoded.capabilities.mbgp, open.capabilities.mbgp);
    }
}
