//! The UPDATE message body: withdrawn routes, path attributes, and
//! announced routes.

/// Path-attribute flag/type/length framing and the recognized value codecs.
pub mod attributes;
/// NLRI prefix codecs: plain IPv4 unicast and labeled VPN-IPv4.
pub mod nlri;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::io::{Cursor, Read, Write};

use crate::error::Error;
use crate::update::attributes::{Identifier, PathAttribute};
use crate::update::nlri::NLRIEncoding;
use crate::{Header, Result, AFI, SAFI};

/// A BGP UPDATE message.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Routes being withdrawn.
    pub withdrawn_routes: Vec<NLRIEncoding>,
    /// The path attributes attached to the announced routes. Duplicates of
    /// the same attribute type are resolved last-wins.
    pub attributes: Vec<PathAttribute>,
    /// Routes being announced.
    pub announced_routes: Vec<NLRIEncoding>,
}

impl Update {
    /// Decodes an UPDATE body: withdrawn-routes block, path-attributes
    /// block, then the remaining bytes as announced NLRI.
    pub fn parse(header: &Header, stream: &mut impl Read) -> Result<Update> {
        if header.length < 23 {
            return Err(Error::MalformedAttribute(format!(
                "UPDATE header length {} is shorter than the fixed blocks it must contain",
                header.length
            )));
        }
        let mut remaining = header.length as usize - 23;

        let withdraw_len = stream.read_u16::<BigEndian>()? as usize;
        if withdraw_len > remaining {
            return Err(Error::MalformedAttribute(format!(
                "withdrawn-routes length {} exceeds the UPDATE body",
                withdraw_len
            )));
        }
        let mut withdraw_buffer = vec![0u8; withdraw_len];
        stream.read_exact(&mut withdraw_buffer)?;
        remaining -= withdraw_len;
        let withdrawn_routes = NLRIEncoding::parse_all(&withdraw_buffer, AFI::IPv4, SAFI::Unicast)?;

        let attr_len = stream.read_u16::<BigEndian>()? as usize;
        if attr_len > remaining {
            return Err(Error::MalformedAttribute(format!(
                "path-attribute length {} exceeds the UPDATE body",
                attr_len
            )));
        }
        let mut attr_buffer = vec![0u8; attr_len];
        stream.read_exact(&mut attr_buffer)?;
        remaining -= attr_len;

        let mut cursor = Cursor::new(attr_buffer);
        let mut by_id: Vec<(Identifier, PathAttribute)> = Vec::with_capacity(8);
        while (cursor.position() as usize) < attr_len {
            let attribute = PathAttribute::parse(&mut cursor)?;
            let id = attribute.id();
            // Last-wins: a repeated type code overwrites the earlier value
            // rather than producing an error.
            match by_id.iter_mut().find(|(existing, _)| *existing == id) {
                Some(slot) => slot.1 = attribute,
                None => by_id.push((id, attribute)),
            }
        }
        let attributes: Vec<PathAttribute> = by_id.into_iter().map(|(_, attr)| attr).collect();

        let mut nlri_buffer = vec![0u8; remaining];
        stream.read_exact(&mut nlri_buffer)?;
        let announced_routes = NLRIEncoding::parse_all(&nlri_buffer, AFI::IPv4, SAFI::Unicast)?;

        Ok(Update {
            withdrawn_routes,
            attributes,
            announced_routes,
        })
    }

    /// Encodes the UPDATE body: withdrawn-routes block, path-attributes
    /// block, then announced NLRI appended bare.
    pub fn encode(&self, buf: &mut impl Write) -> Result<()> {
        let mut withdrawn = Vec::new();
        for route in &self.withdrawn_routes {
            route.encode(&mut withdrawn)?;
        }
        buf.write_u16::<BigEndian>(withdrawn.len() as u16)?;
        buf.write_all(&withdrawn)?;

        let mut attributes = Vec::new();
        for attribute in &self.attributes {
            attribute.encode(&mut attributes)?;
        }
        buf.write_u16::<BigEndian>(attributes.len() as u16)?;
        buf.write_all(&attributes)?;

        for route in &self.announced_routes {
            route.encode(buf)?;
        }
        Ok(())
    }

    /// Returns the first attribute of the given type, if present.
    pub fn get(&self, identifier: Identifier) -> Option<&PathAttribute> {
        self.attributes.iter().find(|a| a.id() == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::attributes::Origin;
    use crate::update::nlri::Prefix;
    use std::net::Ipv4Addr;

    #[test]
    fn update_roundtrip() {
        let update = Update {
            withdrawn_routes: vec![NLRIEncoding::IP(Prefix::new(24, Ipv4Addr::new(10, 0, 0, 0)))],
            attributes: vec![
                PathAttribute::origin(Origin::IGP),
                PathAttribute::next_hop(Ipv4Addr::new(192, 168, 1, 1)),
            ],
            announced_routes: vec![NLRIEncoding::IP(Prefix::new(
                25,
                Ipv4Addr::new(172, 16, 0, 128),
            ))],
        };

        let mut bytes = Vec::new();
        update.encode(&mut bytes).unwrap();

        let header = Header {
            marker: crate::MARKER,
            length: 19 + bytes.len() as u16,
            record_type: 2,
        };
        let mut cursor = Cursor::new(bytes);
        let decoded = Update::parse(&header, &mut cursor).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn duplicate_attribute_is_last_wins() {
        let mut attr_bytes = Vec::new();
        PathAttribute::med(10).encode(&mut attr_bytes).unwrap();
        PathAttribute::med(20).encode(&mut attr_bytes).unwrap();

        let mut body = Vec::new();
        body.write_u16::<BigEndian>(0).unwrap(); // withdrawn length
        body.write_u16::<BigEndian>(attr_bytes.len() as u16).unwrap();
        body.write_all(&attr_bytes).unwrap();

        let header = Header {
            marker: crate::MARKER,
            length: 19 + body.len() as u16,
            record_type: 2,
        };
        let mut cursor = Cursor::new(body);
        let update = Update::parse(&header, &mut cursor).unwrap();
        assert_eq!(update.attributes.len(), 1);
        match &update.attributes[0] {
            PathAttribute::MULTI_EXIT_DISC(value, _) => assert_eq!(*value, 20),
            other => panic!("unexpected attribute {:?}", other),
        }
    }
}
