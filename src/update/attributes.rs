//! Path attributes: the flag/type/length framing shared by every attribute,
//! and the per-type value codecs for the recognized attributes.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::fmt::{self, Display, Formatter};
use std::io::{Cursor, Read, Write};
use std::net::Ipv4Addr;

use crate::error::Error;
use crate::update::nlri::{MPReachNLRI, MPUnreachNLRI};
use crate::Result;

const FLAG_EXTENDED_LENGTH: u8 = 0x10;

/// Identifies a path attribute's type code.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[allow(missing_docs)]
pub enum Identifier {
    ORIGIN,
    AS_PATH,
    NEXT_HOP,
    MULTI_EXIT_DISC,
    LOCAL_PREF,
    ORIGINATOR_ID,
    CLUSTER_LIST,
    MP_REACH_NLRI,
    MP_UNREACH_NLRI,
    EXTENDED_COMMUNITIES,
    /// Any type code not in the list above.
    Unknown(u8),
}

impl Identifier {
    fn from_code(code: u8) -> Identifier {
        match code {
            1 => Identifier::ORIGIN,
            2 => Identifier::AS_PATH,
            3 => Identifier::NEXT_HOP,
            4 => Identifier::MULTI_EXIT_DISC,
            5 => Identifier::LOCAL_PREF,
            9 => Identifier::ORIGINATOR_ID,
            10 => Identifier::CLUSTER_LIST,
            14 => Identifier::MP_REACH_NLRI,
            15 => Identifier::MP_UNREACH_NLRI,
            16 => Identifier::EXTENDED_COMMUNITIES,
            other => Identifier::Unknown(other),
        }
    }

    fn code(self) -> u8 {
        match self {
            Identifier::ORIGIN => 1,
            Identifier::AS_PATH => 2,
            Identifier::NEXT_HOP => 3,
            Identifier::MULTI_EXIT_DISC => 4,
            Identifier::LOCAL_PREF => 5,
            Identifier::ORIGINATOR_ID => 9,
            Identifier::CLUSTER_LIST => 10,
            Identifier::MP_REACH_NLRI => 14,
            Identifier::MP_UNREACH_NLRI => 15,
            Identifier::EXTENDED_COMMUNITIES => 16,
            Identifier::Unknown(code) => code,
        }
    }
}

/// A single path attribute. Recognized types carry their decoded value;
/// everything else is kept as an opaque, bit-exact passthrough.
///
/// Every variant carries the flag byte it was built or decoded with —
/// attribute-specific default flags (see the `origin`/`med`/... constructors)
/// apply only to freshly constructed values. Decoded attributes always
/// retain the flags they arrived with.
#[derive(Debug, Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum PathAttribute {
    /// How the route was generated. RFC4271.
    ORIGIN(Origin, u8),
    /// The path the announcement has traveled. RFC4271.
    AS_PATH(ASPath, u8),
    /// The next hop to reach the announced routes. RFC4271.
    NEXT_HOP(Ipv4Addr, u8),
    /// Discriminates among multiple exit/entry points. RFC4271.
    MULTI_EXIT_DISC(u32, u8),
    /// Degree of preference for internal routes. RFC4271.
    LOCAL_PREF(u32, u8),
    /// Address of the route reflector that reflected this route. RFC4456.
    ORIGINATOR_ID(Ipv4Addr, u8),
    /// Chain of route-reflector cluster IDs this route passed through. RFC4456.
    CLUSTER_LIST(Vec<Ipv4Addr>, u8),
    /// Multiprotocol reachable NLRI. RFC4760.
    MP_REACH_NLRI(MPReachNLRI, u8),
    /// Multiprotocol unreachable NLRI. RFC4760.
    MP_UNREACH_NLRI(MPUnreachNLRI, u8),
    /// Extended communities, rendered textually. RFC4360.
    EXTENDED_COMMUNITIES(Vec<String>, u8),
    /// Any attribute type this crate doesn't parse further. Preserves the
    /// exact bytes so re-encoding is bit-exact.
    Unknown {
        /// The attribute's type code.
        type_code: u8,
        /// The flag byte as observed on the wire.
        flags: u8,
        /// The raw attribute value.
        value: Vec<u8>,
    },
}

impl PathAttribute {
    /// Builds an ORIGIN attribute with its default flags (transitive).
    pub fn origin(value: Origin) -> PathAttribute {
        PathAttribute::ORIGIN(value, 0x40)
    }

    /// Builds an AS_PATH attribute with its default flags (transitive).
    pub fn as_path(value: ASPath) -> PathAttribute {
        PathAttribute::AS_PATH(value, 0x40)
    }

    /// Builds a NEXT_HOP attribute with its default flags (transitive).
    pub fn next_hop(value: Ipv4Addr) -> PathAttribute {
        PathAttribute::NEXT_HOP(value, 0x40)
    }

    /// Builds a MULTI_EXIT_DISC attribute with its default flags (optional,
    /// non-transitive).
    pub fn med(value: u32) -> PathAttribute {
        PathAttribute::MULTI_EXIT_DISC(value, 0x80)
    }

    /// Builds a LOCAL_PREF attribute with its default flags (well-known,
    /// transitive).
    pub fn local_pref(value: u32) -> PathAttribute {
        PathAttribute::LOCAL_PREF(value, 0xC0)
    }

    /// Reads one flag/type/length/value attribute from `stream`.
    pub fn parse(stream: &mut impl Read) -> Result<PathAttribute> {
        let flags = stream.read_u8()?;
        let code = stream.read_u8()?;

        let length: u16 = if flags & FLAG_EXTENDED_LENGTH == 0 {
            u16::from(stream.read_u8()?)
        } else {
            stream.read_u16::<BigEndian>()?
        };

        let mut value = vec![0u8; usize::from(length)];
        stream.read_exact(&mut value)?;
        let mut cursor = Cursor::new(value);

        let attribute = Self::parse_value(Identifier::from_code(code), flags, length, &mut cursor)?;
        Ok(attribute)
    }

    fn parse_value(
        identifier: Identifier,
        flags: u8,
        length: u16,
        cursor: &mut Cursor<Vec<u8>>,
    ) -> Result<PathAttribute> {
        match identifier {
            Identifier::ORIGIN => Ok(PathAttribute::ORIGIN(Origin::parse(cursor)?, flags)),
            Identifier::AS_PATH => Ok(PathAttribute::AS_PATH(ASPath::parse(cursor, length)?, flags)),
            Identifier::NEXT_HOP => {
                Ok(PathAttribute::NEXT_HOP(Ipv4Addr::from(cursor.read_u32::<BigEndian>()?), flags))
            }
            Identifier::MULTI_EXIT_DISC => {
                Ok(PathAttribute::MULTI_EXIT_DISC(cursor.read_u32::<BigEndian>()?, flags))
            }
            Identifier::LOCAL_PREF => Ok(PathAttribute::LOCAL_PREF(cursor.read_u32::<BigEndian>()?, flags)),
            Identifier::ORIGINATOR_ID => {
                Ok(PathAttribute::ORIGINATOR_ID(Ipv4Addr::from(cursor.read_u32::<BigEndian>()?), flags))
            }
            Identifier::CLUSTER_LIST => {
                let mut ids = Vec::with_capacity(usize::from(length / 4));
                for _ in 0..(length / 4) {
                    ids.push(Ipv4Addr::from(cursor.read_u32::<BigEndian>()?));
                }
                Ok(PathAttribute::CLUSTER_LIST(ids, flags))
            }
            Identifier::MP_REACH_NLRI => {
                Ok(PathAttribute::MP_REACH_NLRI(MPReachNLRI::parse(cursor, length)?, flags))
            }
            Identifier::MP_UNREACH_NLRI => {
                Ok(PathAttribute::MP_UNREACH_NLRI(MPUnreachNLRI::parse(cursor, length)?, flags))
            }
            Identifier::EXTENDED_COMMUNITIES => {
                let mut communities = Vec::with_capacity(usize::from(length / 8));
                for _ in 0..(length / 8) {
                    let mut raw = [0u8; 8];
                    cursor.read_exact(&mut raw)?;
                    communities.push(decode_community(raw));
                }
                Ok(PathAttribute::EXTENDED_COMMUNITIES(communities, flags))
            }
            Identifier::Unknown(type_code) => {
                let mut value = vec![0u8; usize::from(length)];
                cursor.read_exact(&mut value)?;
                Ok(PathAttribute::Unknown {
                    type_code,
                    flags,
                    value,
                })
            }
        }
    }

    /// The type code identifying this attribute.
    pub fn id(&self) -> Identifier {
        match self {
            PathAttribute::ORIGIN(..) => Identifier::ORIGIN,
            PathAttribute::AS_PATH(..) => Identifier::AS_PATH,
            PathAttribute::NEXT_HOP(..) => Identifier::NEXT_HOP,
            PathAttribute::MULTI_EXIT_DISC(..) => Identifier::MULTI_EXIT_DISC,
            PathAttribute::LOCAL_PREF(..) => Identifier::LOCAL_PREF,
            PathAttribute::ORIGINATOR_ID(..) => Identifier::ORIGINATOR_ID,
            PathAttribute::CLUSTER_LIST(..) => Identifier::CLUSTER_LIST,
            PathAttribute::MP_REACH_NLRI(..) => Identifier::MP_REACH_NLRI,
            PathAttribute::MP_UNREACH_NLRI(..) => Identifier::MP_UNREACH_NLRI,
            PathAttribute::EXTENDED_COMMUNITIES(..) => Identifier::EXTENDED_COMMUNITIES,
            PathAttribute::Unknown { type_code, .. } => Identifier::Unknown(*type_code),
        }
    }

    /// The flag byte this attribute carries (as decoded, or as synthesized
    /// at construction time).
    pub fn flags(&self) -> u8 {
        match self {
            PathAttribute::ORIGIN(_, flags)
            | PathAttribute::AS_PATH(_, flags)
            | PathAttribute::NEXT_HOP(_, flags)
            | PathAttribute::MULTI_EXIT_DISC(_, flags)
            | PathAttribute::LOCAL_PREF(_, flags)
            | PathAttribute::ORIGINATOR_ID(_, flags)
            | PathAttribute::CLUSTER_LIST(_, flags)
            | PathAttribute::MP_REACH_NLRI(_, flags)
            | PathAttribute::MP_UNREACH_NLRI(_, flags)
            | PathAttribute::EXTENDED_COMMUNITIES(_, flags) => *flags,
            PathAttribute::Unknown { flags, .. } => *flags,
        }
    }

    /// Encodes the attribute: per-type value, then the flag/type/length
    /// header, choosing extended length iff the value exceeds 255 bytes.
    pub fn encode(&self, buf: &mut impl Write) -> Result<()> {
        let mut value = Vec::with_capacity(8);
        match self {
            PathAttribute::ORIGIN(origin, _) => origin.encode(&mut value)?,
            PathAttribute::AS_PATH(as_path, _) => as_path.encode(&mut value)?,
            PathAttribute::NEXT_HOP(addr, _) => value.write_all(&addr.octets())?,
            PathAttribute::MULTI_EXIT_DISC(med, _) => value.write_u32::<BigEndian>(*med)?,
            PathAttribute::LOCAL_PREF(pref, _) => value.write_u32::<BigEndian>(*pref)?,
            PathAttribute::ORIGINATOR_ID(id, _) => value.write_all(&id.octets())?,
            PathAttribute::CLUSTER_LIST(ids, _) => {
                for id in ids {
                    value.write_all(&id.octets())?;
                }
            }
            PathAttribute::MP_REACH_NLRI(mp_reach, _) => mp_reach.encode(&mut value)?,
            PathAttribute::MP_UNREACH_NLRI(mp_unreach, _) => mp_unreach.encode(&mut value)?,
            PathAttribute::EXTENDED_COMMUNITIES(communities, _) => {
                for community in communities {
                    value.write_all(&encode_community(community)?)?;
                }
            }
            PathAttribute::Unknown { value: raw, .. } => value.extend_from_slice(raw),
        };

        let mut flags = self.flags();
        let extended_length = value.len() > std::u8::MAX as usize;
        if extended_length {
            flags |= FLAG_EXTENDED_LENGTH;
        } else {
            flags &= !FLAG_EXTENDED_LENGTH;
        }

        buf.write_u8(flags)?;
        buf.write_u8(self.id().code())?;
        if extended_length {
            buf.write_u16::<BigEndian>(value.len() as u16)?;
        } else {
            buf.write_u8(value.len() as u8)?;
        }
        buf.write_all(&value)?;
        Ok(())
    }
}

/// How an UPDATE's routes were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Generated by an Interior Gateway Protocol.
    IGP,
    /// Generated by an Exterior Gateway Protocol.
    EGP,
    /// Origin unknown or not otherwise categorized.
    INCOMPLETE,
    /// Any byte other than 0/1/2, preserved verbatim so re-encoding
    /// reproduces it.
    Other(u8),
}

impl Origin {
    fn parse(stream: &mut impl Read) -> Result<Origin> {
        match stream.read_u8()? {
            0 => Ok(Origin::IGP),
            1 => Ok(Origin::EGP),
            2 => Ok(Origin::INCOMPLETE),
            other => Ok(Origin::Other(other)),
        }
    }

    fn encode(&self, buf: &mut impl Write) -> Result<()> {
        let value: u8 = match self {
            Origin::IGP => 0,
            Origin::EGP => 1,
            Origin::INCOMPLETE => 2,
            Origin::Other(value) => *value,
        };
        buf.write_u8(value)?;
        Ok(())
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Origin::IGP => write!(f, "IGP"),
            Origin::EGP => write!(f, "EGP"),
            Origin::INCOMPLETE => write!(f, "Incomplete"),
            Origin::Other(value) => write!(f, "Unknown({})", value),
        }
    }
}

/// The AS path an announcement has traveled: an ordered list of segments,
/// each either an unordered set or an ordered sequence of 16-bit ASNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ASPath {
    /// The segments making up this path, in wire order.
    pub segments: Vec<Segment>,
}

impl ASPath {
    fn parse(stream: &mut impl Read, length: u16) -> Result<ASPath> {
        let mut remaining = length;
        let mut segments = Vec::new();
        while remaining > 0 {
            let segment_type = stream.read_u8()?;
            let count = stream.read_u8()?;
            let mut asns = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                asns.push(stream.read_u16::<BigEndian>()?);
            }
            remaining = remaining
                .checked_sub(2 + 2 * u16::from(count))
                .ok_or_else(|| Error::MalformedAttribute("aspath segment overran its length".to_string()))?;
            segments.push(match segment_type {
                1 => Segment::Set(asns),
                2 => Segment::Sequence(asns),
                other => {
                    return Err(Error::MalformedAttribute(format!(
                        "unknown aspath segment type {}",
                        other
                    )))
                }
            });
        }
        Ok(ASPath { segments })
    }

    /// Encodes every segment: type byte, count byte, that many 16-bit ASNs.
    pub fn encode(&self, buf: &mut impl Write) -> Result<()> {
        for segment in &self.segments {
            let (segment_type, asns) = match segment {
                Segment::Set(asns) => (1u8, asns),
                Segment::Sequence(asns) => (2u8, asns),
            };
            buf.write_u8(segment_type)?;
            buf.write_u8(asns.len() as u8)?;
            for asn in asns {
                buf.write_u16::<BigEndian>(*asn)?;
            }
        }
        Ok(())
    }

    /// The AS that originated the announcement — the last ASN of a trailing
    /// `Sequence` segment, or `None` if the path ends in a `Set`.
    pub fn origin(&self) -> Option<u16> {
        match self.segments.last()? {
            Segment::Sequence(asns) => asns.last().copied(),
            Segment::Set(_) => None,
        }
    }
}

/// One segment of an AS_PATH: an unordered set or an ordered sequence of
/// 16-bit ASNs. Do not rely on iteration order of `Set`; compare as
/// multisets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An unordered AS_SET (segment type 1).
    Set(Vec<u16>),
    /// An ordered AS_SEQUENCE (segment type 2).
    Sequence(Vec<u16>),
}

fn decode_community(bytes: [u8; 8]) -> String {
    let community_type = bytes[0];
    let subtype = bytes[1];
    let payload = &bytes[2..8];
    match (community_type, subtype) {
        (0, 2) | (2, 2) => {
            let asnum = u16::from_be_bytes([payload[0], payload[1]]);
            let value = u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]);
            format!("RT:{}:{}", asnum, value)
        }
        (1, 2) => {
            let ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
            let value = u16::from_be_bytes([payload[4], payload[5]]);
            format!("RT:{}:{}", ip, value)
        }
        _ => {
            let mut hex = String::with_capacity(14);
            for b in &bytes[1..8] {
                hex.push_str(&format!("{:02x}", b));
            }
            format!("{}:{}", community_type, hex)
        }
    }
}

fn encode_community(value: &str) -> Result<[u8; 8]> {
    let mut out = [0u8; 8];
    if let Some(rest) = value.strip_prefix("RT:") {
        let (left, right) = rest.split_once(':').ok_or_else(|| {
            Error::MalformedAttribute(format!("malformed extended community {:?}", value))
        })?;
        if left.contains('.') {
            let ip: Ipv4Addr = left
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RT address {:?}", left)))?;
            let local: u16 = right
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RT value {:?}", right)))?;
            out[0] = 1;
            out[1] = 2;
            out[2..6].copy_from_slice(&ip.octets());
            out[6..8].copy_from_slice(&local.to_be_bytes());
        } else {
            let asnum: u16 = left
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RT ASN {:?}", left)))?;
            let local: u32 = right
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RT value {:?}", right)))?;
            out[0] = 0;
            out[1] = 2;
            out[2..4].copy_from_slice(&asnum.to_be_bytes());
            out[4..8].copy_from_slice(&local.to_be_bytes());
        }
    } else {
        let (type_str, hex_str) = value.split_once(':').ok_or_else(|| {
            Error::MalformedAttribute(format!("malformed extended community {:?}", value))
        })?;
        let community_type: u8 = type_str
            .parse()
            .map_err(|_| Error::MalformedAttribute(format!("bad community type {:?}", type_str)))?;
        if hex_str.len() != 14 {
            return Err(Error::MalformedAttribute(format!(
                "extended community payload {:?} is not 7 bytes of hex",
                hex_str
            )));
        }
        out[0] = community_type;
        for (i, chunk) in hex_str.as_bytes().chunks(2).enumerate() {
            let byte = std::str::from_utf8(chunk)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::MalformedAttribute(format!("bad hex in {:?}", hex_str)))?;
            out[1 + i] = byte;
        }
    }
    Ok(out)
}
