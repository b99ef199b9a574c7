//! The bit-packed prefix encodings carried inside UPDATE and
//! MP-REACH/MP-UNREACH NLRI: plain IPv4 unicast and labeled VPN-IPv4
//! (RFC4364).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::fmt::{self, Debug, Display, Formatter};
use std::io::{Cursor, Read, Write};
use std::net::Ipv4Addr;

use crate::error::Error;
use crate::{Result, AFI, SAFI};

/// An IPv4 unicast prefix: an address paired with a prefix length in
/// `[0, 32]`. Host bits beyond `length` are preserved as decoded (or zeroed,
/// for freshly constructed values).
#[derive(Clone, Eq, PartialEq)]
pub struct Prefix {
    /// Prefix length in bits, 0..=32.
    pub length: u8,
    /// The address octets actually carried on the wire: `ceil(length/8)` of
    /// them, most-significant first.
    pub octets: Vec<u8>,
}

impl Prefix {
    /// Builds a prefix from a length and the full 4-byte address, trimming
    /// to the octets the wire form would carry.
    pub fn new(length: u8, address: Ipv4Addr) -> Self {
        let full = address.octets();
        let n = Self::octet_length(length);
        Prefix {
            length,
            octets: full[..n].to_vec(),
        }
    }

    fn octet_length(length: u8) -> usize {
        (length as usize + 7) / 8
    }

    /// The slice of address octets the wire form carries for this prefix's
    /// length — exactly what [`Prefix::parse`] read and what
    /// [`Prefix::encode`] writes back out.
    pub fn masked_octets(&self) -> &[u8] {
        &self.octets
    }

    /// Zero-extends the stored octets to a full 4-byte address.
    pub fn address(&self) -> Ipv4Addr {
        let mut buffer = [0u8; 4];
        buffer[..self.octets.len()].copy_from_slice(&self.octets);
        Ipv4Addr::from(buffer)
    }

    /// Reads one length byte followed by `ceil(length/8)` address bytes.
    pub fn parse(stream: &mut impl Read) -> Result<Prefix> {
        let length = stream.read_u8()?;
        if length > 32 {
            return Err(Error::MalformedAttribute(format!(
                "bogus IPv4 prefix length {}",
                length
            )));
        }
        let mut octets = vec![0u8; Self::octet_length(length)];
        stream.read_exact(&mut octets)?;
        Ok(Prefix { length, octets })
    }

    /// Writes the length byte and masked octets.
    pub fn encode(&self, stream: &mut impl Write) -> Result<()> {
        stream.write_u8(self.length)?;
        stream.write_all(&self.octets)?;
        Ok(())
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.length)
    }
}

impl Debug for Prefix {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.length)
    }
}

/// The MPLS label stack carried by a VPNv4 prefix, or the withdraw
/// sentinel. Kept as a tagged enum rather than the wire's in-band
/// `80 00 00` value.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Labels {
    /// The route is being withdrawn; no label stack is meaningful.
    Withdraw,
    /// An ordered label stack, bottom-of-stack implied by the last entry.
    Stack(Vec<u32>),
}

/// A labeled VPN-IPv4 prefix (RFC4364): a label stack, a route
/// distinguisher, and an IPv4 prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VpnPrefix {
    /// MPLS label stack, or the withdraw sentinel.
    pub labels: Labels,
    /// Route distinguisher, rendered as `"A.B.C.D:N"` (type 1) or `"M:N"`
    /// (type 0).
    pub rd: String,
    /// The IPv4 prefix carried after the route distinguisher.
    pub prefix: Prefix,
}

impl VpnPrefix {
    /// The canonical all-zero VPNv4 prefix `from_bytes` produces for the
    /// degenerate `plen == 0` input.
    fn empty() -> Self {
        VpnPrefix {
            labels: Labels::Stack(Vec::new()),
            rd: "0:0".to_string(),
            prefix: Prefix {
                length: 0,
                octets: Vec::new(),
            },
        }
    }

    fn encode_rd(rd: &str) -> Result<[u8; 8]> {
        let (left, right) = rd.split_once(':').ok_or_else(|| {
            Error::MalformedAttribute(format!("route distinguisher {:?} has no ':'", rd))
        })?;
        let mut out = [0u8; 8];
        if left.contains('.') {
            let ip: Ipv4Addr = left
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RD address {:?}", left)))?;
            let value: u16 = right
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RD value {:?}", right)))?;
            out[0..2].copy_from_slice(&1u16.to_be_bytes());
            out[2..6].copy_from_slice(&ip.octets());
            out[6..8].copy_from_slice(&value.to_be_bytes());
        } else {
            let asn: u16 = left
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RD ASN {:?}", left)))?;
            let value: u32 = right
                .parse()
                .map_err(|_| Error::MalformedAttribute(format!("bad RD value {:?}", right)))?;
            out[0..2].copy_from_slice(&0u16.to_be_bytes());
            out[2..4].copy_from_slice(&asn.to_be_bytes());
            out[4..8].copy_from_slice(&value.to_be_bytes());
        }
        Ok(out)
    }

    fn decode_rd(bytes: &[u8; 8]) -> String {
        let rd_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        if rd_type == 1 {
            let ip = Ipv4Addr::new(bytes[2], bytes[3], bytes[4], bytes[5]);
            let value = u16::from_be_bytes([bytes[6], bytes[7]]);
            format!("{}:{}", ip, value)
        } else {
            let asn = u16::from_be_bytes([bytes[2], bytes[3]]);
            let value = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            format!("{}:{}", asn, value)
        }
    }

    /// Encodes the length-prefixed VPNv4 unit: bit-count byte, labels,
    /// route distinguisher, truncated prefix.
    ///
    /// An empty label stack is the canonical empty VPNv4 prefix and is
    /// encoded as a bare `0x00` bit-count byte with no body; encoding it as
    /// a stack-with-zero-labels frame instead would misparse the RD bytes
    /// that follow as a label group on decode.
    pub fn encode(&self, stream: &mut impl Write) -> Result<()> {
        if let Labels::Stack(labels) = &self.labels {
            if labels.is_empty() {
                stream.write_u8(0)?;
                return Ok(());
            }
        }

        let mut body = Vec::with_capacity(16);
        let mut bits: u16 = 0;

        match &self.labels {
            Labels::Withdraw => {
                body.extend_from_slice(&[0x80, 0x00, 0x00]);
                bits += 24;
            }
            Labels::Stack(labels) => {
                let last = labels.len().saturating_sub(1);
                for (i, label) in labels.iter().enumerate() {
                    let mut shifted = label << 4;
                    if i == last {
                        shifted |= 1;
                    }
                    body.push((shifted >> 16) as u8);
                    body.push((shifted >> 8) as u8);
                    body.push(shifted as u8);
                    bits += 24;
                }
            }
        }

        body.extend_from_slice(&Self::encode_rd(&self.rd)?);
        bits += 64;

        body.extend_from_slice(self.prefix.masked_octets());
        bits += u16::from(self.prefix.length);

        stream.write_u8(bits as u8)?;
        stream.write_all(&body)?;
        Ok(())
    }

    /// Decodes a VPNv4 unit given the leading bit-count byte and the bytes
    /// that follow it.
    pub fn parse(plen: u8, stream: &mut impl Read) -> Result<VpnPrefix> {
        if plen == 0 {
            return Ok(Self::empty());
        }
        let mut remaining_bits = i32::from(plen);

        let mut labels = Vec::new();
        let mut withdraw = false;
        loop {
            let mut group = [0u8; 3];
            stream.read_exact(&mut group)?;
            remaining_bits -= 24;
            if group == [0x80, 0x00, 0x00] {
                withdraw = true;
                break;
            }
            let value = (u32::from(group[0]) << 16) | (u32::from(group[1]) << 8) | u32::from(group[2]);
            let bottom_of_stack = value & 1 == 1;
            labels.push(value >> 4);
            if bottom_of_stack {
                break;
            }
            if remaining_bits < 0 {
                return Err(Error::MalformedAttribute(
                    "VPNv4 label stack overran its bit count".to_string(),
                ));
            }
        }

        let mut rd_bytes = [0u8; 8];
        stream.read_exact(&mut rd_bytes)?;
        remaining_bits -= 64;
        if remaining_bits < 0 {
            return Err(Error::MalformedAttribute(
                "VPNv4 bit count too short for route distinguisher".to_string(),
            ));
        }
        let rd = Self::decode_rd(&rd_bytes);

        let prefix_length = remaining_bits as u8;
        let mut octets = vec![0u8; Prefix::octet_length(prefix_length)];
        stream.read_exact(&mut octets)?;

        Ok(VpnPrefix {
            labels: if withdraw {
                Labels::Withdraw
            } else {
                Labels::Stack(labels)
            },
            rd,
            prefix: Prefix {
                length: prefix_length,
                octets,
            },
        })
    }
}

/// Either shape of NLRI this crate understands, tagged by which codec
/// produced it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NLRIEncoding {
    /// Plain IPv4 unicast (AFI=1, SAFI=1).
    IP(Prefix),
    /// Labeled VPN-IPv4 (AFI=1, SAFI=128).
    Vpn(VpnPrefix),
}

impl NLRIEncoding {
    /// Parses prefixes from `bytes` until exhausted, selecting the IPv4 or
    /// VPNv4 codec from `(afi, safi)`.
    pub fn parse_all(bytes: &[u8], afi: AFI, safi: SAFI) -> Result<Vec<NLRIEncoding>> {
        let mut cursor = Cursor::new(bytes);
        let mut routes = Vec::new();
        let total = bytes.len() as u64;
        while cursor.position() < total {
            routes.push(Self::parse_one(&mut cursor, afi, safi)?);
        }
        Ok(routes)
    }

    fn parse_one(cursor: &mut Cursor<&[u8]>, afi: AFI, safi: SAFI) -> Result<NLRIEncoding> {
        match (afi, safi) {
            (AFI::IPv4, SAFI::MplsVpn) => {
                let plen = cursor.read_u8()?;
                Ok(NLRIEncoding::Vpn(VpnPrefix::parse(plen, cursor)?))
            }
            _ => Ok(NLRIEncoding::IP(Prefix::parse(cursor)?)),
        }
    }

    /// Encodes this prefix onto `stream`.
    pub fn encode(&self, stream: &mut impl Write) -> Result<()> {
        match self {
            NLRIEncoding::IP(prefix) => prefix.encode(stream),
            NLRIEncoding::Vpn(vpn) => vpn.encode(stream),
        }
    }
}

/// The value carried by a `mp-reach-nlri` path attribute: AFI/SAFI, the
/// next hop, and the announced routes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MPReachNLRI {
    /// Address family of the announced routes.
    pub afi: AFI,
    /// Subsequent address family of the announced routes.
    pub safi: SAFI,
    /// The next hop, IPv4-only: for VPNv4 the wire carries an 8-byte zero
    /// route distinguisher ahead of it, stripped here.
    pub next_hop: Ipv4Addr,
    /// The reserved byte that follows the next hop on the wire. Preserved
    /// so re-encoding is exact; `0` unless a nonzero value was observed.
    pub reserved: u8,
    /// Routes being announced.
    pub announced_routes: Vec<NLRIEncoding>,
}

impl MPReachNLRI {
    pub(crate) fn parse(stream: &mut impl Read, length: u16) -> Result<MPReachNLRI> {
        let afi = AFI::try_from(stream.read_u16::<BigEndian>()?)?;
        let safi = SAFI::try_from(stream.read_u8()?)?;

        let next_hop_length = stream.read_u8()?;
        let mut next_hop_bytes = vec![0u8; usize::from(next_hop_length)];
        stream.read_exact(&mut next_hop_bytes)?;
        // VPNv4 next hops are prefixed with an 8-byte zero RD; the textual
        // form keeps only the trailing IPv4 address.
        let next_hop = match next_hop_bytes.len() {
            4 => Ipv4Addr::new(
                next_hop_bytes[0],
                next_hop_bytes[1],
                next_hop_bytes[2],
                next_hop_bytes[3],
            ),
            12 => Ipv4Addr::new(
                next_hop_bytes[8],
                next_hop_bytes[9],
                next_hop_bytes[10],
                next_hop_bytes[11],
            ),
            other => {
                return Err(Error::MalformedAttribute(format!(
                    "unsupported mp-reach-nlri next hop length {}",
                    other
                )))
            }
        };

        let reserved = stream.read_u8()?;

        let nlri_length = length
            .checked_sub(5 + u16::from(next_hop_length))
            .ok_or_else(|| Error::MalformedAttribute("mp-reach-nlri shorter than its header".to_string()))?;
        let mut buffer = vec![0u8; usize::from(nlri_length)];
        stream.read_exact(&mut buffer)?;

        let announced_routes = NLRIEncoding::parse_all(&buffer, afi, safi)?;

        Ok(MPReachNLRI {
            afi,
            safi,
            next_hop,
            reserved,
            announced_routes,
        })
    }

    pub(crate) fn encode(&self, stream: &mut impl Write) -> Result<()> {
        stream.write_u16::<BigEndian>(self.afi as u16)?;
        stream.write_u8(self.safi as u8)?;
        match self.safi {
            SAFI::MplsVpn => {
                stream.write_u8(12)?;
                stream.write_all(&[0u8; 8])?;
                stream.write_all(&self.next_hop.octets())?;
            }
            SAFI::Unicast => {
                stream.write_u8(4)?;
                stream.write_all(&self.next_hop.octets())?;
            }
        }
        stream.write_u8(self.reserved)?;
        for route in &self.announced_routes {
            route.encode(stream)?;
        }
        Ok(())
    }
}

/// The value carried by a `mp-unreach-nlri` path attribute: AFI/SAFI and
/// the withdrawn routes. Has no next hop.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MPUnreachNLRI {
    /// Address family of the withdrawn routes.
    pub afi: AFI,
    /// Subsequent address family of the withdrawn routes.
    pub safi: SAFI,
    /// Routes being withdrawn.
    pub withdrawn_routes: Vec<NLRIEncoding>,
}

impl MPUnreachNLRI {
    pub(crate) fn parse(stream: &mut impl Read, length: u16) -> Result<MPUnreachNLRI> {
        let afi = AFI::try_from(stream.read_u16::<BigEndian>()?)?;
        let safi = SAFI::try_from(stream.read_u8()?)?;

        let nlri_length = length
            .checked_sub(3)
            .ok_or_else(|| Error::MalformedAttribute("mp-unreach-nlri shorter than its header".to_string()))?;
        let mut buffer = vec![0u8; usize::from(nlri_length)];
        stream.read_exact(&mut buffer)?;

        let withdrawn_routes = NLRIEncoding::parse_all(&buffer, afi, safi)?;

        Ok(MPUnreachNLRI {
            afi,
            safi,
            withdrawn_routes,
        })
    }

    pub(crate) fn encode(&self, stream: &mut impl Write) -> Result<()> {
        stream.write_u16::<BigEndian>(self.afi as u16)?;
        stream.write_u8(self.safi as u8)?;
        for route in &self.withdrawn_routes {
            route.encode(stream)?;
        }
        Ok(())
    }
}
