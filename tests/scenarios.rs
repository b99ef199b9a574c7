use std::io::Cursor;
use std::net::Ipv4Addr;

use bgpwire::{
    Header, Labels, Message, NLRIEncoding, Open, Origin, PathAttribute, Prefix, Update, AFI,
    MARKER, SAFI,
};

fn decode_message(bytes: Vec<u8>) -> Message {
    let mut cursor = Cursor::new(bytes);
    let header = Header::parse(&mut cursor).unwrap();
    Message::parse(&header, &mut cursor).unwrap()
}

#[test]
fn open_decode_over_the_wire() {
    let mut body = vec![0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0xC0, 0xA8, 0x01, 0x01, 0x00];
    let mut bytes = MARKER.to_vec();
    bytes.extend_from_slice(&(19 + body.len() as u16).to_be_bytes());
    bytes.push(1);
    bytes.append(&mut body);

    match decode_message(bytes) {
        Message::Open(open) => {
            assert_eq!(open.version, 4);
            assert_eq!(open.peer_asn, 0xDEAD);
            assert_eq!(open.hold_timer, 0xBEEF);
            assert_eq!(open.identifier, Ipv4Addr::new(192, 168, 1, 1));
            assert_eq!(open.capabilities.mbgp.len(), 0);
            assert!(open.other_parameters.is_empty());
        }
        other => panic!("expected OPEN, got {:?}", other),
    }
}

#[test]
fn mp_reach_vpnv4_decode_scenario() {
    let mut nlri = Vec::new();
    for (label, last) in [(0x6Fu32, false), (0xDEu32, false), (0x14Du32, true)] {
        let mut shifted = label << 4;
        if last {
            shifted |= 1;
        }
        nlri.push((shifted >> 16) as u8);
        nlri.push((shifted >> 8) as u8);
        nlri.push(shifted as u8);
    }
    // route distinguisher "192.168.0.0:2", type 0 (asn-form is not used here;
    // the scenario's RD decodes through the dotted/type-1 branch).
    nlri.extend_from_slice(&1u16.to_be_bytes());
    nlri.extend_from_slice(&Ipv4Addr::new(192, 168, 0, 0).octets());
    nlri.extend_from_slice(&2u16.to_be_bytes());
    nlri.extend_from_slice(&[0xC0, 0xA8, 0x02, 0x80]);

    let prefix_bitlen = 3 * 24 + 64 + 25;
    let mut value = Vec::new();
    value.extend_from_slice(&1u16.to_be_bytes()); // afi
    value.push(128); // safi
    value.push(12); // next hop length
    value.extend_from_slice(&[0u8; 8]);
    value.extend_from_slice(&Ipv4Addr::new(192, 168, 1, 1).octets());
    value.push(0); // reserved
    value.push(prefix_bitlen as u8);
    value.extend_from_slice(&nlri);

    let mut attr_bytes = vec![0x00, 14, value.len() as u8];
    attr_bytes.extend_from_slice(&value);

    let mut cursor = Cursor::new(attr_bytes);
    let attribute = PathAttribute::parse(&mut cursor).unwrap();
    match attribute {
        PathAttribute::MP_REACH_NLRI(mp_reach, _) => {
            assert_eq!(mp_reach.afi, AFI::IPv4);
            assert_eq!(mp_reach.safi, SAFI::MplsVpn);
            assert_eq!(mp_reach.next_hop, Ipv4Addr::new(192, 168, 1, 1));
            assert_eq!(mp_reach.announced_routes.len(), 1);
            match &mp_reach.announced_routes[0] {
                NLRIEncoding::Vpn(vpn) => {
                    assert_eq!(vpn.labels, Labels::Stack(vec![0x6F, 0xDE, 0x14D]));
                    assert_eq!(vpn.rd, "192.168.0.0:2");
                    assert_eq!(vpn.prefix.to_string(), "192.168.2.128/25");
                }
                other => panic!("expected a VPNv4 route, got {:?}", other),
            }
        }
        other => panic!("expected mp-reach-nlri, got {:?}", other),
    }
}

#[test]
fn mp_unreach_withdraw_all_scenario() {
    let mut nlri = vec![0x80, 0x00, 0x00];
    nlri.extend_from_slice(&1u16.to_be_bytes());
    nlri.extend_from_slice(&Ipv4Addr::new(192, 168, 0, 0).octets());
    nlri.extend_from_slice(&2u16.to_be_bytes());
    nlri.extend_from_slice(&[0xC0, 0xA8, 0x02, 0x80]);

    let prefix_bitlen = 24 + 64 + 25;
    let mut value = Vec::new();
    value.extend_from_slice(&1u16.to_be_bytes());
    value.push(128);
    value.push(prefix_bitlen as u8);
    value.extend_from_slice(&nlri);

    let mut attr_bytes = vec![0x00, 15, value.len() as u8];
    attr_bytes.extend_from_slice(&value);

    let mut cursor = Cursor::new(attr_bytes);
    match PathAttribute::parse(&mut cursor).unwrap() {
        PathAttribute::MP_UNREACH_NLRI(mp_unreach, _) => {
            assert_eq!(mp_unreach.withdrawn_routes.len(), 1);
            match &mp_unreach.withdrawn_routes[0] {
                NLRIEncoding::Vpn(vpn) => {
                    assert_eq!(vpn.labels, Labels::Withdraw);
                    assert_eq!(vpn.rd, "192.168.0.0:2");
                    assert_eq!(vpn.prefix.to_string(), "192.168.2.128/25");
                }
                other => panic!("expected a VPNv4 route, got {:?}", other),
            }
        }
        other => panic!("expected mp-unreach-nlri, got {:?}", other),
    }
}

#[test]
fn framed_update_roundtrips_through_message_codec() {
    let update = Update {
        withdrawn_routes: vec![],
        attributes: vec![
            PathAttribute::origin(Origin::IGP),
            PathAttribute::next_hop(Ipv4Addr::new(10, 0, 0, 1)),
            PathAttribute::med(10),
        ],
        announced_routes: vec![NLRIEncoding::IP(Prefix::new(24, Ipv4Addr::new(203, 0, 113, 0)))],
    };
    let message = Message::Update(update.clone());

    let mut bytes = Vec::new();
    message.encode(&mut bytes).unwrap();
    assert_eq!(bytes.len(), 19 + {
        let mut body = Vec::new();
        update.encode(&mut body).unwrap();
        body.len()
    });

    match decode_message(bytes) {
        Message::Update(decoded) => assert_eq!(decoded, update),
        other => panic!("expected UPDATE, got {:?}", other),
    }
}

#[test]
fn open_roundtrips_through_message_codec() {
    let open = Open {
        version: 4,
        peer_asn: 64512,
        hold_timer: 180,
        identifier: Ipv4Addr::new(172, 16, 0, 1),
        capabilities: {
            let mut caps = bgpwire::Capabilities::default();
            caps.mbgp.push((AFI::IPv4, SAFI::MplsVpn));
            caps.refresh_count = 1;
            caps.four_byte_asn.push(64512);
            caps
        },
        other_parameters: vec![],
    };
    let message = Message::Open(open.clone());
    let mut bytes = Vec::new();
    message.encode(&mut bytes).unwrap();

    match decode_message(bytes) {
        Message::Open(decoded) => assert_eq!(decoded, open),
        other => panic!("expected OPEN, got {:?}", other),
    }
}
