use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{
    EthernetAddress, EthernetFrame, EthernetProtocol, EthernetRepr, IpAddress, IpProtocol,
    Ipv4Address, Ipv4Packet, Ipv4Repr, UdpPacket, UdpRepr,
};

use crate::pad_to_min_frame;

/// UDP port of the PNIO context manager.
pub const PNIO_CM_PORT: u16 = 34964;
pub const CONNECT_SOURCE_PORT: u16 = 49153;
const CONNECT_HOP_LIMIT: u8 = 64;

/// Fixed probe payload: the leading bytes of a connectionless RPC request
/// header (version 4, request, idempotent, big-endian data representation).
pub const CONNECT_PAYLOAD: [u8; 16] = [
    0x04, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Minimal UDP datagram announcing a connect attempt to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDatagram {
    pub destination: EthernetAddress,
    pub source: EthernetAddress,
    pub source_ip: Ipv4Address,
    pub destination_ip: Ipv4Address,
    pub source_port: u16,
    pub destination_port: u16,
}

impl ConnectDatagram {
    pub fn new(
        destination: EthernetAddress,
        source: EthernetAddress,
        source_ip: Ipv4Address,
        destination_ip: Ipv4Address,
    ) -> Self {
        Self {
            destination,
            source,
            source_ip,
            destination_ip,
            source_port: CONNECT_SOURCE_PORT,
            destination_port: PNIO_CM_PORT,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let checksum_caps = ChecksumCapabilities::default();

        let eth_repr = EthernetRepr {
            src_addr: self.source,
            dst_addr: self.destination,
            ethertype: EthernetProtocol::Ipv4,
        };
        let udp_repr = UdpRepr {
            src_port: self.source_port,
            dst_port: self.destination_port,
        };
        let ip_repr = Ipv4Repr {
            src_addr: self.source_ip,
            dst_addr: self.destination_ip,
            next_header: IpProtocol::Udp,
            payload_len: udp_repr.header_len() + CONNECT_PAYLOAD.len(),
            hop_limit: CONNECT_HOP_LIMIT,
        };

        let mut buffer = vec![0; eth_repr.buffer_len() + ip_repr.buffer_len() + ip_repr.payload_len];

        let mut frame = EthernetFrame::new_unchecked(&mut buffer[..]);
        eth_repr.emit(&mut frame);

        let mut packet = Ipv4Packet::new_unchecked(frame.payload_mut());
        ip_repr.emit(&mut packet, &checksum_caps);

        let mut datagram = UdpPacket::new_unchecked(packet.payload_mut());
        udp_repr.emit(
            &mut datagram,
            &IpAddress::Ipv4(self.source_ip),
            &IpAddress::Ipv4(self.destination_ip),
            CONNECT_PAYLOAD.len(),
            |payload| payload.copy_from_slice(&CONNECT_PAYLOAD),
            &checksum_caps,
        );

        pad_to_min_frame(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_datagram() {
        let datagram = ConnectDatagram::new(
            EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            EthernetAddress([0x02, 0, 0, 0, 0, 1]),
            Ipv4Address::new(192, 168, 0, 10),
            Ipv4Address::new(192, 168, 0, 20),
        );

        let bytes = datagram.to_bytes();
        assert_eq!(bytes.len(), 60);

        let frame = EthernetFrame::new_checked(&bytes[..]).unwrap();
        assert_eq!(frame.dst_addr(), datagram.destination);
        assert_eq!(frame.src_addr(), datagram.source);
        assert_eq!(frame.ethertype(), EthernetProtocol::Ipv4);

        let packet = Ipv4Packet::new_checked(frame.payload()).unwrap();
        assert!(packet.verify_checksum());
        assert_eq!(packet.next_header(), IpProtocol::Udp);
        assert_eq!(packet.dst_addr(), Ipv4Address::new(192, 168, 0, 20));

        let udp = UdpPacket::new_checked(packet.payload()).unwrap();
        assert_eq!(udp.dst_port(), PNIO_CM_PORT);
        assert_eq!(udp.src_port(), CONNECT_SOURCE_PORT);
        assert_eq!(udp.payload(), CONNECT_PAYLOAD);
    }
}
