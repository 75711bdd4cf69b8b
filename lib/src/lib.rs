//! Wire codecs for PROFINET discovery and simulated real-time traffic.
//!
//! Everything in this crate is pure: frames are encoded into and decoded from
//! byte buffers, nothing touches a network adapter.

mod address;
mod connect;
mod dcp;
mod rt;

mod field {
    pub type SmallField = usize;
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

pub use address::*;
pub use connect::*;
pub use dcp::*;
pub use rt::*;

pub use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// EtherType reserved for the PROFINET protocol family.
pub const ETHERTYPE_PROFINET: u16 = 0x8892;
/// 802.1Q tag protocol identifier.
pub const ETHERTYPE_VLAN: u16 = 0x8100;

/// Smallest Ethernet frame the medium accepts, without the frame check sequence.
pub const ETHERNET_MIN_FRAME_LEN: usize = 60;

/// Largest payload one Ethernet frame carries after its EtherType.
pub const ETHERNET_MAX_PAYLOAD_LEN: usize = 1500;

/// Zero-pads `frame` up to [`ETHERNET_MIN_FRAME_LEN`].
pub fn pad_to_min_frame(frame: &mut Vec<u8>) {
    if frame.len() < ETHERNET_MIN_FRAME_LEN {
        frame.resize(ETHERNET_MIN_FRAME_LEN, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_min_frame() {
        let mut short = vec![0xaa; 20];
        pad_to_min_frame(&mut short);
        assert_eq!(short.len(), ETHERNET_MIN_FRAME_LEN);
        assert_eq!(&short[..20], &[0xaa; 20]);
        assert!(short[20..].iter().all(|b| *b == 0));

        let mut long = vec![0x55; 80];
        pad_to_min_frame(&mut long);
        assert_eq!(long.len(), 80);
    }
}
