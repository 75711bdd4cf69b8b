use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::EthernetAddress;

use crate::field::{Field, Rest};
use crate::{pad_to_min_frame, ETHERTYPE_PROFINET, ETHERTYPE_VLAN};

mod block;
mod block_options;
mod error;
mod header;

pub use block::*;
pub use block_options::*;
pub use error::*;
pub use header::*;

/// Destination of multicast identify requests.
pub const DCP_MAC_IDENTIFY_ADDRESS: EthernetAddress =
    EthernetAddress([0x01, 0x0e, 0xcf, 0x00, 0x00, 0x00]);

const DESTINATION_FIELD: Field = 0..6;
const SOURCE_FIELD: Field = 6..12;
const TYPE_FIELD: Field = 12..14;
const PAYLOAD_FIELD: Rest = 14..;
const VLAN_TCI_FIELD: Field = 14..16;
const TYPE_VLAN_FIELD: Field = 16..18;
const PAYLOAD_VLAN_FIELD: Rest = 18..;

/// Ethernet view over a received buffer, looking through one 802.1Q tag.
pub struct DcpFrame<T: AsRef<[u8]>> {
    buffer: T,
    is_vlan: bool,
}

impl<T: AsRef<[u8]>> DcpFrame<T> {
    /// Checks the Ethernet header, the EtherType and the DCP header length.
    pub fn new_checked(buffer: T) -> Result<Self, ParseDcpError> {
        let actual = buffer.as_ref().len();
        if actual < PAYLOAD_FIELD.start {
            return Err(ParseDcpError::Truncated {
                needed: PAYLOAD_FIELD.start,
                actual,
            });
        }

        let outer = NetworkEndian::read_u16(&buffer.as_ref()[TYPE_FIELD]);
        let is_vlan = outer == ETHERTYPE_VLAN;

        if is_vlan && actual < PAYLOAD_VLAN_FIELD.start {
            return Err(ParseDcpError::Truncated {
                needed: PAYLOAD_VLAN_FIELD.start,
                actual,
            });
        }

        let frame = Self { buffer, is_vlan };

        let eth_type = frame.eth_type();
        if eth_type != ETHERTYPE_PROFINET {
            return Err(ParseDcpError::WrongEtherType(eth_type));
        }

        let needed = frame.payload_start() + DCP_HEADER_LENGTH;
        if actual < needed {
            return Err(ParseDcpError::Truncated { needed, actual });
        }

        Ok(frame)
    }

    pub fn is_vlan(&self) -> bool {
        self.is_vlan
    }

    pub fn destination(&self) -> EthernetAddress {
        let data = self.buffer.as_ref();
        EthernetAddress::from_bytes(&data[DESTINATION_FIELD])
    }

    pub fn source(&self) -> EthernetAddress {
        let data = self.buffer.as_ref();
        EthernetAddress::from_bytes(&data[SOURCE_FIELD])
    }

    pub fn vlan_tci(&self) -> Option<u16> {
        let data = self.buffer.as_ref();
        self.is_vlan
            .then(|| NetworkEndian::read_u16(&data[VLAN_TCI_FIELD]))
    }

    pub fn eth_type(&self) -> u16 {
        let data = self.buffer.as_ref();

        if self.is_vlan {
            NetworkEndian::read_u16(&data[TYPE_VLAN_FIELD])
        } else {
            NetworkEndian::read_u16(&data[TYPE_FIELD])
        }
    }

    fn payload_start(&self) -> usize {
        if self.is_vlan {
            PAYLOAD_VLAN_FIELD.start
        } else {
            PAYLOAD_FIELD.start
        }
    }

    pub fn payload(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[self.payload_start()..]
    }
}

/// A complete discovery frame: Ethernet addressing, DCP header and blocks.
///
/// `header.data_length` is kept equal to the encoded size of `blocks` by
/// [`add_block`](Dcp::add_block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dcp {
    pub destination: EthernetAddress,
    pub source: EthernetAddress,
    pub vlan: Option<u16>,
    pub header: DcpHeader,
    pub blocks: Vec<DcpBlock>,
}

impl Dcp {
    pub fn new(destination: EthernetAddress, source: EthernetAddress, header: DcpHeader) -> Self {
        Self {
            destination,
            source,
            vlan: None,
            header: DcpHeader {
                data_length: 0,
                ..header
            },
            blocks: Vec::new(),
        }
    }

    /// Multicast identify request selecting every device.
    pub fn identify_request(source: EthernetAddress, x_id: u32, response_delay: u16) -> Self {
        let header = DcpHeader::new(
            FrameId::IdentifyRequest,
            ServiceId::Identify,
            ServiceType::Request,
            x_id,
            response_delay,
        );

        // The all selector is a bare block header.
        let mut request = Self::new(DCP_MAC_IDENTIFY_ADDRESS, source, header);
        request.header.data_length = DCP_BLOCK_HEADER_LENGTH as u16;
        request.blocks.push(DcpBlock::all());
        request
    }

    /// Multicast identify request answered only by the station called `name`.
    pub fn identify_by_name_request(
        source: EthernetAddress,
        x_id: u32,
        response_delay: u16,
        name: &str,
    ) -> Result<Self, EncodeDcpError> {
        let header = DcpHeader::new(
            FrameId::IdentifyRequest,
            ServiceId::Identify,
            ServiceType::Request,
            x_id,
            response_delay,
        );

        let mut request = Self::new(DCP_MAC_IDENTIFY_ADDRESS, source, header);
        request.add_block(DcpBlock::name_of_station_filter(name))?;
        Ok(request)
    }

    /// Unicast set request carrying a single block.
    pub fn set_request(
        destination: EthernetAddress,
        source: EthernetAddress,
        x_id: u32,
        block: DcpBlock,
    ) -> Result<Self, EncodeDcpError> {
        let header = DcpHeader::new(
            FrameId::GetSet,
            ServiceId::Set,
            ServiceType::Request,
            x_id,
            0,
        );

        let mut request = Self::new(destination, source, header);
        request.add_block(block)?;
        Ok(request)
    }

    /// Appends `block` and accounts for it in the data length. The frame is
    /// left unchanged when the block would not fit.
    pub fn add_block(&mut self, block: DcpBlock) -> Result<&mut Self, EncodeDcpError> {
        block.check_length()?;

        let length = usize::from(self.header.data_length) + block.encoded_len();
        let data_length = u16::try_from(length)
            .ok()
            .filter(|_| length <= MAX_DCP_DATA_LENGTH)
            .ok_or(EncodeDcpError::DataTooLong {
                length,
                max: MAX_DCP_DATA_LENGTH,
            })?;

        self.header.data_length = data_length;
        self.blocks.push(block);

        Ok(self)
    }

    pub fn parse<T: AsRef<[u8]>>(frame: &DcpFrame<T>) -> Result<Self, ParseDcpError> {
        let header_frame = DcpHeaderFrame::new_unchecked(frame.payload());
        let header = DcpHeader::parse(&header_frame);

        let payload = header_frame.payload();
        let payload_offset = frame.payload_start() + DCP_HEADER_LENGTH;
        let data_length = header.data_length as usize;

        let mut blocks = Vec::new();
        let mut block_start_index = 0usize;

        while block_start_index < data_length {
            let remaining = payload.get(block_start_index..).unwrap_or(&[]);

            let (block, consumed) = DcpBlock::parse(remaining).map_err(|e| match e {
                ParseDcpError::Truncated { needed, .. } => ParseDcpError::Truncated {
                    needed: payload_offset + block_start_index + needed,
                    actual: payload_offset + payload.len(),
                },
                other => other,
            })?;

            blocks.push(block);
            block_start_index += consumed;
        }

        Ok(Self {
            destination: frame.destination(),
            source: frame.source(),
            vlan: frame.vlan_tci(),
            header,
            blocks,
        })
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, ParseDcpError> {
        let frame = DcpFrame::new_checked(buffer)?;
        Self::parse(&frame)
    }

    fn blocks_start(&self) -> usize {
        let ethernet = match self.vlan {
            Some(_) => PAYLOAD_VLAN_FIELD.start,
            None => PAYLOAD_FIELD.start,
        };

        ethernet + DCP_HEADER_LENGTH
    }

    /// Encoded length before padding to the medium minimum.
    pub fn length(&self) -> usize {
        self.blocks
            .iter()
            .fold(self.blocks_start(), |acc, block| acc + block.encoded_len())
    }

    /// Writes the frame into `buffer`, which must hold [`length`](Self::length)
    /// bytes. Returns the number of bytes written.
    pub fn encode_into(&self, buffer: &mut [u8]) -> usize {
        buffer[DESTINATION_FIELD].copy_from_slice(self.destination.as_bytes());
        buffer[SOURCE_FIELD].copy_from_slice(self.source.as_bytes());

        let header_start = match self.vlan {
            Some(tci) => {
                NetworkEndian::write_u16(&mut buffer[TYPE_FIELD], ETHERTYPE_VLAN);
                NetworkEndian::write_u16(&mut buffer[VLAN_TCI_FIELD], tci);
                NetworkEndian::write_u16(&mut buffer[TYPE_VLAN_FIELD], ETHERTYPE_PROFINET);
                PAYLOAD_VLAN_FIELD.start
            }
            None => {
                NetworkEndian::write_u16(&mut buffer[TYPE_FIELD], ETHERTYPE_PROFINET);
                PAYLOAD_FIELD.start
            }
        };

        self.header.encode_into(&mut buffer[header_start..]);

        let mut current_block_index = header_start + DCP_HEADER_LENGTH;
        for block in &self.blocks {
            current_block_index += block.encode_into(&mut buffer[current_block_index..]);
        }

        current_block_index
    }

    /// Encodes into a fresh buffer zero-padded to the medium minimum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0; self.length()];
        self.encode_into(&mut buffer);
        pad_to_min_frame(&mut buffer);
        buffer
    }

    pub fn is_identify_response(&self) -> bool {
        self.header.frame_id() == Some(FrameId::IdentifyResponse)
            && self.header.service_id() == Some(ServiceId::Identify)
            && self.header.service_type() == Some(ServiceType::Success)
    }

    pub fn find_block(&self, option: u8, suboption: u8) -> Option<&DcpBlock> {
        self.blocks
            .iter()
            .find(|block| block.option == option && block.suboption == suboption)
    }

    /// Typed blocks, skipping the ones this crate does not interpret.
    pub fn typed_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.iter().filter_map(|block| Block::parse(block).ok())
    }
}

#[cfg(test)]
mod tests {
    use smoltcp::wire::Ipv4Address;

    use super::*;

    const IDENTIFY_REQUEST: [u8; 64] = [
        0x01, 0x0e, 0xcf, 0x00, 0x00, 0x00, 0x52, 0x54, 0x00, 0x8a, 0x3b, 0xa5, 0x88, 0x92, 0xfe,
        0xfe, 0x05, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0xc0, 0x00, 0x04, 0xff, 0xff, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ];

    const IDENTIFY_RESPONSE_VLAN: [u8; 112] = [
        0x52, 0x54, 0x00, 0x8a, 0x3b, 0xa5, 0x8c, 0xf3, 0x19, 0x45, 0x01, 0x63, 0x81, 0x00, 0x00,
        0x00, 0x88, 0x92, 0xfe, 0xff, 0x05, 0x01, 0x00, 0x00, 0x01, 0x66, 0x00, 0x00, 0x00, 0x52,
        0x02, 0x05, 0x00, 0x04, 0x00, 0x00, 0x02, 0x07, 0x02, 0x01, 0x00, 0x09, 0x00, 0x00, 0x53,
        0x37, 0x2d, 0x31, 0x32, 0x30, 0x30, 0x00, 0x02, 0x02, 0x00, 0x0c, 0x00, 0x00, 0x70, 0x6c,
        0x63, 0x78, 0x62, 0x31, 0x64, 0x30, 0x65, 0x64, 0x02, 0x03, 0x00, 0x06, 0x00, 0x00, 0x00,
        0x2a, 0x01, 0x0d, 0x02, 0x04, 0x00, 0x04, 0x00, 0x00, 0x02, 0x00, 0x02, 0x07, 0x00, 0x04,
        0x00, 0x00, 0x00, 0x64, 0x01, 0x02, 0x00, 0x0e, 0x00, 0x01, 0xc0, 0xa8, 0x00, 0x01, 0xff,
        0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_non_vlan() {
        let frame = DcpFrame::new_checked(IDENTIFY_REQUEST).unwrap();

        assert!(!frame.is_vlan());
        assert_eq!(frame.destination(), DCP_MAC_IDENTIFY_ADDRESS);
        assert_eq!(
            frame.source(),
            EthernetAddress::from_bytes(&[0x52, 0x54, 0x00, 0x8a, 0x3b, 0xa5])
        );
        assert_eq!(frame.eth_type(), ETHERTYPE_PROFINET);
        assert_eq!(frame.vlan_tci(), None);
    }

    #[test]
    fn test_vlan() {
        let raw_packet = [
            0x01, 0x0e, 0xcf, 0x00, 0x00, 0x00, 0xa8, 0x5e, 0x45, 0x15, 0x85, 0x46, 0x81, 0x00,
            0x00, 0x00, 0x88, 0x92, 0xfe, 0xfe, 0x05, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01,
            0x00, 0x04, 0xff, 0xff, 0x00, 0x00,
        ];

        let frame = DcpFrame::new_checked(raw_packet).unwrap();

        assert!(frame.is_vlan());
        assert_eq!(
            frame.source(),
            EthernetAddress::from_bytes(&[0xa8, 0x5e, 0x45, 0x15, 0x85, 0x46])
        );
        assert_eq!(frame.eth_type(), ETHERTYPE_PROFINET);
        assert_eq!(frame.vlan_tci(), Some(0));

        let dcp = Dcp::parse(&frame).unwrap();
        assert_eq!(dcp.blocks, vec![DcpBlock::all()]);
    }

    #[test]
    fn test_dcp_identify_request() {
        let dcp = Dcp::decode(&IDENTIFY_REQUEST).unwrap();

        assert_eq!(dcp.destination, DCP_MAC_IDENTIFY_ADDRESS);
        assert_eq!(dcp.header.service_id(), Some(ServiceId::Identify));
        assert_eq!(dcp.blocks.len(), 1);
        assert_eq!(Block::parse(&dcp.blocks[0]), Ok(Block::All));
        assert!(!dcp.is_identify_response());
    }

    #[test]
    fn test_dcp_response() {
        let dcp = Dcp::decode(&IDENTIFY_RESPONSE_VLAN).unwrap();

        assert!(dcp.is_identify_response());
        assert_eq!(dcp.header.x_id, 0x166);
        assert_eq!(dcp.blocks.len(), 7);

        let blocks: Vec<Block> = dcp.typed_blocks().collect();

        assert_eq!(
            blocks[1],
            Block::DeviceProperties(DevicePropertiesBlock::DeviceVendor("S7-1200".into()))
        );
        assert_eq!(
            blocks[2],
            Block::DeviceProperties(DevicePropertiesBlock::NameOfStation("plcxb1d0ed".into()))
        );
        assert_eq!(
            blocks[6],
            Block::Ip(IpBlock::IpParameter(IpParameter {
                ip_address: Ipv4Address::new(192, 168, 0, 1),
                subnet_mask: Ipv4Address::new(255, 255, 255, 0),
                gateway: Ipv4Address::new(0, 0, 0, 0)
            }))
        );
    }

    #[test]
    fn test_response_round_trip() {
        let dcp = Dcp::decode(&IDENTIFY_RESPONSE_VLAN).unwrap();

        assert_eq!(dcp.length(), IDENTIFY_RESPONSE_VLAN.len());
        assert_eq!(dcp.to_bytes(), IDENTIFY_RESPONSE_VLAN);
        assert_eq!(Dcp::decode(&dcp.to_bytes()).unwrap(), dcp);
    }

    #[test]
    fn test_built_frame_round_trip() {
        let source = EthernetAddress([0x00, 0x00, 0x23, 0x53, 0x4e, 0xfe]);
        let header = DcpHeader::new(
            FrameId::IdentifyResponse,
            ServiceId::Identify,
            ServiceType::Success,
            1,
            0,
        );

        let mut dcp = Dcp::new(DCP_MAC_IDENTIFY_ADDRESS, source, header);
        dcp.add_block(
            Block::DeviceProperties(DevicePropertiesBlock::NameOfStation("my cool device".into()))
                .to_set_block(BlockQualifier::Temporary)
                .unwrap(),
        )
        .unwrap();
        dcp.add_block(
            Block::DeviceProperties(DevicePropertiesBlock::DeviceVendor("odd".into()))
                .to_set_block(BlockQualifier::Temporary)
                .unwrap(),
        )
        .unwrap();

        assert_eq!(dcp.header.data_length, 20 + 10);

        let bytes = dcp.to_bytes();
        assert_eq!(bytes.len(), 60);
        assert_eq!(Dcp::decode(&bytes).unwrap(), dcp);
    }

    #[test]
    fn test_encode_identify_request() {
        let source = EthernetAddress([0x52, 0x54, 0x00, 0x8a, 0x3b, 0xa5]);
        let request = Dcp::identify_request(source, 5, 0xc0);

        assert_eq!(request.to_bytes(), IDENTIFY_REQUEST[..60]);
    }

    #[test]
    fn test_identify_by_name_request() {
        let source = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
        let request = Dcp::identify_by_name_request(source, 9, 1, "io-dev").unwrap();

        let decoded = Dcp::decode(&request.to_bytes()).unwrap();

        assert_eq!(decoded.blocks, vec![DcpBlock::new(2, 2, b"io-dev".to_vec())]);
        assert_eq!(decoded.header.data_length, 10);
    }

    #[test]
    fn test_set_request() {
        let destination = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let source = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
        let block = Block::DeviceProperties(DevicePropertiesBlock::NameOfStation("plc-1".into()))
            .to_set_block(BlockQualifier::Permanent)
            .unwrap();

        let bytes = Dcp::set_request(destination, source, 0x1234_5678, block)
            .unwrap()
            .to_bytes();

        assert_eq!(bytes[..14], [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x02, 0, 0, 0, 0, 1, 0x88, 0x92]);
        assert_eq!(
            bytes[14..26],
            [0xfe, 0xfd, 0x04, 0x00, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0x00, 0x0c]
        );
        assert_eq!(
            bytes[26..38],
            [0x02, 0x02, 0x00, 0x07, 0x00, 0x01, b'p', b'l', b'c', b'-', b'1', 0x00]
        );
    }

    #[test]
    fn test_add_block_rejects_oversized_data() {
        let source = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
        let header = DcpHeader::new(FrameId::GetSet, ServiceId::Set, ServiceType::Request, 1, 0);
        let mut dcp = Dcp::new(DCP_MAC_IDENTIFY_ADDRESS, source, header);

        assert!(matches!(
            dcp.add_block(DcpBlock::new(2, 2, vec![0x61; 40_000])),
            Err(EncodeDcpError::ValueTooLong { length: 40_000, .. })
        ));
        assert!(dcp.blocks.is_empty());
        assert_eq!(dcp.header.data_length, 0);

        dcp.add_block(DcpBlock::new(2, 2, vec![0x61; 700])).unwrap();
        assert_eq!(
            dcp.add_block(DcpBlock::new(2, 1, vec![0x62; 800])).map(|_| ()),
            Err(EncodeDcpError::DataTooLong {
                length: 704 + 804,
                max: MAX_DCP_DATA_LENGTH,
            })
        );
        assert_eq!(dcp.blocks.len(), 1);
        assert_eq!(dcp.header.data_length, 704);

        let decoded = Dcp::decode(&dcp.to_bytes()).unwrap();
        assert_eq!(decoded, dcp);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Dcp::decode(&IDENTIFY_REQUEST[..10]),
            Err(ParseDcpError::Truncated {
                needed: 14,
                actual: 10
            })
        );
        assert_eq!(
            Dcp::decode(&IDENTIFY_REQUEST[..20]),
            Err(ParseDcpError::Truncated {
                needed: 26,
                actual: 20
            })
        );

        let mut ipv4 = IDENTIFY_REQUEST;
        ipv4[12] = 0x08;
        ipv4[13] = 0x00;
        assert_eq!(Dcp::decode(&ipv4), Err(ParseDcpError::WrongEtherType(0x0800)));
    }

    #[test]
    fn test_decode_block_overrun() {
        let mut overrun = IDENTIFY_RESPONSE_VLAN;
        // Inflate the IP block length past the buffer end.
        overrun[97] = 0x20;

        assert_eq!(
            Dcp::decode(&overrun),
            Err(ParseDcpError::Truncated {
                needed: 94 + 4 + 0x20,
                actual: 112
            })
        );
    }
}
