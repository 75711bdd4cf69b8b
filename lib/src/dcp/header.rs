use byteorder::{ByteOrder, NetworkEndian};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::field::{Field, Rest, SmallField};
use crate::ETHERNET_MAX_PAYLOAD_LEN;

const FRAME_ID_FIELD: Field = 0..2;
const SERVICE_ID_FIELD: SmallField = 2;
const SERVICE_TYPE_FIELD: SmallField = 3;
const X_ID_FIELD: Field = 4..8;
const RESPONSE_DELAY_FIELD: Field = 8..10;
const DATA_LENGTH_FIELD: Field = 10..12;
const PAYLOAD_FIELD: Rest = 12..;
pub const DCP_HEADER_LENGTH: usize = PAYLOAD_FIELD.start;
/// Room left for blocks once the header is in the frame.
pub const MAX_DCP_DATA_LENGTH: usize = ETHERNET_MAX_PAYLOAD_LEN - DCP_HEADER_LENGTH;

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum FrameId {
    Hello = 0xfefc,
    GetSet = 0xfefd,
    IdentifyRequest = 0xfefe,
    IdentifyResponse = 0xfeff,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ServiceType {
    Request = 0,
    Success = 1,
    NotSupported = 5,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ServiceId {
    Get = 3,
    Set = 4,
    Identify = 5,
    Hello = 6,
}

/// Read-only view over the DCP header, starting at the frame id.
///
/// The caller checks the length; accessors index without bounds checks of
/// their own.
pub struct DcpHeaderFrame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> DcpHeaderFrame<T> {
    pub const fn new_unchecked(buffer: T) -> Self {
        DcpHeaderFrame { buffer }
    }

    pub fn check_len(&self) -> bool {
        self.buffer.as_ref().len() >= DCP_HEADER_LENGTH
    }

    pub fn frame_id(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[FRAME_ID_FIELD])
    }

    pub fn service_id(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[SERVICE_ID_FIELD]
    }

    pub fn service_type(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[SERVICE_TYPE_FIELD]
    }

    pub fn x_id(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[X_ID_FIELD])
    }

    pub fn response_delay(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[RESPONSE_DELAY_FIELD])
    }

    pub fn data_length(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[DATA_LENGTH_FIELD])
    }

    pub fn payload(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[PAYLOAD_FIELD]
    }
}

/// DCP header fields. Kept as raw integers so that any frame seen on the wire
/// survives a decode/encode cycle; the enums above name the known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcpHeader {
    pub frame_id: u16,
    pub service_id: u8,
    pub service_type: u8,
    pub x_id: u32,
    pub response_delay: u16,
    pub data_length: u16,
}

impl DcpHeader {
    pub fn new(
        frame_id: FrameId,
        service_id: ServiceId,
        service_type: ServiceType,
        x_id: u32,
        response_delay: u16,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            service_id: service_id.into(),
            service_type: service_type.into(),
            x_id,
            response_delay,
            data_length: 0,
        }
    }

    pub fn parse<T: AsRef<[u8]>>(frame: &DcpHeaderFrame<T>) -> Self {
        Self {
            frame_id: frame.frame_id(),
            service_id: frame.service_id(),
            service_type: frame.service_type(),
            x_id: frame.x_id(),
            response_delay: frame.response_delay(),
            data_length: frame.data_length(),
        }
    }

    pub fn encode_into(&self, buffer: &mut [u8]) {
        NetworkEndian::write_u16(&mut buffer[FRAME_ID_FIELD], self.frame_id);
        buffer[SERVICE_ID_FIELD] = self.service_id;
        buffer[SERVICE_TYPE_FIELD] = self.service_type;
        NetworkEndian::write_u32(&mut buffer[X_ID_FIELD], self.x_id);
        NetworkEndian::write_u16(&mut buffer[RESPONSE_DELAY_FIELD], self.response_delay);
        NetworkEndian::write_u16(&mut buffer[DATA_LENGTH_FIELD], self.data_length);
    }

    pub fn frame_id(&self) -> Option<FrameId> {
        FrameId::try_from_primitive(self.frame_id).ok()
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        ServiceId::try_from_primitive(self.service_id).ok()
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        ServiceType::try_from_primitive(self.service_type).ok()
    }

    /// Upper bound, in milliseconds, of the random delay a device applies
    /// before answering a multicast identify. Each factor step is 10 ms.
    pub fn response_spread_ms(&self) -> u32 {
        match self.response_delay {
            0 | 1 => 400,
            factor => u32::from(factor) * 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dcp_header() {
        let raw_packet: [u8; 64] = [
            0x01, 0x0e, 0xcf, 0x00, 0x00, 0x00, 0x52, 0x54, 0x00, 0x8a, 0x3b, 0xa5, 0x88, 0x92,
            0xfe, 0xfe, 0x05, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0xc0, 0x00, 0x04, 0xff, 0xff,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let dcp_header = DcpHeaderFrame::new_unchecked(&raw_packet[14..]);
        assert!(dcp_header.check_len());

        let header = DcpHeader::parse(&dcp_header);

        assert_eq!(header.frame_id(), Some(FrameId::IdentifyRequest));
        assert_eq!(header.service_id(), Some(ServiceId::Identify));
        assert_eq!(header.service_type(), Some(ServiceType::Request));
        assert_eq!(header.x_id, 5);
        assert_eq!(header.response_delay, 192);
        assert_eq!(header.data_length, 4);
        assert_eq!(dcp_header.payload()[..4], [0xff, 0xff, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_dcp_header() {
        let mut header = DcpHeader::new(
            FrameId::GetSet,
            ServiceId::Set,
            ServiceType::Request,
            0x0102_0304,
            0,
        );
        header.data_length = 0x12;

        let mut buffer = [0u8; DCP_HEADER_LENGTH];
        header.encode_into(&mut buffer);

        assert_eq!(
            buffer,
            [0xfe, 0xfd, 0x04, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x12]
        );
        assert_eq!(DcpHeader::parse(&DcpHeaderFrame::new_unchecked(&buffer)), header);
    }

    #[test]
    fn test_response_spread() {
        let mut header =
            DcpHeader::new(FrameId::IdentifyRequest, ServiceId::Identify, ServiceType::Request, 1, 1);
        assert_eq!(header.response_spread_ms(), 400);

        header.response_delay = 0x80;
        assert_eq!(header.response_spread_ms(), 1280);
    }

    #[test]
    fn test_unknown_ids_are_kept() {
        let mut header =
            DcpHeader::new(FrameId::Hello, ServiceId::Hello, ServiceType::Request, 7, 0);
        header.service_type = 0x42;
        assert_eq!(header.service_type(), None);
        assert_eq!(header.frame_id(), Some(FrameId::Hello));
    }
}
