use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::EthernetAddress;

use crate::field::{Field, SmallField};
use crate::{pad_to_min_frame, ETHERTYPE_PROFINET};

/// First frame id of the RT class 1 range.
pub const RT_CLASS_1_FRAME_ID: u16 = 0x8000;
pub const RT_CLASS_1_FRAME_ID_LAST: u16 = 0xbbff;
/// Smallest C_SDU that still fills a minimum sized frame.
pub const MIN_CYCLIC_DATA_LENGTH: usize = 40;
pub const MAX_CYCLIC_DATA_LENGTH: usize = 1440;
/// Provider status attached to each IO data element.
pub const IOPS_GOOD: u8 = 0x80;

const DESTINATION_FIELD: Field = 0..6;
const SOURCE_FIELD: Field = 6..12;
const TYPE_FIELD: Field = 12..14;
const FRAME_ID_FIELD: Field = 14..16;
const DATA_START: SmallField = 16;
/// Cycle counter, data status and transfer status.
const APDU_STATUS_LENGTH: usize = 4;

/// APDU data status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStatus(pub u8);

impl DataStatus {
    pub const PRIMARY: u8 = 0x01;
    pub const REDUNDANCY: u8 = 0x02;
    pub const DATA_VALID: u8 = 0x04;
    pub const PROVIDER_RUN: u8 = 0x10;
    pub const STATION_OK: u8 = 0x20;

    /// Data valid, provider running, no station problem, primary.
    pub const GOOD: DataStatus = DataStatus(
        Self::PRIMARY | Self::DATA_VALID | Self::PROVIDER_RUN | Self::STATION_OK,
    );

    pub fn is_primary(&self) -> bool {
        self.0 & Self::PRIMARY != 0
    }

    pub fn is_data_valid(&self) -> bool {
        self.0 & Self::DATA_VALID != 0
    }

    pub fn is_station_ok(&self) -> bool {
        self.0 & Self::STATION_OK != 0
    }
}

/// One real-time cyclic data frame:
/// `[dst][src][0x8892][frame id][data][cycle counter][data status][transfer status]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicFrame {
    pub destination: EthernetAddress,
    pub source: EthernetAddress,
    pub frame_id: u16,
    pub data: Vec<u8>,
    pub cycle_counter: u16,
    pub data_status: DataStatus,
    pub transfer_status: u8,
}

impl CyclicFrame {
    pub fn length(&self) -> usize {
        DATA_START + self.data.len() + APDU_STATUS_LENGTH
    }

    pub fn encode_into(&self, buffer: &mut [u8]) -> usize {
        buffer[DESTINATION_FIELD].copy_from_slice(self.destination.as_bytes());
        buffer[SOURCE_FIELD].copy_from_slice(self.source.as_bytes());
        NetworkEndian::write_u16(&mut buffer[TYPE_FIELD], ETHERTYPE_PROFINET);
        NetworkEndian::write_u16(&mut buffer[FRAME_ID_FIELD], self.frame_id);

        let data_end = DATA_START + self.data.len();
        buffer[DATA_START..data_end].copy_from_slice(&self.data);
        NetworkEndian::write_u16(&mut buffer[data_end..data_end + 2], self.cycle_counter);
        buffer[data_end + 2] = self.data_status.0;
        buffer[data_end + 3] = self.transfer_status;

        self.length()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0; self.length()];
        self.encode_into(&mut buffer);
        pad_to_min_frame(&mut buffer);
        buffer
    }
}

/// Read-only view used to inspect cyclic frames, mostly on the receiving side
/// of tests and captures. `data_length` is the C_SDU size the sender agreed on.
pub struct CyclicFrameView<T: AsRef<[u8]>> {
    buffer: T,
    data_length: usize,
}

impl<T: AsRef<[u8]>> CyclicFrameView<T> {
    pub fn new_checked(buffer: T, data_length: usize) -> Option<Self> {
        let data = buffer.as_ref();
        if data.len() < DATA_START + data_length + APDU_STATUS_LENGTH {
            return None;
        }
        if NetworkEndian::read_u16(&data[TYPE_FIELD]) != ETHERTYPE_PROFINET {
            return None;
        }

        Some(Self {
            buffer,
            data_length,
        })
    }

    pub fn frame_id(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[FRAME_ID_FIELD])
    }

    pub fn is_rt_class_1(&self) -> bool {
        (RT_CLASS_1_FRAME_ID..=RT_CLASS_1_FRAME_ID_LAST).contains(&self.frame_id())
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer.as_ref()[DATA_START..DATA_START + self.data_length]
    }

    pub fn cycle_counter(&self) -> u16 {
        let start = DATA_START + self.data_length;
        NetworkEndian::read_u16(&self.buffer.as_ref()[start..start + 2])
    }

    pub fn data_status(&self) -> DataStatus {
        DataStatus(self.buffer.as_ref()[DATA_START + self.data_length + 2])
    }

    pub fn transfer_status(&self) -> u8 {
        self.buffer.as_ref()[DATA_START + self.data_length + 3]
    }
}
