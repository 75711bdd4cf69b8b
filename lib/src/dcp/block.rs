use byteorder::{ByteOrder, NetworkEndian};
use num_enum::TryFromPrimitive;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::dcp::block_options::*;
use crate::dcp::error::{EncodeDcpError, ParseDcpBlockError, ParseDcpError};
use crate::dcp::header::MAX_DCP_DATA_LENGTH;
use crate::field::{Field, Rest, SmallField};

pub const MAX_DEVICE_VENDOR_LENGTH: usize = 255;
pub const MAX_NAME_OF_STATION_LENGTH: usize = 240;

const OPTION_FIELD: SmallField = 0;
const SUBOPTION_FIELD: SmallField = 1;
const BLOCK_LENGTH_FIELD: Field = 2..4;
const VALUE_FIELD: Rest = 4..;
pub const DCP_BLOCK_HEADER_LENGTH: usize = VALUE_FIELD.start;
/// Longest value a block can carry and still fit one frame.
pub const MAX_DCP_BLOCK_VALUE_LENGTH: usize = MAX_DCP_DATA_LENGTH - DCP_BLOCK_HEADER_LENGTH;

/// Length of the block info (responses) or block qualifier (set requests)
/// that leads the value of most blocks.
const BLOCK_PREFIX_LENGTH: usize = 2;

pub struct DcpBlockFrame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> DcpBlockFrame<T> {
    pub fn new_unchecked(buffer: T) -> DcpBlockFrame<T> {
        DcpBlockFrame { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<DcpBlockFrame<T>, ParseDcpError> {
        let frame = Self::new_unchecked(buffer);
        let actual = frame.buffer.as_ref().len();

        if actual < DCP_BLOCK_HEADER_LENGTH {
            return Err(ParseDcpError::Truncated {
                needed: DCP_BLOCK_HEADER_LENGTH,
                actual,
            });
        }

        let needed = DCP_BLOCK_HEADER_LENGTH + frame.block_length() as usize;
        if actual < needed {
            return Err(ParseDcpError::Truncated { needed, actual });
        }

        Ok(frame)
    }

    pub fn option(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[OPTION_FIELD]
    }

    pub fn suboption(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[SUBOPTION_FIELD]
    }

    pub fn block_length(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[BLOCK_LENGTH_FIELD])
    }

    pub fn value(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        let end = VALUE_FIELD.start + self.block_length() as usize;
        &data[VALUE_FIELD.start..end]
    }
}

/// One option/suboption TLV as it travels in a DCP frame.
///
/// The length is always the length of `value`. When placed in a frame a block
/// is followed by one zero byte if `4 + length` is odd; that byte is not
/// counted by the length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcpBlock {
    pub option: u8,
    pub suboption: u8,
    pub value: Vec<u8>,
}

impl DcpBlock {
    pub fn new(option: u8, suboption: u8, value: impl Into<Vec<u8>>) -> Self {
        Self {
            option,
            suboption,
            value: value.into(),
        }
    }

    /// The "all" selector used by identify requests.
    pub fn all() -> Self {
        Self::new(BlockOption::All.into(), AllSuboption::All.into(), Vec::new())
    }

    /// Name filter of an identify request. Request filters carry no block
    /// qualifier, the value is the bare name.
    pub fn name_of_station_filter(name: &str) -> Self {
        Self::new(
            BlockOption::DeviceProperties.into(),
            DevicePropertiesSuboption::NameOfStation.into(),
            name.as_bytes(),
        )
    }

    /// Value length as written to the length field. Saturates for values
    /// [`check_length`](Self::check_length) rejects.
    pub fn length(&self) -> u16 {
        u16::try_from(self.value.len()).unwrap_or(u16::MAX)
    }

    /// Returns the value length if the block fits a single frame.
    pub fn check_length(&self) -> Result<u16, EncodeDcpError> {
        let too_long = || EncodeDcpError::ValueTooLong {
            option: self.option,
            suboption: self.suboption,
            length: self.value.len(),
            max: MAX_DCP_BLOCK_VALUE_LENGTH,
        };

        if self.value.len() > MAX_DCP_BLOCK_VALUE_LENGTH {
            return Err(too_long());
        }
        u16::try_from(self.value.len()).map_err(|_| too_long())
    }

    pub fn padding(&self) -> usize {
        (DCP_BLOCK_HEADER_LENGTH + self.value.len()) & 1
    }

    /// Bytes the block occupies in a frame, padding included.
    pub fn encoded_len(&self) -> usize {
        DCP_BLOCK_HEADER_LENGTH + self.value.len() + self.padding()
    }

    /// Writes the block and its padding. `buffer` must hold at least
    /// [`encoded_len`](Self::encoded_len) bytes.
    pub fn encode_into(&self, buffer: &mut [u8]) -> usize {
        buffer[OPTION_FIELD] = self.option;
        buffer[SUBOPTION_FIELD] = self.suboption;
        NetworkEndian::write_u16(&mut buffer[BLOCK_LENGTH_FIELD], self.length());

        let value_end = VALUE_FIELD.start + self.value.len();
        buffer[VALUE_FIELD.start..value_end].copy_from_slice(&self.value);

        if self.padding() == 1 {
            buffer[value_end] = 0;
        }

        self.encoded_len()
    }

    /// Parses the block at the start of `buffer` and returns it together with
    /// the number of bytes to skip to reach the next block. A missing padding
    /// byte at the very end of the buffer is tolerated.
    pub fn parse(buffer: &[u8]) -> Result<(Self, usize), ParseDcpError> {
        let frame = DcpBlockFrame::new_checked(buffer)?;
        let block = Self::new(frame.option(), frame.suboption(), frame.value());
        let consumed = block.encoded_len().min(buffer.len());

        Ok((block, consumed))
    }

    fn prefixed_data(&self) -> Result<&[u8], ParseDcpBlockError> {
        self.value
            .get(BLOCK_PREFIX_LENGTH..)
            .ok_or_else(|| self.invalid_length())
    }

    fn invalid_length(&self) -> ParseDcpBlockError {
        ParseDcpBlockError::InvalidBlockLength {
            option: self.option,
            suboption: self.suboption,
            length: self.value.len(),
        }
    }

    fn unsupported(&self) -> ParseDcpBlockError {
        ParseDcpBlockError::UnsupportedSuboption {
            option: self.option,
            suboption: self.suboption,
        }
    }
}

/// Typed reading of a block carried by a set request or a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Ip(IpBlock),
    DeviceProperties(DevicePropertiesBlock),
    Control(ControlBlock),
    All,
}

impl Block {
    pub fn parse(block: &DcpBlock) -> Result<Self, ParseDcpBlockError> {
        let option =
            BlockOption::try_from_primitive(block.option).map_err(|_| block.unsupported())?;

        let parsed = match option {
            BlockOption::All if block.suboption == u8::from(AllSuboption::All) => Block::All,
            BlockOption::IP => Block::Ip(IpBlock::parse(block)?),
            BlockOption::DeviceProperties => {
                Block::DeviceProperties(DevicePropertiesBlock::parse(block)?)
            }
            BlockOption::Control => Block::Control(ControlBlock::parse(block)?),
            _ => return Err(block.unsupported()),
        };

        Ok(parsed)
    }

    pub fn option_pair(&self) -> (u8, u8) {
        match self {
            Block::Ip(ip) => (BlockOption::IP.into(), ip.suboption().into()),
            Block::DeviceProperties(dp) => {
                (BlockOption::DeviceProperties.into(), dp.suboption().into())
            }
            Block::Control(control) => (BlockOption::Control.into(), control.suboption().into()),
            Block::All => (BlockOption::All.into(), AllSuboption::All.into()),
        }
    }

    /// Encodes the block for a set request, leading with `qualifier`. Fails
    /// when the value does not fit a frame.
    pub fn to_set_block(&self, qualifier: BlockQualifier) -> Result<DcpBlock, EncodeDcpError> {
        let (option, suboption) = self.option_pair();
        let mut value = Vec::new();

        match self {
            Block::All => return Ok(DcpBlock::all()),
            Block::Control(ControlBlock::Response {
                option,
                suboption,
                error,
            }) => value.extend_from_slice(&[*option, *suboption, *error]),
            Block::Ip(ip) => {
                push_u16(&mut value, qualifier.into());
                ip.encode_data(&mut value);
            }
            Block::DeviceProperties(dp) => {
                push_u16(&mut value, qualifier.into());
                dp.encode_data(&mut value);
            }
            Block::Control(control) => {
                push_u16(&mut value, qualifier.into());
                control.encode_data(&mut value);
            }
        }

        let block = DcpBlock::new(option, suboption, value);
        block.check_length()?;
        Ok(block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpBlock {
    MacAddress(EthernetAddress),
    IpParameter(IpParameter),
    FullIpSuite(FullIpSuite),
}

impl IpBlock {
    fn parse(block: &DcpBlock) -> Result<Self, ParseDcpBlockError> {
        let suboption =
            IpSuboption::try_from_primitive(block.suboption).map_err(|_| block.unsupported())?;

        let ip = match suboption {
            IpSuboption::MacAddress => {
                let data = block.prefixed_data()?;
                if data.len() < 6 {
                    return Err(block.invalid_length());
                }
                IpBlock::MacAddress(EthernetAddress::from_bytes(&data[..6]))
            }
            IpSuboption::IpParameter => IpBlock::IpParameter(
                IpParameter::parse(&block.value).ok_or_else(|| block.invalid_length())?,
            ),
            IpSuboption::FullIpSuite => IpBlock::FullIpSuite(
                FullIpSuite::parse(block.prefixed_data()?).ok_or_else(|| block.invalid_length())?,
            ),
        };

        Ok(ip)
    }

    pub fn suboption(&self) -> IpSuboption {
        match self {
            IpBlock::MacAddress(_) => IpSuboption::MacAddress,
            IpBlock::IpParameter(_) => IpSuboption::IpParameter,
            IpBlock::FullIpSuite(_) => IpSuboption::FullIpSuite,
        }
    }

    fn encode_data(&self, out: &mut Vec<u8>) {
        match self {
            IpBlock::MacAddress(mac) => out.extend_from_slice(mac.as_bytes()),
            IpBlock::IpParameter(ip) => ip.encode_data(out),
            IpBlock::FullIpSuite(suite) => suite.encode_data(out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpParameter {
    pub ip_address: Ipv4Address,
    pub subnet_mask: Ipv4Address,
    pub gateway: Ipv4Address,
}

impl IpParameter {
    const IP_ADDRESS: Field = 0..4;
    const SUBNET_MASK: Field = 4..8;
    const GATEWAY: Field = 8..12;
    const LENGTH: usize = Self::GATEWAY.end;

    /// Reads the last three 4-byte groups of `value`, which leaves room for
    /// the block info prefix in front of them.
    fn parse(value: &[u8]) -> Option<Self> {
        let start = value.len().checked_sub(Self::LENGTH)?;
        let buffer = &value[start..];

        Some(Self {
            ip_address: Ipv4Address::from_bytes(&buffer[Self::IP_ADDRESS]),
            subnet_mask: Ipv4Address::from_bytes(&buffer[Self::SUBNET_MASK]),
            gateway: Ipv4Address::from_bytes(&buffer[Self::GATEWAY]),
        })
    }

    fn encode_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ip_address.as_bytes());
        out.extend_from_slice(self.subnet_mask.as_bytes());
        out.extend_from_slice(self.gateway.as_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullIpSuite {
    pub ip_address: Ipv4Address,
    pub subnet_mask: Ipv4Address,
    pub gateway: Ipv4Address,
    pub dns: Ipv4Address,
}

impl FullIpSuite {
    const IP_ADDRESS: Field = 0..4;
    const SUBNET_MASK: Field = 4..8;
    const GATEWAY: Field = 8..12;
    const DNS: Field = 12..16;

    fn parse(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < Self::DNS.end {
            return None;
        }

        Some(Self {
            ip_address: Ipv4Address::from_bytes(&buffer[Self::IP_ADDRESS]),
            subnet_mask: Ipv4Address::from_bytes(&buffer[Self::SUBNET_MASK]),
            gateway: Ipv4Address::from_bytes(&buffer[Self::GATEWAY]),
            dns: Ipv4Address::from_bytes(&buffer[Self::DNS]),
        })
    }

    fn encode_data(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ip_address.as_bytes());
        out.extend_from_slice(self.subnet_mask.as_bytes());
        out.extend_from_slice(self.gateway.as_bytes());
        out.extend_from_slice(self.dns.as_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePropertiesBlock {
    DeviceVendor(String),
    NameOfStation(String),
    DeviceId(DeviceId),
    DeviceRole(DeviceRole),
    DeviceOptions(Vec<(u8, u8)>),
    AliasName(String),
    DeviceInstance(DeviceInstance),
    OemDeviceId(DeviceId),
}

impl DevicePropertiesBlock {
    fn parse(block: &DcpBlock) -> Result<Self, ParseDcpBlockError> {
        let suboption = DevicePropertiesSuboption::try_from_primitive(block.suboption)
            .map_err(|_| block.unsupported())?;
        let data = block.prefixed_data()?;

        let properties = match suboption {
            DevicePropertiesSuboption::DeviceVendor => {
                DevicePropertiesBlock::DeviceVendor(String::from_utf8_lossy(data).into_owned())
            }
            DevicePropertiesSuboption::NameOfStation => {
                DevicePropertiesBlock::NameOfStation(String::from_utf8_lossy(data).into_owned())
            }
            DevicePropertiesSuboption::AliasName => {
                DevicePropertiesBlock::AliasName(String::from_utf8_lossy(data).into_owned())
            }
            DevicePropertiesSuboption::DeviceID => DevicePropertiesBlock::DeviceId(
                DeviceId::parse_bytes(data).ok_or_else(|| block.invalid_length())?,
            ),
            DevicePropertiesSuboption::OEMDeviceID => DevicePropertiesBlock::OemDeviceId(
                DeviceId::parse_bytes(data).ok_or_else(|| block.invalid_length())?,
            ),
            DevicePropertiesSuboption::DeviceRole => {
                let role = data.first().ok_or_else(|| block.invalid_length())?;
                DevicePropertiesBlock::DeviceRole(DeviceRole(*role))
            }
            DevicePropertiesSuboption::DeviceInstance => DevicePropertiesBlock::DeviceInstance(
                DeviceInstance::parse_bytes(data).ok_or_else(|| block.invalid_length())?,
            ),
            DevicePropertiesSuboption::DeviceOptions => DevicePropertiesBlock::DeviceOptions(
                data.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect(),
            ),
            DevicePropertiesSuboption::StandardGateway
            | DevicePropertiesSuboption::RSIProperties => return Err(block.unsupported()),
        };

        Ok(properties)
    }

    pub fn suboption(&self) -> DevicePropertiesSuboption {
        match self {
            DevicePropertiesBlock::DeviceVendor(_) => DevicePropertiesSuboption::DeviceVendor,
            DevicePropertiesBlock::NameOfStation(_) => DevicePropertiesSuboption::NameOfStation,
            DevicePropertiesBlock::DeviceId(_) => DevicePropertiesSuboption::DeviceID,
            DevicePropertiesBlock::DeviceRole(_) => DevicePropertiesSuboption::DeviceRole,
            DevicePropertiesBlock::DeviceOptions(_) => DevicePropertiesSuboption::DeviceOptions,
            DevicePropertiesBlock::AliasName(_) => DevicePropertiesSuboption::AliasName,
            DevicePropertiesBlock::DeviceInstance(_) => DevicePropertiesSuboption::DeviceInstance,
            DevicePropertiesBlock::OemDeviceId(_) => DevicePropertiesSuboption::OEMDeviceID,
        }
    }

    fn encode_data(&self, out: &mut Vec<u8>) {
        match self {
            DevicePropertiesBlock::DeviceVendor(text)
            | DevicePropertiesBlock::NameOfStation(text)
            | DevicePropertiesBlock::AliasName(text) => out.extend_from_slice(text.as_bytes()),
            DevicePropertiesBlock::DeviceId(id) | DevicePropertiesBlock::OemDeviceId(id) => {
                push_u16(out, id.vendor_id);
                push_u16(out, id.device_id);
            }
            DevicePropertiesBlock::DeviceRole(role) => out.extend_from_slice(&[role.0, 0]),
            DevicePropertiesBlock::DeviceOptions(options) => {
                for (option, suboption) in options {
                    out.extend_from_slice(&[*option, *suboption]);
                }
            }
            DevicePropertiesBlock::DeviceInstance(instance) => {
                out.extend_from_slice(&[instance.high, instance.low])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub device_id: u16,
}

impl DeviceId {
    pub fn parse_bytes(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < 4 {
            return None;
        }

        Some(Self {
            vendor_id: NetworkEndian::read_u16(&buffer[0..2]),
            device_id: NetworkEndian::read_u16(&buffer[2..4]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInstance {
    pub high: u8,
    pub low: u8,
}

impl DeviceInstance {
    pub fn parse_bytes(buffer: &[u8]) -> Option<Self> {
        match buffer {
            [high, low, ..] => Some(Self {
                high: *high,
                low: *low,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlBlock {
    Start,
    Stop,
    Signal(u16),
    Response { option: u8, suboption: u8, error: u8 },
    FactoryReset,
    ResetToFactory,
}

impl ControlBlock {
    fn parse(block: &DcpBlock) -> Result<Self, ParseDcpBlockError> {
        let suboption = ControlSuboption::try_from_primitive(block.suboption)
            .map_err(|_| block.unsupported())?;

        let control = match suboption {
            ControlSuboption::Response => match block.value.as_slice() {
                [option, suboption, error, ..] => ControlBlock::Response {
                    option: *option,
                    suboption: *suboption,
                    error: *error,
                },
                _ => return Err(block.invalid_length()),
            },
            ControlSuboption::Signal => {
                let data = block.prefixed_data()?;
                if data.len() < 2 {
                    return Err(block.invalid_length());
                }
                ControlBlock::Signal(NetworkEndian::read_u16(&data[0..2]))
            }
            ControlSuboption::Start => ControlBlock::Start,
            ControlSuboption::Stop => ControlBlock::Stop,
            ControlSuboption::FactoryReset => ControlBlock::FactoryReset,
            ControlSuboption::ResetToFactory => ControlBlock::ResetToFactory,
        };

        Ok(control)
    }

    pub fn suboption(&self) -> ControlSuboption {
        match self {
            ControlBlock::Start => ControlSuboption::Start,
            ControlBlock::Stop => ControlSuboption::Stop,
            ControlBlock::Signal(_) => ControlSuboption::Signal,
            ControlBlock::Response { .. } => ControlSuboption::Response,
            ControlBlock::FactoryReset => ControlSuboption::FactoryReset,
            ControlBlock::ResetToFactory => ControlSuboption::ResetToFactory,
        }
    }

    pub fn block_error(&self) -> Option<BlockError> {
        match self {
            ControlBlock::Response { error, .. } => BlockError::try_from_primitive(*error).ok(),
            _ => None,
        }
    }

    fn encode_data(&self, out: &mut Vec<u8>) {
        if let ControlBlock::Signal(value) = self {
            push_u16(out, *value);
        }
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    let mut raw = [0; 2];
    NetworkEndian::write_u16(&mut raw, value);
    out.extend_from_slice(&raw);
}
