use thiserror::Error;

/// Reasons a received buffer is not a usable discovery frame.
///
/// Both variants describe ordinary traffic filtering: consumers drop the
/// frame and keep listening.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseDcpError {
    #[error("frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("EtherType 0x{0:04x} is not PROFINET")]
    WrongEtherType(u16),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseDcpBlockError {
    #[error("block {option:#04x}/{suboption:#04x} has invalid length {length}")]
    InvalidBlockLength {
        option: u8,
        suboption: u8,
        length: usize,
    },
    #[error("block {option:#04x}/{suboption:#04x} is not supported")]
    UnsupportedSuboption { option: u8, suboption: u8 },
}

/// Blocks that do not fit the length fields or a single frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeDcpError {
    #[error("block {option:#04x}/{suboption:#04x} value of {length} bytes exceeds {max}")]
    ValueTooLong {
        option: u8,
        suboption: u8,
        length: usize,
        max: usize,
    },
    #[error("blocks of {length} bytes exceed the {max} byte frame data")]
    DataTooLong { length: usize, max: usize },
}
