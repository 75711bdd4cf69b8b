use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BlockOption {
    IP = 1,
    DeviceProperties = 2,
    DHCP = 3,
    Control = 5,
    DeviceInitiative = 6,
    NMEDomain = 7,
    All = 255,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum IpSuboption {
    MacAddress = 1,
    IpParameter = 2,
    FullIpSuite = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DevicePropertiesSuboption {
    DeviceVendor = 1,
    NameOfStation = 2,
    DeviceID = 3,
    DeviceRole = 4,
    DeviceOptions = 5,
    AliasName = 6,
    DeviceInstance = 7,
    OEMDeviceID = 8,
    StandardGateway = 9,
    RSIProperties = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ControlSuboption {
    Start = 1,
    Stop = 2,
    Signal = 3,
    Response = 4,
    FactoryReset = 5,
    ResetToFactory = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AllSuboption {
    All = 0xff,
}

/// Qualifier carried in the first two bytes of every set-request block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum BlockQualifier {
    Temporary = 0,
    Permanent = 1,
}

/// Value of the control/signal block. Only "flash once" is defined.
pub const SIGNAL_FLASH_ONCE: u16 = 0x0100;

/// Bits of the device role byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRole(pub u8);

impl DeviceRole {
    pub const IO_DEVICE: u8 = 0x01;
    pub const IO_CONTROLLER: u8 = 0x02;
    pub const IO_MULTIDEVICE: u8 = 0x04;
    pub const IO_SUPERVISOR: u8 = 0x08;

    pub fn is_io_device(&self) -> bool {
        self.0 & Self::IO_DEVICE != 0
    }

    pub fn is_io_controller(&self) -> bool {
        self.0 & Self::IO_CONTROLLER != 0
    }

    pub fn is_io_multidevice(&self) -> bool {
        self.0 & Self::IO_MULTIDEVICE != 0
    }

    pub fn is_io_supervisor(&self) -> bool {
        self.0 & Self::IO_SUPERVISOR != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BlockError {
    NoError = 0,
    OptionNotSupported = 1,
    SuboptionNotSupported = 2,
    SuboptionNotSet = 3,
    ResourceError = 4,
    SetNotPossible = 5,
    InOperation = 6,
}
