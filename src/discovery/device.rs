use std::fmt;
use std::net::Ipv4Addr;

use profinet_probe_lib::{
    format_mac, Block, Dcp, DeviceId, DeviceInstance, DevicePropertiesBlock, DeviceRole,
    EthernetAddress, IpBlock, Ipv4Address,
};

/// One device that answered an identify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub mac_address: EthernetAddress,
    pub device_name: String,
    /// Vendor supplied type string, e.g. `S7-1200`.
    pub device_type: String,
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub device_id: Option<DeviceId>,
    pub device_role: Option<DeviceRole>,
    pub device_instance: Option<DeviceInstance>,
    pub alias_name: Option<String>,
}

fn to_std(address: Ipv4Address) -> Ipv4Addr {
    Ipv4Addr::from(address.0)
}

impl DiscoveredDevice {
    pub fn new(mac_address: EthernetAddress) -> Self {
        Self {
            mac_address,
            device_name: String::new(),
            device_type: String::new(),
            ip_address: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            device_id: None,
            device_role: None,
            device_instance: None,
            alias_name: None,
        }
    }

    /// Builds the device from an identify response. Blocks that do not parse
    /// leave their field at its default.
    pub fn from_response(response: &Dcp) -> Self {
        let mut device = Self::new(response.source);

        for block in response.typed_blocks() {
            match block {
                Block::Ip(IpBlock::IpParameter(ip)) => {
                    device.ip_address = to_std(ip.ip_address);
                    device.subnet_mask = to_std(ip.subnet_mask);
                    device.gateway = to_std(ip.gateway);
                }
                Block::DeviceProperties(properties) => match properties {
                    DevicePropertiesBlock::NameOfStation(name) => device.device_name = name,
                    DevicePropertiesBlock::DeviceVendor(vendor) => device.device_type = vendor,
                    DevicePropertiesBlock::DeviceId(id) => device.device_id = Some(id),
                    DevicePropertiesBlock::DeviceRole(role) => device.device_role = Some(role),
                    DevicePropertiesBlock::DeviceInstance(instance) => {
                        device.device_instance = Some(instance)
                    }
                    DevicePropertiesBlock::AliasName(alias) => device.alias_name = Some(alias),
                    _ => {}
                },
                _ => {}
            }
        }

        device
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<24} {:<16} {}/{} gw {}",
            format_mac(&self.mac_address),
            self.device_name,
            self.device_type,
            self.ip_address,
            self.subnet_mask,
            self.gateway,
        )?;

        if let Some(id) = self.device_id {
            write!(f, " id {:04x}:{:04x}", id.vendor_id, id.device_id)?;
        }

        Ok(())
    }
}
