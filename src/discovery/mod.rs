use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use profinet_probe_lib::{
    format_mac, parse_mac, Block, BlockQualifier, ControlBlock, Dcp, DcpBlock,
    DevicePropertiesBlock, EthernetAddress, IpBlock, IpParameter, Ipv4Address,
    MAX_NAME_OF_STATION_LENGTH, SIGNAL_FLASH_ONCE,
};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::ethernet::AdapterChannel;

mod device;

pub use device::DiscoveredDevice;

/// A set request that left the adapter. The device has not confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unconfirmed {
    pub xid: u32,
}

/// Identify passes and unicast set commands over an [`AdapterChannel`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
}

fn target_address(target_mac: &str) -> Result<EthernetAddress> {
    let mac = parse_mac(target_mac)?;
    if !mac.is_unicast() {
        return Err(Error::invalid_target(format!(
            "{} is not a unicast address",
            target_mac
        )));
    }
    Ok(mac)
}

fn validate_station_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_OF_STATION_LENGTH {
        return Err(Error::invalid_target(format!(
            "station name must be 1 to {} bytes, got {}",
            MAX_NAME_OF_STATION_LENGTH,
            name.len()
        )));
    }
    Ok(())
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn qualifier(&self) -> BlockQualifier {
        if self.config.permanent {
            BlockQualifier::Permanent
        } else {
            BlockQualifier::Temporary
        }
    }

    /// Multicasts an identify request and collects the answers that arrive
    /// within `window`. One entry per MAC address, the first answer wins.
    pub fn identify(
        &self,
        channel: &mut AdapterChannel,
        window: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        self.identify_with(channel, window, None, |_| {})
    }

    /// Identify pass answered only by the station named `name`.
    pub fn identify_by_name(
        &self,
        channel: &mut AdapterChannel,
        window: Duration,
        name: &str,
    ) -> Result<Vec<DiscoveredDevice>> {
        validate_station_name(name)?;
        self.identify_with(channel, window, Some(name), |_| {})
    }

    /// Identify pass calling `on_poll` once per receive iteration, so other
    /// timers of the calling thread keep running during the window.
    pub fn identify_with<F>(
        &self,
        channel: &mut AdapterChannel,
        window: Duration,
        name: Option<&str>,
        mut on_poll: F,
    ) -> Result<Vec<DiscoveredDevice>>
    where
        F: FnMut(Instant),
    {
        let xid: u32 = rand::random();
        let source = channel.mac_address();
        let delay = self.config.response_delay_factor;

        let request = match name {
            Some(name) => Dcp::identify_by_name_request(source, xid, delay, name)?,
            None => Dcp::identify_request(source, xid, delay),
        };

        let spread = Duration::from_millis(u64::from(request.header.response_spread_ms()));
        if window < spread {
            warn!(?window, ?spread, "window ends before every device had a chance to answer");
        }

        channel.send(&request.to_bytes())?;
        info!(adapter = channel.adapter_id(), xid, ?window, "identify request sent");

        let deadline = Instant::now() + window;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let timeout = self.config.poll_timeout.min(deadline - now);
            if let Some(frame) = channel.receive(timeout)? {
                match Dcp::decode(&frame) {
                    Ok(response) if response.is_identify_response() => {
                        let mac = response.source;
                        if devices.iter().any(|device| device.mac_address == mac) {
                            debug!(mac = %format_mac(&mac), "duplicate identify response dropped");
                        } else {
                            let device = DiscoveredDevice::from_response(&response);
                            // Station names compare case-insensitively.
                            let wanted = name
                                .map_or(true, |name| device.device_name.eq_ignore_ascii_case(name));
                            if wanted {
                                info!(mac = %format_mac(&mac), station = %device.device_name, "device found");
                                devices.push(device);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "frame dropped"),
                }
            }

            on_poll(Instant::now());
        }

        if devices.is_empty() {
            info!(adapter = channel.adapter_id(), xid, "no device answered");
        }

        Ok(devices)
    }

    /// Assigns IP address, subnet mask and gateway.
    pub fn set_ip(
        &self,
        channel: &mut AdapterChannel,
        target_mac: &str,
        ip: Ipv4Addr,
        subnet_mask: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Result<Unconfirmed> {
        let target = target_address(target_mac)?;
        let block = Block::Ip(IpBlock::IpParameter(IpParameter {
            ip_address: Ipv4Address(ip.octets()),
            subnet_mask: Ipv4Address(subnet_mask.octets()),
            gateway: Ipv4Address(gateway.octets()),
        }));

        info!(device = %format_mac(&target), %ip, %subnet_mask, %gateway, "set ip");
        self.send_set(channel, target, block.to_set_block(self.qualifier())?)
    }

    pub fn set_name(
        &self,
        channel: &mut AdapterChannel,
        target_mac: &str,
        name: &str,
    ) -> Result<Unconfirmed> {
        let target = target_address(target_mac)?;
        validate_station_name(name)?;

        let block = Block::DeviceProperties(DevicePropertiesBlock::NameOfStation(name.to_owned()));

        info!(device = %format_mac(&target), station = name, "set name of station");
        self.send_set(channel, target, block.to_set_block(self.qualifier())?)
    }

    /// Asks the device to flash its indicator once.
    pub fn flash_indicator(
        &self,
        channel: &mut AdapterChannel,
        target_mac: &str,
    ) -> Result<Unconfirmed> {
        let target = target_address(target_mac)?;
        let block = Block::Control(ControlBlock::Signal(SIGNAL_FLASH_ONCE));

        info!(device = %format_mac(&target), "flash indicator");
        self.send_set(channel, target, block.to_set_block(BlockQualifier::Temporary)?)
    }

    pub fn reset_factory(
        &self,
        _channel: &mut AdapterChannel,
        target_mac: &str,
    ) -> Result<Unconfirmed> {
        target_address(target_mac)?;
        Err(Error::NotImplemented("reset to factory"))
    }

    /// Waiting for the set response of `pending`.
    pub fn await_set_response(
        &self,
        _channel: &mut AdapterChannel,
        _pending: Unconfirmed,
        _timeout: Duration,
    ) -> Result<()> {
        Err(Error::NotImplemented("set response verification"))
    }

    fn send_set(
        &self,
        channel: &mut AdapterChannel,
        target: EthernetAddress,
        block: DcpBlock,
    ) -> Result<Unconfirmed> {
        if !channel.is_open() {
            return Err(Error::NotConnected);
        }
        if channel.is_degraded() {
            warn!(adapter = channel.adapter_id(), "set request sent with a zero source address");
        }

        let xid: u32 = rand::random();
        let request = Dcp::set_request(target, channel.mac_address(), xid, block)?;
        channel.send(&request.to_bytes())?;

        debug!(device = %format_mac(&target), xid, "set request sent, not confirmed");
        Ok(Unconfirmed { xid })
    }
}
