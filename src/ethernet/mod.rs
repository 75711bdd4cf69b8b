use std::time::Duration;

use profinet_probe_lib::{format_mac, is_zero_mac, EthernetAddress, ETHERNET_MIN_FRAME_LEN};
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::util::hexdump;

pub mod inventory;
pub mod link;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
#[cfg(target_os = "linux")]
pub mod packet_socket;

pub use inventory::*;
pub use link::*;
#[cfg(any(test, feature = "testing"))]
pub use memory::*;
#[cfg(target_os = "linux")]
pub use packet_socket::*;

/// Lists the adapters a backend offers.
pub fn list_adapters(backend: &dyn AdapterBackend) -> Result<Vec<AdapterInfo>> {
    backend
        .list_adapters()
        .map_err(|e| Error::adapter_open_failed("inventory", e))
}

/// Raw send and receive on one adapter.
///
/// Every frame the channel sends is expected to carry [`Self::mac_address`] as
/// its source. When the address could not be resolved it is all-zero and the
/// channel is degraded: frames still go out, devices may not answer.
pub struct AdapterChannel {
    adapter_id: String,
    link: Option<Box<dyn RawLink>>,
    mac_address: EthernetAddress,
    receive_buffer: Vec<u8>,
    read_timeout: Duration,
}

impl AdapterChannel {
    /// Opens `adapter`, given as id or description, through `backend`.
    pub fn open(
        adapter: &str,
        backend: &dyn AdapterBackend,
        resolver: &dyn HardwareAddressResolver,
        config: &LinkConfig,
    ) -> Result<Self> {
        config.validate()?;

        let adapters = backend
            .list_adapters()
            .map_err(|e| Error::adapter_open_failed(adapter, e))?;
        let info = adapters
            .into_iter()
            .find(|info| info.matches(adapter))
            .ok_or_else(|| Error::adapter_open_failed(adapter, "adapter not found"))?;

        let link = backend
            .open_link(&info.id, config)
            .map_err(|e| Error::adapter_open_failed(adapter, e))?;

        let mac_address = match resolver.resolve(&info.id) {
            Some(mac) => mac,
            None => {
                warn!(
                    adapter = %info.id,
                    "could not resolve hardware address, sending with a zero source"
                );
                EthernetAddress([0; 6])
            }
        };

        info!(adapter = %info.id, mac = %format_mac(&mac_address), "adapter opened");
        Ok(Self::from_link(info.id, link, mac_address, config))
    }

    /// Wraps an already open link.
    pub fn from_link(
        adapter_id: impl Into<String>,
        link: Box<dyn RawLink>,
        mac_address: EthernetAddress,
        config: &LinkConfig,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            link: Some(link),
            mac_address,
            receive_buffer: vec![0; config.receive_buffer_len],
            read_timeout: config.read_timeout,
        }
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    pub fn mac_address(&self) -> EthernetAddress {
        self.mac_address
    }

    pub fn is_degraded(&self) -> bool {
        is_zero_mac(&self.mac_address)
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Restricts capture to `ethertype`. Returns whether the filter is active;
    /// without it the channel keeps capturing everything.
    pub fn install_receive_filter(&mut self, ethertype: u16) -> Result<bool> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;

        match link.set_ethertype_filter(ethertype) {
            Ok(()) => {
                debug!(adapter = %self.adapter_id, ethertype, "receive filter installed");
                Ok(true)
            }
            Err(e) => {
                warn!(adapter = %self.adapter_id, error = %e, "receive filter not installed, capturing all traffic");
                Ok(false)
            }
        }
    }

    /// Sends one frame. Frames below the medium minimum are rejected; pad
    /// them first.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;

        if frame.len() < ETHERNET_MIN_FRAME_LEN {
            return Err(Error::send_failed(format!(
                "frame of {} bytes is below the {} byte minimum",
                frame.len(),
                ETHERNET_MIN_FRAME_LEN
            )));
        }

        trace!(adapter = %self.adapter_id, "tx\n{}", hexdump(frame));
        link.send(frame).map_err(Error::send_failed)
    }

    /// Returns at most one frame, or `None` when nothing arrived within
    /// `timeout`. The wait is capped by the configured read timeout.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let timeout = timeout.min(self.read_timeout);

        match link.recv(&mut self.receive_buffer, timeout) {
            Ok(Some(len)) => {
                let frame = self.receive_buffer[..len].to_vec();
                trace!(adapter = %self.adapter_id, "rx\n{}", hexdump(&frame));
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(RxError::Closed) => {
                warn!(adapter = %self.adapter_id, "link went away");
                self.link = None;
                Err(Error::NotConnected)
            }
            Err(e) => {
                debug!(adapter = %self.adapter_id, error = %e, "receive error, frame dropped");
                Ok(None)
            }
        }
    }

    /// Releases the link. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            info!(adapter = %self.adapter_id, "adapter closed");
        }
    }
}

impl Drop for AdapterChannel {
    fn drop(&mut self) {
        self.close();
    }
}
