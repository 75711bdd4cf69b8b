use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use profinet_probe_lib::{is_zero_mac, parse_mac, EthernetAddress};
use tracing::trace;

use crate::config::LinkConfig;

use super::link::RawLink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub id: String,
    pub description: String,
}

impl AdapterInfo {
    /// An adapter is addressed either by its id or by its description.
    pub fn matches(&self, adapter: &str) -> bool {
        self.id == adapter || self.description == adapter
    }
}

/// Source of adapters and of the raw links bound to them.
pub trait AdapterBackend {
    fn list_adapters(&self) -> io::Result<Vec<AdapterInfo>>;

    fn open_link(&self, adapter_id: &str, config: &LinkConfig) -> io::Result<Box<dyn RawLink>>;
}

/// Looks up the hardware address of an adapter.
pub trait HardwareAddressResolver {
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress>;
}

impl<F> HardwareAddressResolver for F
where
    F: Fn(&str) -> Option<EthernetAddress>,
{
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress> {
        self(adapter_id)
    }
}

/// Link-layer addresses reported by `getifaddrs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfAddrsResolver;

impl HardwareAddressResolver for IfAddrsResolver {
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress> {
        nix::ifaddrs::getifaddrs()
            .ok()?
            .filter(|ifaddr| ifaddr.interface_name == adapter_id)
            .filter_map(|ifaddr| ifaddr.address?.as_link_addr()?.addr())
            .map(EthernetAddress)
            .find(|mac| !is_zero_mac(mac))
    }
}

/// Reads `<root>/<adapter>/address`, normally under `/sys/class/net`.
#[derive(Debug, Clone)]
pub struct SysfsResolver {
    root: PathBuf,
}

impl SysfsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsResolver {
    fn default() -> Self {
        Self::new("/sys/class/net")
    }
}

impl HardwareAddressResolver for SysfsResolver {
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress> {
        let path = self.root.join(adapter_id).join("address");
        let text = fs::read_to_string(&path).ok()?;
        parse_mac(text.trim()).ok()
    }
}

/// Fixed table of addresses.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    addresses: HashMap<String, EthernetAddress>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter_id: impl Into<String>, mac: EthernetAddress) -> Self {
        self.addresses.insert(adapter_id.into(), mac);
        self
    }
}

impl HardwareAddressResolver for StaticResolver {
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress> {
        self.addresses.get(adapter_id).copied()
    }
}

/// Tries each resolver in order. All-zero answers count as a miss.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn HardwareAddressResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// `getifaddrs` first, then sysfs.
    pub fn system() -> Self {
        Self::new()
            .then(IfAddrsResolver)
            .then(SysfsResolver::default())
    }

    pub fn then(mut self, resolver: impl HardwareAddressResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl HardwareAddressResolver for ResolverChain {
    fn resolve(&self, adapter_id: &str) -> Option<EthernetAddress> {
        self.resolvers.iter().enumerate().find_map(|(i, resolver)| {
            let mac = resolver.resolve(adapter_id).filter(|mac| !is_zero_mac(mac));
            if mac.is_none() {
                trace!(adapter = adapter_id, resolver = i, "address resolver missed");
            }
            mac
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    #[test]
    fn test_adapter_matches_id_or_description() {
        let adapter = AdapterInfo {
            id: "eth0".into(),
            description: "Intel I210".into(),
        };

        assert!(adapter.matches("eth0"));
        assert!(adapter.matches("Intel I210"));
        assert!(!adapter.matches("eth1"));
    }

    #[test]
    fn test_resolver_chain_falls_through() {
        let chain = ResolverChain::new()
            .then(|_: &str| -> Option<EthernetAddress> { None })
            .then(|_: &str| Some(EthernetAddress([0; 6])))
            .then(StaticResolver::new().with("eth0", MAC));

        assert_eq!(chain.resolve("eth0"), Some(MAC));
        assert_eq!(chain.resolve("eth1"), None);
    }

    #[test]
    fn test_sysfs_resolver() {
        let root = std::env::temp_dir().join(format!("pnprobe-sysfs-{}", std::process::id()));
        let adapter = root.join("eth7");
        fs::create_dir_all(&adapter).unwrap();
        fs::write(adapter.join("address"), "02:00:00:00:00:01\n").unwrap();

        let resolver = SysfsResolver::new(&root);
        assert_eq!(resolver.resolve("eth7"), Some(MAC));
        assert_eq!(resolver.resolve("eth8"), None);

        fs::remove_dir_all(&root).unwrap();
    }
}
