//! PROFINET device discovery and a simulated connection to one device, on top
//! of raw Ethernet frames.
//!
//! The frame codecs live in `profinet-probe-lib`; this crate adds the adapter
//! channel, the DCP discovery engine and the connection session.

pub mod config;
pub mod constants;
pub mod discovery;
mod error;
pub mod ethernet;
pub mod scheduler;
pub mod session;
mod util;

pub use config::{Config, DiscoveryConfig, LinkConfig, SessionConfig};
pub use discovery::{DiscoveredDevice, DiscoveryEngine, Unconfirmed};
pub use error::{Error, Result};
pub use ethernet::{
    list_adapters, AdapterBackend, AdapterChannel, AdapterInfo, HardwareAddressResolver,
    ResolverChain,
};
pub use session::{ConnectionSession, SessionEvent, SessionObserver, SessionState};
