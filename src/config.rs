use std::net::Ipv4Addr;
use std::time::Duration;

use profinet_probe_lib::{
    MAX_CYCLIC_DATA_LENGTH, MIN_CYCLIC_DATA_LENGTH, PNIO_CM_PORT, RT_CLASS_1_FRAME_ID,
    RT_CLASS_1_FRAME_ID_LAST,
};

use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub promiscuous: bool,
    pub receive_buffer_len: usize,
    /// Upper bound for a single blocking receive.
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            promiscuous: true,
            receive_buffer_len: MAX_FRAME_SIZE,
            read_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub window: Duration,
    pub poll_timeout: Duration,
    /// Spread devices apply to their identify responses, in 10 ms steps.
    pub response_delay_factor: u16,
    /// Store set-request values permanently rather than until power cycle.
    pub permanent: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DISCOVERY_WINDOW,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            response_delay_factor: DEFAULT_RESPONSE_DELAY_FACTOR,
            permanent: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub phase_interval: Duration,
    pub cycle_interval: Duration,
    pub cycle_counter_step: u16,
    pub frame_id: u16,
    pub cyclic_data_len: usize,
    pub source_ip: Ipv4Addr,
    pub connect_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            phase_interval: DEFAULT_PHASE_INTERVAL,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            cycle_counter_step: DEFAULT_CYCLE_COUNTER_STEP,
            frame_id: RT_CLASS_1_FRAME_ID,
            cyclic_data_len: MIN_CYCLIC_DATA_LENGTH,
            source_ip: Ipv4Addr::UNSPECIFIED,
            connect_port: PNIO_CM_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub link: LinkConfig,
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        self.discovery.validate()?;
        self.session.validate()
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.receive_buffer_len < profinet_probe_lib::ETHERNET_MIN_FRAME_LEN {
            return Err(Error::config(format!(
                "receive buffer of {} bytes cannot hold a minimum frame",
                self.receive_buffer_len
            )));
        }

        if self.read_timeout.is_zero() {
            return Err(Error::config("read timeout must be more than 0"));
        }

        Ok(())
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout.is_zero() {
            return Err(Error::config("poll timeout must be more than 0"));
        }

        if self.poll_timeout > self.window {
            return Err(Error::config(format!(
                "poll timeout {:?} is longer than the discovery window {:?}",
                self.poll_timeout, self.window
            )));
        }

        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.phase_interval.is_zero() {
            return Err(Error::config("phase interval must be more than 0"));
        }

        if self.cycle_interval.is_zero() {
            return Err(Error::config("cycle interval must be more than 0"));
        }

        if self.cycle_counter_step == 0 {
            return Err(Error::config("cycle counter step must be more than 0"));
        }

        if !(RT_CLASS_1_FRAME_ID..=RT_CLASS_1_FRAME_ID_LAST).contains(&self.frame_id) {
            return Err(Error::config(format!(
                "frame id {:#06x} is outside the RT class 1 range",
                self.frame_id
            )));
        }

        if !(MIN_CYCLIC_DATA_LENGTH..=MAX_CYCLIC_DATA_LENGTH).contains(&self.cyclic_data_len) {
            return Err(Error::config(format!(
                "cyclic data length {} must be between {} and {}",
                self.cyclic_data_len, MIN_CYCLIC_DATA_LENGTH, MAX_CYCLIC_DATA_LENGTH
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.phase_interval, Duration::from_millis(500));
        assert_eq!(config.session.cycle_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_session_config() {
        let mut config = Config::default();
        config.session.cycle_counter_step = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.session.frame_id = 0xfefe;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.session.cyclic_data_len = 8;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_discovery_config() {
        let mut config = Config::default();
        config.discovery.poll_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.discovery.window = Duration::from_millis(5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
