use profinet_probe_lib::{EncodeDcpError, ParseMacError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open adapter {adapter}: {reason}")]
    AdapterOpenFailed { adapter: String, reason: String },

    #[error("adapter channel is not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] EncodeDcpError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn adapter_open_failed(adapter: impl Into<String>, reason: impl ToString) -> Self {
        Error::AdapterOpenFailed {
            adapter: adapter.into(),
            reason: reason.to_string(),
        }
    }

    pub fn send_failed(reason: impl ToString) -> Self {
        Error::SendFailed(reason.to_string())
    }

    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Error::InvalidTarget(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

impl From<ParseMacError> for Error {
    fn from(err: ParseMacError) -> Self {
        Error::InvalidTarget(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use profinet_probe_lib::parse_mac;

    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::adapter_open_failed("eth9", "no such adapter");
        assert!(matches!(err, Error::AdapterOpenFailed { .. }));
        assert_eq!(err.to_string(), "failed to open adapter eth9: no such adapter");

        let err = Error::NotImplemented("reset to factory");
        assert_eq!(err.to_string(), "reset to factory is not implemented");
    }

    #[test]
    fn test_mac_error_conversion() {
        let err: Error = parse_mac("nope").unwrap_err().into();
        assert!(matches!(err, Error::InvalidTarget(ref msg) if msg.contains("nope")));
    }
}
