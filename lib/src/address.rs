use smoltcp::wire::EthernetAddress;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{input}` is not a MAC address of six hex octets")]
pub struct ParseMacError {
    pub input: String,
}

/// Parses `AA:BB:CC:DD:EE:FF` (or `-` separated) into an address.
pub fn parse_mac(input: &str) -> Result<EthernetAddress, ParseMacError> {
    let invalid = || ParseMacError {
        input: input.to_owned(),
    };

    let trimmed = input.trim();
    let separator = if trimmed.contains('-') { '-' } else { ':' };

    let mut octets = [0u8; 6];
    let mut count = 0;

    for part in trimmed.split(separator) {
        if count == octets.len() || part.len() != 2 {
            return Err(invalid());
        }
        octets[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        count += 1;
    }

    if count != octets.len() {
        return Err(invalid());
    }

    Ok(EthernetAddress(octets))
}

/// Colon separated upper-case rendering, the form device tooling prints.
pub fn format_mac(address: &EthernetAddress) -> String {
    let o = address.0;
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        o[0], o[1], o[2], o[3], o[4], o[5]
    )
}

pub fn is_zero_mac(address: &EthernetAddress) -> bool {
    address.0 == [0; 6]
}
