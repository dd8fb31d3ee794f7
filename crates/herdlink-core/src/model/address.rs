// ── Peripheral hardware address ──

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable 48-bit hardware address of a peripheral.
///
/// Parsed from `AA:BB:CC:DD:EE:FF` (either case, `-` also accepted as the
/// separator) and always displayed upper-case and colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeripheralAddress([u8; 6]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid peripheral address '{0}'")]
pub struct AddressParseError(pub String);

impl PeripheralAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for PeripheralAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError(s.to_owned());
        let trimmed = s.trim();
        let separator = if trimmed.contains('-') { '-' } else { ':' };

        let mut octets = [0u8; 6];
        let mut parts = trimmed.split(separator);
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for PeripheralAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeripheralAddress> for String {
    fn from(address: PeripheralAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_separated() {
        let addr: PeripheralAddress = "aa:bb:cc:dd:ee:0f".parse().unwrap();
        assert_eq!(addr.octets(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x0F]);
    }

    #[test]
    fn parses_dash_separated() {
        let addr: PeripheralAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn display_is_upper_case() {
        let addr = PeripheralAddress::new([0x01, 0x02, 0x0a, 0x0b, 0xc0, 0xff]);
        assert_eq!(addr.to_string(), "01:02:0A:0B:C0:FF");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            "not-a-mac",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA:BB:CC:DD:EE:GG",
            "AAA:BB:CC:DD:EE:F",
            "AA:BB-CC:DD:EE:FF",
            "+A:BB:CC:DD:EE:FF",
        ] {
            assert!(raw.parse::<PeripheralAddress>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn serde_uses_display_form() {
        let addr: PeripheralAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
        let back: PeripheralAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
