//! Bluetooth UUID strings
//!
//! Platform bridges hand attributes over as strings. Assigned numbers such
//! as "180D" (16-bit) or "0000180D" (32-bit) are shorthand for a UUID inside
//! the Bluetooth base UUID `0000xxxx-0000-1000-8000-00805F9B34FB`.

use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::types::AttributeTarget;

const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805F9B34FB";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid UUID {input:?}: {reason}")]
pub struct InvalidUuid {
    pub input: String,
    reason: String,
}

/// Expand a 16- or 32-bit short UUID into its full 128-bit form
///
/// Anything else is returned trimmed but otherwise untouched.
pub fn expand_short_uuid(uuid: &str) -> String {
    let short = uuid.trim();
    let is_hex = short.chars().all(|c| c.is_ascii_hexdigit());
    match short.len() {
        4 if is_hex => format!("0000{}{}", short.to_uppercase(), BASE_UUID_SUFFIX),
        8 if is_hex => format!("{}{}", short.to_uppercase(), BASE_UUID_SUFFIX),
        _ => short.to_string(),
    }
}

/// Parse a full or short UUID string
pub fn parse_uuid(uuid: &str) -> Result<Uuid, InvalidUuid> {
    Uuid::parse_str(&expand_short_uuid(uuid)).map_err(|e| InvalidUuid {
        input: uuid.to_string(),
        reason: e.to_string(),
    })
}

/// `"<characteristic>"` or `"<characteristic>/<descriptor>"`
impl FromStr for AttributeTarget {
    type Err = InvalidUuid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((characteristic, descriptor)) => Ok(AttributeTarget::Descriptor {
                characteristic: parse_uuid(characteristic)?,
                descriptor: parse_uuid(descriptor)?,
            }),
            None => Ok(AttributeTarget::Characteristic(parse_uuid(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::CCCD_UUID;

    #[test]
    fn test_expand_short_uuid() {
        assert_eq!(
            expand_short_uuid("180d"),
            "0000180D-0000-1000-8000-00805F9B34FB"
        );
        assert_eq!(
            expand_short_uuid(" 0000180D "),
            "0000180D-0000-1000-8000-00805F9B34FB"
        );
        // Not hex, or already long: left alone
        assert_eq!(expand_short_uuid("zz12"), "zz12");
        let full = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
        assert_eq!(expand_short_uuid(full), full);
    }

    #[test]
    fn test_parse_uuid() {
        assert_eq!(parse_uuid("2902").unwrap(), CCCD_UUID);
        assert_eq!(
            parse_uuid("00002902-0000-1000-8000-00805F9B34FB").unwrap(),
            CCCD_UUID
        );
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert_eq!(err.input, "not-a-uuid");
    }

    #[test]
    fn test_target_from_str() {
        let heart_rate = parse_uuid("2A37").unwrap();
        assert_eq!(
            "2A37".parse::<AttributeTarget>().unwrap(),
            AttributeTarget::Characteristic(heart_rate)
        );
        assert_eq!(
            "2a37/2902".parse::<AttributeTarget>().unwrap(),
            AttributeTarget::Descriptor {
                characteristic: heart_rate,
                descriptor: CCCD_UUID,
            }
        );
        assert!("2A37/".parse::<AttributeTarget>().is_err());
    }
}
