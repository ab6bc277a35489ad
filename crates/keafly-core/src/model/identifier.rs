// ── DHCP identifiers ──
//
// Identifiers are byte strings. Their textual form is lowercase hex,
// optionally colon separated. Parsing is case-insensitive and exact:
// every accepted text maps to exactly one byte string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Kind of identifier a host reservation is keyed by.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HostIdentifierType {
    HwAddress,
    ClientId,
    Duid,
    FlexId,
    CircuitId,
}

impl HostIdentifierType {
    /// Identifier types that never appear in lease data.
    pub fn is_lease_invisible(self) -> bool {
        matches!(self, Self::FlexId | Self::CircuitId)
    }
}

/// A typed identifier value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostIdentifier {
    #[serde(rename = "type")]
    pub id_type: HostIdentifierType,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

impl HostIdentifier {
    pub fn new(id_type: HostIdentifierType, value: Vec<u8>) -> Self {
        Self { id_type, value }
    }

    /// Parse the textual form of an identifier of the given type.
    pub fn parse(id_type: HostIdentifierType, text: &str) -> Result<Self, CoreError> {
        Ok(Self::new(id_type, parse_hex(text)?))
    }

    /// Hex without separators (`010203040506`).
    pub fn to_hex(&self) -> String {
        format_hex(&self.value, "")
    }

    /// Hex with colon separators (`01:02:03:04:05:06`).
    pub fn to_colon_hex(&self) -> String {
        format_hex(&self.value, ":")
    }
}

impl fmt::Display for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id_type, self.to_colon_hex())
    }
}

// ── Hex helpers ─────────────────────────────────────────────────────

/// Parse hex text with optional `:` or `-` separators.
///
/// Separated groups may hold one or two digits (`1:2:ab` is `01 02 ab`);
/// contiguous text must have an even number of digits.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::validation("identifier must not be empty"));
    }

    if text.contains([':', '-']) {
        return text
            .split([':', '-'])
            .map(|group| {
                if group.is_empty() || group.len() > 2 {
                    return Err(CoreError::validation(format!(
                        "invalid hex group {group:?} in {text:?}"
                    )));
                }
                u8::from_str_radix(group, 16).map_err(|_| {
                    CoreError::validation(format!("invalid hex group {group:?} in {text:?}"))
                })
            })
            .collect();
    }

    hex::decode(text)
        .map_err(|e| CoreError::validation(format!("invalid hex identifier {text:?}: {e}")))
}

/// Returns `true` when `text` parses as a hex identifier.
pub fn is_hex_identifier(text: &str) -> bool {
    parse_hex(text).is_ok()
}

/// Lowercase hex, bytes joined by `separator`.
pub fn format_hex(bytes: &[u8], separator: &str) -> String {
    if separator.is_empty() {
        return hex::encode(bytes);
    }
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(separator)
}

mod hex_bytes {
    use super::{Deserialize, Deserializer, Serializer, parse_hex};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hex(&text).map_err(serde::de::Error::custom)
    }
}

impl FromStr for HostIdentifier {
    type Err = CoreError;

    /// Parses `type=hex`, e.g. `hw-address=01:02:03:04:05:06`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once('=')
            .ok_or_else(|| CoreError::validation(format!("expected type=value, got {s:?}")))?;
        let id_type = kind
            .trim()
            .parse::<HostIdentifierType>()
            .map_err(|_| CoreError::validation(format!("unknown identifier type {kind:?}")))?;
        Self::parse(id_type, value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_contiguous_and_separated_forms_identically() {
        let plain = parse_hex("010203040506").unwrap();
        let colon = parse_hex("01:02:03:04:05:06").unwrap();
        let dashed = parse_hex("01-02-03-04-05-06").unwrap();
        let upper = parse_hex("0A:0B:0C").unwrap();
        assert_eq!(plain, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(plain, colon);
        assert_eq!(plain, dashed);
        assert_eq!(upper, vec![0x0a, 0x0b, 0x0c]);
    }

    #[test]
    fn short_groups_are_padded() {
        assert_eq!(parse_hex("1:2:ab").unwrap(), vec![0x01, 0x02, 0xab]);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("01::02").is_err());
        assert!(parse_hex("zz:01").is_err());
        assert!(parse_hex("cool.example.org").is_err());
    }

    #[test]
    fn formats_lowercase_with_optional_separator() {
        let id = HostIdentifier::parse(HostIdentifierType::HwAddress, "AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(id.to_hex(), "aabbccddeeff");
        assert_eq!(id.to_colon_hex(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn identifier_types_use_kea_names() {
        assert_eq!(HostIdentifierType::HwAddress.to_string(), "hw-address");
        assert_eq!(
            "circuit-id".parse::<HostIdentifierType>().unwrap(),
            HostIdentifierType::CircuitId
        );
        assert!(HostIdentifierType::FlexId.is_lease_invisible());
        assert!(!HostIdentifierType::Duid.is_lease_invisible());
    }

    #[test]
    fn parses_typed_text_form() {
        let id: HostIdentifier = "duid=00:01:02".parse().unwrap();
        assert_eq!(id.id_type, HostIdentifierType::Duid);
        assert_eq!(id.value, vec![0, 1, 2]);
        assert!("duid".parse::<HostIdentifier>().is_err());
    }

    #[test]
    fn serializes_value_as_hex() {
        let id = HostIdentifier::new(HostIdentifierType::ClientId, vec![0xde, 0xad]);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"type": "client-id", "value": "dead"}));
        let back: HostIdentifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
