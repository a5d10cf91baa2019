//! 128-bit opaque asset identity.
//!
//! Parsable from and formattable to the canonical 8-4-4-4-12 hex form.
//! Backed by [`uuid::Uuid`] for the byte layout and hex codec, but kept as
//! its own newtype since the engine's notion of "applicable" (neither zero
//! nor all-ones) doesn't exist on `Uuid` itself.

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};

/// A 128-bit identity, bytewise-comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid(Uuid);

impl Guid {
    /// The reserved zero value (`00000000-0000-0000-0000-000000000000`).
    pub const ZERO: Guid = Guid(Uuid::nil());

    /// The reserved invalid value, all bits set.
    pub const INVALID: Guid = Guid(Uuid::from_bytes([0xffu8; 16]));

    /// Generate a fresh, random, applicable GUID.
    pub fn new() -> Self {
        Guid(Uuid::new_v4())
    }

    /// Parse the canonical `8-4-4-4-12` hex form.
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Guid)
            .map_err(|e| Error::string_conversion(format!("invalid GUID \"{s}\": {e}")))
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Neither [`Guid::ZERO`] nor [`Guid::INVALID`].
    pub fn is_applicable(&self) -> bool {
        *self != Guid::ZERO && *self != Guid::INVALID
    }

    pub fn is_zero(&self) -> bool {
        *self == Guid::ZERO
    }

    pub fn is_invalid(&self) -> bool {
        *self == Guid::INVALID
    }
}

impl Default for Guid {
    /// The default GUID is [`Guid::ZERO`], never a freshly generated one —
    /// callers that want identity must ask for it explicitly via `new()`.
    fn default() -> Self {
        Guid::ZERO
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Guid::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_guid_round_trip() {
        let text = "54a6f55c-feaf-4aa9-87cd-cc9b487c31ef";
        let g = Guid::from_string(text).unwrap();
        assert_eq!(g.to_string(), text);
        assert!(g.is_applicable());
    }

    #[test]
    fn fresh_guid_round_trips_through_string() {
        let g = Guid::new();
        let parsed = Guid::from_string(&g.to_string()).unwrap();
        assert_eq!(parsed, g);
    }

    #[test]
    fn zero_and_invalid_format_to_canonical_literals() {
        assert_eq!(Guid::ZERO.to_string(), "00000000-0000-0000-0000-000000000000");
        assert_eq!(Guid::INVALID.to_string(), "ffffffff-ffff-ffff-ffff-ffffffffffff");
        assert!(!Guid::ZERO.is_applicable());
        assert!(!Guid::INVALID.is_applicable());
    }

    #[test]
    fn invalid_text_is_a_string_conversion_error() {
        let err = Guid::from_string("not-a-guid").unwrap_err();
        assert!(err.is_parser_fail() == false);
        assert!(matches!(err, Error::StringConversionError(_)));
    }
}
