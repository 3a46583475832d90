//! Item name storage
//!
//! Short names live inline in the item; longer ones get their own heap
//! buffer. The variant tag says which, nothing is inferred from the bytes.

use std::fmt;

use crate::error::{StatsError, StatsResult};

/// Names strictly shorter than this are stored inline.
pub const INLINE_NAME_LEN: usize = 32;

/// Longest accepted name in bytes, as reported by statfs.
pub const MAX_NAME_LEN: usize = 255;

/// Polynomial hash over the name bytes (seed 0, multiplier 31).
///
/// Only used to reject candidates quickly during lookup.
pub fn name_hash(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |hash, b| hash.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Reject names the kernel could never ask for.
pub fn validate(name: &str) -> StatsResult<()> {
    if name.is_empty() {
        return Err(StatsError::InvalidArgument("empty name"));
    }
    if name == "." || name == ".." {
        return Err(StatsError::InvalidArgument("reserved name"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StatsError::InvalidArgument("name longer than 255 bytes"));
    }
    if name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(StatsError::InvalidArgument("name contains '/' or NUL"));
    }
    Ok(())
}

#[derive(Clone)]
pub enum Name {
    Inline { len: u8, buf: [u8; INLINE_NAME_LEN] },
    Owned(Box<str>),
}

impl Name {
    pub fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        if bytes.len() < INLINE_NAME_LEN {
            let mut buf = [0u8; INLINE_NAME_LEN];
            buf[..bytes.len()].copy_from_slice(bytes);
            Name::Inline {
                len: bytes.len() as u8,
                buf,
            }
        } else {
            Name::Owned(name.into())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            // Inline bytes are always a full copy of a &str.
            Name::Inline { len, buf } => {
                std::str::from_utf8(&buf[..usize::from(*len)]).unwrap_or_default()
            }
            Name::Owned(name) => name,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Name::Inline { .. })
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_polynomial() {
        assert_eq!(name_hash(""), 0);
        assert_eq!(name_hash("a"), 97);
        assert_eq!(name_hash("ab"), 97 * 31 + 98);
        assert_ne!(name_hash("ab"), name_hash("ba"));
    }

    #[test]
    fn test_hash_wraps() {
        let long = "z".repeat(200);
        // Must not overflow-panic in debug builds.
        let _ = name_hash(&long);
    }

    #[test]
    fn test_short_name_inline() {
        let name = Name::new("count");
        assert!(name.is_inline());
        assert_eq!(name.as_str(), "count");
        assert!(name == *"count");
    }

    #[test]
    fn test_threshold() {
        let below = "x".repeat(INLINE_NAME_LEN - 1);
        let at = "x".repeat(INLINE_NAME_LEN);
        assert!(Name::new(&below).is_inline());
        assert!(!Name::new(&at).is_inline());
        assert_eq!(Name::new(&at).as_str(), at);
    }

    #[test]
    fn test_multibyte_inline() {
        let name = Name::new("débit_µs");
        assert!(name.is_inline());
        assert_eq!(name.to_string(), "débit_µs");
    }

    #[test]
    fn test_validate() {
        assert!(validate("jobs").is_ok());
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("..").is_err());
        assert!(validate("a/b").is_err());
        assert!(validate("a\0b").is_err());
        assert!(validate("...").is_ok());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate(&"n".repeat(MAX_NAME_LEN)).is_ok());
        assert!(matches!(
            validate(&"n".repeat(MAX_NAME_LEN + 1)),
            Err(StatsError::InvalidArgument(_))
        ));
        // Counted in bytes, not characters.
        assert!(validate(&"µ".repeat(128)).is_err());
    }
}
