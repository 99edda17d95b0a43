//! # Canonical card identifier.
//!
//! A [`Uid`] is always uppercase hexadecimal with no separators, so two reads of
//! the same card compare equal regardless of how the adapter rendered them.
//!
//! ```rust
//! use cardwatch::Uid;
//!
//! let a = Uid::parse("04:a1:b2:c3").unwrap();
//! let b = Uid::from_bytes(&[0x04, 0xA1, 0xB2, 0xC3]).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "04A1B2C3");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::UidError;

/// Canonical uppercase hex identifier read from a presented card.
///
/// Cheap to clone (`Arc<str>` inside).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(Arc<str>);

impl Uid {
    /// Parses adapter output into a canonical uid.
    ///
    /// Spaces, `:` and `-` are accepted as byte separators and dropped;
    /// hex digits are uppercased.
    pub fn parse(input: &str) -> Result<Self, UidError> {
        let mut out = String::with_capacity(input.len());
        for c in input.trim().chars() {
            match c {
                ' ' | ':' | '-' => continue,
                c if c.is_ascii_hexdigit() => out.push(c.to_ascii_uppercase()),
                _ => {
                    return Err(UidError::InvalidHex {
                        input: input.to_string(),
                    });
                }
            }
        }
        if out.is_empty() {
            return Err(UidError::Empty);
        }
        Ok(Self(out.into()))
    }

    /// Renders raw uid bytes as two uppercase hex digits per byte.
    ///
    /// An empty slice is [`UidError::Empty`]; adapters report "no card" as `None`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UidError> {
        if bytes.is_empty() {
            return Err(UidError::Empty);
        }
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02X}"));
        }
        Ok(Self(out.into()))
    }

    /// Returns the canonical string form.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.0)
    }
}

impl From<Uid> for Arc<str> {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl std::str::FromStr for Uid {
    type Err = UidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uid::parse(s)
    }
}
