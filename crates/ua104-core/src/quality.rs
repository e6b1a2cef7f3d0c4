// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Quality bit-mask shared by the OPC UA and IEC 104 sides.
//!
//! Bit positions follow the IEC 60870-5-101/104 quality descriptor (QDS), so
//! the mask can be written to the wire without translation:
//!
//! ```text
//!   bit   7    6    5    4    3    2    1    0
//!        IV   NT   SB   BL    -    -    -   OV
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Packed quality flags describing how trustworthy a value is.
///
/// # Examples
///
/// ```
/// use ua104_core::quality::QualityFlags;
///
/// let q = QualityFlags::INVALID | QualityFlags::BLOCKED;
/// assert!(q.contains(QualityFlags::INVALID));
/// assert_eq!(q.bits(), 0x90);
/// assert_eq!(q.to_string(), "IV|BL");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityFlags(u8);

impl QualityFlags {
    /// No flag set: the value is good.
    pub const GOOD: Self = Self(0);
    /// OV: the value exceeded its predefined range.
    pub const OVERFLOW: Self = Self(0x01);
    /// BL: the value is blocked for transmission.
    pub const BLOCKED: Self = Self(0x10);
    /// SB: the value was substituted by an operator or automatic source.
    pub const SUBSTITUTED: Self = Self(0x20);
    /// NT: the last update was not successful (non-topical).
    pub const NON_TOPICAL: Self = Self(0x40);
    /// IV: the value is invalid.
    pub const INVALID: Self = Self(0x80);

    const ALL_BITS: u8 = 0xF1;

    const NAMED: [(Self, &'static str); 5] = [
        (Self::INVALID, "IV"),
        (Self::NON_TOPICAL, "NT"),
        (Self::SUBSTITUTED, "SB"),
        (Self::BLOCKED, "BL"),
        (Self::OVERFLOW, "OV"),
    ];

    /// Builds flags from raw bits, dropping bits that carry no quality flag.
    #[inline]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns the raw bit-mask.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if no flag is set.
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the flags of `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the flags of `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Sets or clears the flags of `other`.
    #[inline]
    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.insert(other)
        } else {
            self.remove(other)
        }
    }

    /// Returns a copy with only the flags also present in `mask`.
    #[inline]
    pub const fn intersection(self, mask: Self) -> Self {
        Self(self.0 & mask.0)
    }

    /// Returns the short names of the set flags, most significant first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for QualityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for QualityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for QualityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_good() {
            return f.write_str("GOOD");
        }
        f.write_str(&self.names().join("|"))
    }
}

impl FromStr for QualityFlags {
    type Err = String;

    /// Parses a list such as `"iv,nt"` or `"IV|BL"`; an empty string or
    /// `good` yields no flags.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::GOOD;
        for part in s.split(|c: char| c == ',' || c == '|').map(str::trim).filter(|p| !p.is_empty()) {
            let upper = part.to_ascii_uppercase();
            if upper == "GOOD" {
                continue;
            }
            let flag = Self::NAMED
                .iter()
                .find(|(_, name)| *name == upper)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| format!("unknown quality flag '{}'", part))?;
            flags.insert(flag);
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        assert_eq!(QualityFlags::INVALID.bits(), 0x80);
        assert_eq!(QualityFlags::NON_TOPICAL.bits(), 0x40);
        assert_eq!(QualityFlags::SUBSTITUTED.bits(), 0x20);
        assert_eq!(QualityFlags::BLOCKED.bits(), 0x10);
        assert_eq!(QualityFlags::OVERFLOW.bits(), 0x01);
    }

    #[test]
    fn test_truncate_drops_reserved_bits() {
        assert_eq!(QualityFlags::from_bits_truncate(0xFF).bits(), 0xF1);
    }

    #[test]
    fn test_set_and_remove() {
        let mut q = QualityFlags::GOOD;
        q.set(QualityFlags::SUBSTITUTED, true);
        q.insert(QualityFlags::OVERFLOW);
        assert_eq!(q.names(), vec!["SB", "OV"]);
        q.set(QualityFlags::SUBSTITUTED, false);
        assert_eq!(q, QualityFlags::OVERFLOW);
    }

    #[test]
    fn test_parse() {
        let q: QualityFlags = "iv, nt".parse().unwrap();
        assert_eq!(q, QualityFlags::INVALID | QualityFlags::NON_TOPICAL);
        assert_eq!("".parse::<QualityFlags>().unwrap(), QualityFlags::GOOD);
        assert!("xx".parse::<QualityFlags>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(QualityFlags::GOOD.to_string(), "GOOD");
        assert_eq!((QualityFlags::OVERFLOW | QualityFlags::INVALID).to_string(), "IV|OV");
    }
}
