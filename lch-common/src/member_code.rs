//! Member code formatting and parsing
//!
//! A canonical member code has the shape `LCH-SSSS-O`:
//! - `SSSS`: family serial number, zero-padded to at least 4 digits
//! - `O`: order within the family (1 = head of family), unpadded
//!
//! Older records carry legacy codes such as `LCH42` or `lch0042`. Those can be
//! recovered into a serial number; the order is then assumed to be 1.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Literal prefix shared by every member code
pub const CODE_PREFIX: &str = "LCH";

/// Order value of the head of a family
pub const HEAD_OF_FAMILY_ORDER: i64 = 1;

/// `LCH` followed by digits, anywhere in the code
static LEGACY_SERIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)LCH([0-9]+)").expect("legacy serial pattern is valid"));

/// Whole code is `LCH` followed by digits only (no hyphens)
static STRICT_LEGACY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^LCH([0-9]+)$").expect("strict legacy pattern is valid"));

static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^LCH-([0-9]{4,})-([0-9]+)$").expect("canonical pattern is valid"));

/// Structured member code (serial + order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberCode {
    pub serial: i64,
    pub order: i64,
}

impl MemberCode {
    pub fn new(serial: i64, order: i64) -> Self {
        Self { serial, order }
    }

    /// Code of the head of family for `serial`
    pub fn head_of(serial: i64) -> Self {
        Self::new(serial, HEAD_OF_FAMILY_ORDER)
    }

    /// Recover a head-of-family code from a legacy code
    ///
    /// Matches `LCH<digits>` case-insensitively anywhere in `code`. Canonical
    /// codes never match because of the hyphen after the prefix.
    ///
    /// Returns `None` when nothing matches or the digits overflow `i64`.
    /// `LCH0` recovers serial 0.
    ///
    /// # Examples
    /// ```
    /// use lch_common::MemberCode;
    ///
    /// assert_eq!(MemberCode::from_legacy("LCH42"), Some(MemberCode::new(42, 1)));
    /// assert_eq!(MemberCode::from_legacy("lch0007"), Some(MemberCode::new(7, 1)));
    /// assert_eq!(MemberCode::from_legacy("LCH-0042-1"), None);
    /// assert_eq!(MemberCode::from_legacy("ABC123"), None);
    /// ```
    pub fn from_legacy(code: &str) -> Option<Self> {
        let caps = LEGACY_SERIAL.captures(code)?;
        Self::serial_from_digits(&caps[1]).map(Self::head_of)
    }

    /// Recover a code from a value that is exactly `LCH<digits>`
    ///
    /// Used for denormalized copies whose owner could not be matched; the
    /// order is always 1.
    pub fn from_strict_legacy(code: &str) -> Option<Self> {
        let caps = STRICT_LEGACY.captures(code)?;
        Self::serial_from_digits(&caps[1]).map(Self::head_of)
    }

    /// Parse a canonical `LCH-SSSS-O` code
    pub fn parse(code: &str) -> Option<Self> {
        let caps = CANONICAL.captures(code)?;
        let serial = caps[1].parse().ok()?;
        let order = caps[2].parse().ok()?;
        Some(Self::new(serial, order))
    }

    pub fn is_head_of_family(&self) -> bool {
        self.order == HEAD_OF_FAMILY_ORDER
    }

    fn serial_from_digits(digits: &str) -> Option<i64> {
        digits.parse::<i64>().ok()
    }
}

impl fmt::Display for MemberCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{}", CODE_PREFIX, self.serial, self.order)
    }
}

/// True when `code` is exactly the rendering of its own parsed form
///
/// `LCH-42-1` parses poorly (fewer than 4 serial digits) and `LCH-0042-01`
/// renders back as `LCH-0042-1`, so neither counts as canonical.
pub fn is_canonical(code: &str) -> bool {
    MemberCode::parse(code).is_some_and(|parsed| parsed.to_string() == code)
}

/// True when `code` is a recoverable strict legacy code (`LCH` + digits, any case)
pub fn is_strict_legacy(code: &str) -> bool {
    MemberCode::from_strict_legacy(code).is_some()
}
