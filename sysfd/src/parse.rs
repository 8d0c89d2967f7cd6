//! Strict string conversions.
//!
//! Values read out of procfs/sysfs arrive as decimal or hex text with a
//! trailing newline. These helpers convert them with no tolerance for junk:
//! the whole string must be consumed, and out-of-range values are reported
//! as such rather than clamped or wrapped.
use std::num::IntErrorKind;

use num_traits::NumCast;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid numeric string")]
    Invalid,
    #[error("number is out of range")]
    OutOfRange,
}

/// Parses a string as an integer, radix 10.
pub fn number<T: NumCast>(s: &str) -> Result<T, ParseError> {
    number_radix(s, 10)
}

/// Parses a string as an integer in the given radix (2 to 36).
pub fn number_radix<T: NumCast>(s: &str, radix: u32) -> Result<T, ParseError> {
    if !(2..=36).contains(&radix) {
        return Err(ParseError::Invalid);
    }
    match i128::from_str_radix(s, radix) {
        Ok(value) => T::from(value).ok_or(ParseError::OutOfRange),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Err(ParseError::OutOfRange),
            _ => Err(ParseError::Invalid),
        },
    }
}

/// Parses a string as a floating-point value.
pub fn float<T: NumCast>(s: &str) -> Result<T, ParseError> {
    let value: f64 = s.parse().map_err(|_| ParseError::Invalid)?;
    if value.is_infinite() {
        return Err(ParseError::OutOfRange);
    }
    T::from(value).ok_or(ParseError::OutOfRange)
}

/// Strips trailing whitespace and NUL bytes.
pub fn rtrim(s: &str) -> &str {
    s.trim_end_matches(|c: char| c.is_ascii_whitespace() || c == '\u{0b}' || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_decimal() {
        assert_eq!(number::<u8>("255"), Ok(255));
        assert_eq!(number::<i32>("-40"), Ok(-40));
        assert_eq!(number::<u64>("18446744073709551615"), Ok(u64::MAX));
    }

    #[test]
    fn test_number_rejects_junk() {
        assert_eq!(number::<u32>(""), Err(ParseError::Invalid));
        assert_eq!(number::<u32>("12x"), Err(ParseError::Invalid));
        assert_eq!(number::<u32>(" 12"), Err(ParseError::Invalid));
        assert_eq!(number::<u32>("12 "), Err(ParseError::Invalid));
    }

    #[test]
    fn test_number_range_checks() {
        assert_eq!(number::<u8>("256"), Err(ParseError::OutOfRange));
        assert_eq!(number::<u32>("-1"), Err(ParseError::OutOfRange));
        assert_eq!(number::<i8>("-129"), Err(ParseError::OutOfRange));
        assert_eq!(
            number::<u64>("999999999999999999999999999999999999999999"),
            Err(ParseError::OutOfRange)
        );
    }

    #[test]
    fn test_number_radix() {
        assert_eq!(number_radix::<u32>("ff", 16), Ok(255));
        assert_eq!(number_radix::<u32>("777", 8), Ok(0o777));
        assert_eq!(number_radix::<u32>("1010", 2), Ok(10));
        assert_eq!(number_radix::<u32>("ff", 1), Err(ParseError::Invalid));
    }

    #[test]
    fn test_float() {
        assert_eq!(float::<f64>("3.5"), Ok(3.5));
        assert_eq!(float::<f32>("-0.25"), Ok(-0.25));
        assert_eq!(float::<f64>("1e999"), Err(ParseError::OutOfRange));
        assert_eq!(float::<f64>("abc"), Err(ParseError::Invalid));
    }

    #[test]
    fn test_rtrim() {
        assert_eq!(rtrim("42\n"), "42");
        assert_eq!(rtrim("a b\t \r\n\0"), "a b");
        assert_eq!(rtrim("   "), "");
        assert_eq!(rtrim("none"), "none");
    }
}
