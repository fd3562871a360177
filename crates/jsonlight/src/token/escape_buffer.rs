//! Decoding of four-digit `\uXXXX` escapes.
//!
//! [`UnicodeEscapeBuffer`] accumulates exactly four ASCII hexadecimal digits
//! into a UTF-16 code unit. Pairing surrogates into a scalar value is left to
//! the tokenizer, which sees both halves.

use super::SyntaxError;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnicodeEscapeBuffer {
    acc: u32,
    len: u8,
}

impl UnicodeEscapeBuffer {
    pub fn new() -> Self {
        Self { acc: 0, len: 0 }
    }

    pub fn reset(&mut self) {
        self.acc = 0;
        self.len = 0;
    }

    #[inline]
    fn hex_val(c: char) -> Option<u32> {
        c.to_digit(16)
    }

    /// Feeds one hex digit. Returns the code unit once the fourth digit has
    /// arrived, resetting for the next escape.
    pub fn feed(&mut self, c: char) -> Result<Option<u16>, SyntaxError> {
        let d = Self::hex_val(c).ok_or(SyntaxError::InvalidUnicodeEscapeChar(c))?;

        self.acc = (self.acc << 4) | d;
        self.len += 1;

        if self.len < 4 {
            return Ok(None);
        }

        let code = self.acc;
        self.reset();
        // four hex digits always fit
        Ok(Some(u16::try_from(code).unwrap_or(u16::MAX)))
    }
}

/// Combines a UTF-16 code unit, possibly completing a pending high surrogate,
/// into a `char`.
pub(crate) fn combine_surrogates(high: Option<u16>, unit: u16) -> Result<char, SyntaxError> {
    match (high, unit) {
        (Some(hi), 0xDC00..=0xDFFF) => {
            let code = 0x10000 + ((u32::from(hi) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
            char::from_u32(code).ok_or(SyntaxError::InvalidUnicodeEscapeSequence(code))
        }
        (Some(hi), _) => Err(SyntaxError::InvalidUnicodeEscapeSequence(u32::from(hi))),
        (None, 0xD800..=0xDFFF) => Err(SyntaxError::InvalidUnicodeEscapeSequence(u32::from(unit))),
        (None, _) => char::from_u32(u32::from(unit))
            .ok_or(SyntaxError::InvalidUnicodeEscapeSequence(u32::from(unit))),
    }
}
