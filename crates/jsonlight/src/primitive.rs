//! Lexical conversion of JSON scalars to Edm primitive values.

use crate::{
    edm::PrimitiveKind,
    error::{ReaderError, Result},
    item::StreamReference,
    token::Scalar,
};

/// A converted primitive value.
///
/// Types without a natural Rust counterpart keep their validated lexical
/// form.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// `Edm.Boolean`
    Boolean(bool),
    /// `Edm.Byte`
    Byte(u8),
    /// `Edm.SByte`
    SByte(i8),
    /// `Edm.Int16`
    Int16(i16),
    /// `Edm.Int32`
    Int32(i32),
    /// `Edm.Int64`
    Int64(i64),
    /// `Edm.Single`
    Single(f32),
    /// `Edm.Double`
    Double(f64),
    /// `Edm.Decimal` in its lexical form.
    Decimal(String),
    /// `Edm.String`
    String(String),
    /// `Edm.Guid`
    Guid(String),
    /// `Edm.Date`, `YYYY-MM-DD`.
    Date(String),
    /// `Edm.DateTimeOffset`, RFC 3339.
    DateTimeOffset(String),
    /// `Edm.TimeOfDay`
    TimeOfDay(String),
    /// `Edm.Duration`, ISO 8601.
    Duration(String),
    /// Base64url text.
    Binary(String),
    /// `Edm.Stream` links.
    Stream(StreamReference),
}

impl Primitive {
    /// The Edm type of the value.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::SByte(_) => PrimitiveKind::SByte,
            Primitive::Int16(_) => PrimitiveKind::Int16,
            Primitive::Int32(_) => PrimitiveKind::Int32,
            Primitive::Int64(_) => PrimitiveKind::Int64,
            Primitive::Single(_) => PrimitiveKind::Single,
            Primitive::Double(_) => PrimitiveKind::Double,
            Primitive::Decimal(_) => PrimitiveKind::Decimal,
            Primitive::String(_) => PrimitiveKind::String,
            Primitive::Guid(_) => PrimitiveKind::Guid,
            Primitive::Date(_) => PrimitiveKind::Date,
            Primitive::DateTimeOffset(_) => PrimitiveKind::DateTimeOffset,
            Primitive::TimeOfDay(_) => PrimitiveKind::TimeOfDay,
            Primitive::Duration(_) => PrimitiveKind::Duration,
            Primitive::Binary(_) => PrimitiveKind::Binary,
            Primitive::Stream(_) => PrimitiveKind::Stream,
        }
    }
}

/// The natural primitive kind of a scalar of unknown type.
///
/// Integers become `Edm.Int32` when they fit and `Edm.Int64` otherwise.
/// Other numbers become `Edm.Decimal`, or `Edm.Double` when written with an
/// exponent or when `ieee754_compatible` is set.
#[must_use]
pub fn infer_kind(scalar: &Scalar, ieee754_compatible: bool) -> Option<PrimitiveKind> {
    match scalar {
        Scalar::Null => None,
        Scalar::Boolean(_) => Some(PrimitiveKind::Boolean),
        Scalar::String(_) => Some(PrimitiveKind::String),
        Scalar::Number(text) => Some(infer_number(text, ieee754_compatible)),
    }
}

fn infer_number(text: &str, ieee754_compatible: bool) -> PrimitiveKind {
    let has_exponent = text.contains(['e', 'E']);
    if !has_exponent && !text.contains('.') {
        if text.parse::<i32>().is_ok() {
            return PrimitiveKind::Int32;
        }
        if text.parse::<i64>().is_ok() {
            return PrimitiveKind::Int64;
        }
    }
    if has_exponent || ieee754_compatible {
        PrimitiveKind::Double
    } else {
        PrimitiveKind::Decimal
    }
}

/// Converts `scalar` to `kind`.
///
/// With `check_lexical_form`, `Edm.Int64` and `Edm.Decimal` must be quoted
/// exactly when `ieee754_compatible` is set. Inferred types skip the check.
///
/// # Errors
///
/// [`ReaderError::Conversion`] for a malformed value,
/// [`ReaderError::Overflow`] when it does not fit and
/// [`ReaderError::Ieee754Mismatch`] for the wrong lexical form.
pub fn convert(
    kind: PrimitiveKind,
    scalar: &Scalar,
    ieee754_compatible: bool,
    check_lexical_form: bool,
) -> Result<Primitive> {
    let conversion = |reason: &'static str| ReaderError::Conversion {
        type_name: kind.name().to_owned(),
        value: scalar.to_string(),
        reason,
    };
    let overflow = || ReaderError::Overflow {
        type_name: kind.name().to_owned(),
        value: scalar.to_string(),
    };

    if kind.is_ieee754_sensitive() && check_lexical_form {
        let quoted = matches!(scalar, Scalar::String(_));
        let is_number = matches!(scalar, Scalar::Number(_));
        if (ieee754_compatible && is_number) || (!ieee754_compatible && quoted) {
            return Err(ReaderError::Ieee754Mismatch {
                type_name: kind.name().to_owned(),
                value: scalar.to_string(),
                quoted_expected: ieee754_compatible,
            });
        }
    }

    match kind {
        PrimitiveKind::Boolean => match scalar {
            Scalar::Boolean(b) => Ok(Primitive::Boolean(*b)),
            _ => Err(conversion("expected true or false")),
        },
        PrimitiveKind::Byte => integer(scalar, &conversion, &overflow).map(Primitive::Byte),
        PrimitiveKind::SByte => integer(scalar, &conversion, &overflow).map(Primitive::SByte),
        PrimitiveKind::Int16 => integer(scalar, &conversion, &overflow).map(Primitive::Int16),
        PrimitiveKind::Int32 => integer(scalar, &conversion, &overflow).map(Primitive::Int32),
        PrimitiveKind::Int64 => {
            let text = numeric_text(scalar).ok_or_else(|| conversion("expected a number"))?;
            parse_integer(text, &conversion, &overflow).map(Primitive::Int64)
        }
        PrimitiveKind::Single => {
            let value = floating(scalar).ok_or_else(|| conversion("expected a number"))?;
            #[allow(clippy::cast_possible_truncation)]
            let single = value as f32;
            if value.is_finite() && !single.is_finite() {
                return Err(overflow());
            }
            Ok(Primitive::Single(single))
        }
        PrimitiveKind::Double => floating(scalar)
            .map(Primitive::Double)
            .ok_or_else(|| conversion("expected a number")),
        PrimitiveKind::Decimal => {
            let text = numeric_text(scalar).ok_or_else(|| conversion("expected a number"))?;
            if text.parse::<f64>().is_err() || text.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return Err(conversion("not a decimal number"));
            }
            Ok(Primitive::Decimal(text.to_owned()))
        }
        PrimitiveKind::String => match scalar {
            Scalar::String(s) => Ok(Primitive::String(s.clone())),
            _ => Err(conversion("expected a string")),
        },
        PrimitiveKind::Guid => lexical(scalar, is_guid, &conversion, "not a GUID").map(Primitive::Guid),
        PrimitiveKind::Date => lexical(scalar, is_date, &conversion, "not a date").map(Primitive::Date),
        PrimitiveKind::DateTimeOffset => {
            lexical(scalar, is_date_time_offset, &conversion, "not a date-time").map(Primitive::DateTimeOffset)
        }
        PrimitiveKind::TimeOfDay => {
            lexical(scalar, is_time_of_day, &conversion, "not a time of day").map(Primitive::TimeOfDay)
        }
        PrimitiveKind::Duration => lexical(scalar, is_duration, &conversion, "not a duration").map(Primitive::Duration),
        PrimitiveKind::Binary => lexical(scalar, is_base64, &conversion, "not base64url").map(Primitive::Binary),
        PrimitiveKind::Stream => Err(conversion("stream values cannot be read inline")),
    }
}

fn numeric_text(scalar: &Scalar) -> Option<&str> {
    match scalar {
        Scalar::Number(text) | Scalar::String(text) => Some(text),
        _ => None,
    }
}

fn parse_integer<T: TryFrom<i128>>(
    text: &str,
    conversion: &dyn Fn(&'static str) -> ReaderError,
    overflow: &dyn Fn() -> ReaderError,
) -> Result<T> {
    if text.contains(['.', 'e', 'E']) {
        return Err(conversion("not an integer"));
    }
    // i128 separates "too large" from "not a number" for every target width
    let wide = text.parse::<i128>().map_err(|e| match e.kind() {
        core::num::IntErrorKind::PosOverflow | core::num::IntErrorKind::NegOverflow => overflow(),
        _ => conversion("not an integer"),
    })?;
    T::try_from(wide).map_err(|_| overflow())
}

fn integer<T: TryFrom<i128>>(
    scalar: &Scalar,
    conversion: &dyn Fn(&'static str) -> ReaderError,
    overflow: &dyn Fn() -> ReaderError,
) -> Result<T> {
    match scalar {
        Scalar::Number(text) => parse_integer(text, conversion, overflow),
        _ => Err(conversion("expected a number")),
    }
}

fn floating(scalar: &Scalar) -> Option<f64> {
    match scalar {
        Scalar::Number(text) => text.parse().ok(),
        Scalar::String(text) => match text.as_str() {
            "INF" => Some(f64::INFINITY),
            "-INF" => Some(f64::NEG_INFINITY),
            "NaN" => Some(f64::NAN),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn lexical(
    scalar: &Scalar,
    valid: fn(&str) -> bool,
    conversion: &dyn Fn(&'static str) -> ReaderError,
    reason: &'static str,
) -> Result<String> {
    match scalar {
        Scalar::String(s) if valid(s) => Ok(s.clone()),
        Scalar::String(_) => Err(conversion(reason)),
        _ => Err(conversion("expected a string")),
    }
}

fn digits(s: &str, n: usize) -> bool {
    s.len() == n && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_guid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, n)| g.len() == n && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn is_date(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let mut parts = s.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => {
            y.len() >= 4
                && y.bytes().all(|b| b.is_ascii_digit())
                && digits(m, 2)
                && digits(d, 2)
                && (1..=12).contains(&m.parse::<u8>().unwrap_or(0))
                && (1..=31).contains(&d.parse::<u8>().unwrap_or(0))
        }
        _ => false,
    }
}

fn is_time_of_day(s: &str) -> bool {
    let (hms, fraction) = match s.split_once('.') {
        Some((hms, f)) => (hms, Some(f)),
        None => (s, None),
    };
    let parts: Vec<&str> = hms.split(':').collect();
    let well_formed = matches!(parts.len(), 2 | 3)
        && parts.iter().all(|p| digits(p, 2))
        && parts[0].parse::<u8>().is_ok_and(|h| h < 24)
        && parts[1..].iter().all(|p| p.parse::<u8>().is_ok_and(|v| v < 60));
    well_formed && fraction.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) && parts.len() == 3)
}

fn is_date_time_offset(s: &str) -> bool {
    let Some((date, rest)) = s.split_once('T') else {
        return false;
    };
    let time = if let Some(t) = rest.strip_suffix('Z') {
        t
    } else if let Some(i) = rest.rfind(['+', '-']) {
        if !is_time_of_day(&rest[i + 1..]) {
            return false;
        }
        &rest[..i]
    } else {
        return false;
    };
    is_date(date) && is_time_of_day(time)
}

fn is_duration(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let Some(body) = s.strip_prefix('P') else {
        return false;
    };
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'D' | b'T' | b'H' | b'M' | b'S' | b'.'))
}

fn is_base64(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'+' | b'/' | b'='))
}
