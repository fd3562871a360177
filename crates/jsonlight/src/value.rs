//! Raw JSON values.
//!
//! [`Value`] is a JSON tree read verbatim from the token stream. It backs
//! untyped values kept as opaque JSON text and custom annotation values the
//! reader does not interpret.
use core::fmt::{self, Write as _};

/// Members of an object in document order.
pub type Map = Vec<(String, Value)>;
/// Items of an array.
pub type Array = Vec<Value>;

/// A JSON value as defined by [RFC 8259].
///
/// Numbers keep their lexical form and objects keep their member order, so
/// `to_string` reproduces the value exactly up to whitespace:
///
/// ```
/// use jsonlight::Value;
///
/// let v = Value::Object(vec![
///     ("b".into(), Value::Number("1.50".into())),
///     ("a".into(), Value::String("x".into())),
/// ]);
/// assert_eq!(v.to_string(), r#"{"b":1.50,"a":"x"}"#);
/// ```
///
/// [RFC 8259]: https://datatracker.ietf.org/doc/html/rfc8259
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Value {
    /// `null`
    #[default]
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// A number in its lexical form.
    Number(String),
    /// A string, unescaped.
    String(String),
    /// An array.
    Array(Array),
    /// An object.
    Object(Map),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<crate::token::Scalar> for Value {
    fn from(s: crate::token::Scalar) -> Self {
        use crate::token::Scalar;
        match s {
            Scalar::Null => Self::Null,
            Scalar::Boolean(b) => Self::Boolean(b),
            Scalar::Number(n) => Self::Number(n),
            Scalar::String(s) => Self::String(s),
        }
    }
}

impl Value {
    /// Whether this is `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(..))
    }

    /// Whether this is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(..))
    }

    /// Returns the string payload of [`Value::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up an object member by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(members) => members.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Escapes a string for inclusion in a JSON string literal.
///
/// Quotes, backslashes, control characters and the Unicode line separators
/// are written as escape sequences.
pub(crate) fn write_escaped_string<W: fmt::Write>(src: &str, f: &mut W) -> fmt::Result {
    for c in src.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            // pre-2019 JSON parsers choke on raw line separators
            '\u{2028}' | '\u{2029}' => write!(f, "\\u{:04X}", c as u32)?,
            c if c.is_control() && (c as u32) <= 0xFFFF => write!(f, "\\u{:04X}", c as u32)?,
            _ => f.write_char(c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Number(n) => f.write_str(n),
            Value::String(s) => {
                f.write_char('"')?;
                write_escaped_string(s, f)?;
                f.write_char('"')
            }
            Value::Array(arr) => {
                f.write_char('[')?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_char(']')
            }
            Value::Object(members) => {
                f.write_char('{')?;
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    f.write_char('"')?;
                    write_escaped_string(k, f)?;
                    write!(f, "\":{v}")?;
                }
                f.write_char('}')
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn escapes_control_characters() {
        let v = Value::String("a\"b\\c\nd\u{1}".into());
        assert_eq!(v.to_string(), r#""a\"b\\c\nd\u0001""#);
    }

    #[test]
    fn nested_display_keeps_member_order() {
        let v = Value::Array(vec![
            Value::Null,
            Value::Object(vec![("z".into(), true.into()), ("a".into(), Value::Array(vec![]))]),
        ]);
        assert_eq!(v.to_string(), r#"[null,{"z":true,"a":[]}]"#);
        assert_eq!(v.get("z"), None);
    }
}
