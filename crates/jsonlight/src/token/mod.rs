//! JSON tokens and the incremental tokenizer that produces them.
//!
//! The [`Tokenizer`] accepts input in arbitrary chunks (text or bytes) and
//! hands out whole tokens. When the unread input ends in the middle of a
//! token it returns `Ok(None)` and consumes nothing, so the caller can feed
//! more input and ask again:
//!
//! ```
//! use jsonlight::{Scalar, Token, Tokenizer};
//!
//! let mut tokenizer = Tokenizer::new();
//! tokenizer.feed(r#"{"Id": 4"#);
//! assert_eq!(tokenizer.next_token().unwrap(), Some(Token::StartObject));
//! assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Property("Id".into())));
//! // `4` may still continue as `42`
//! assert_eq!(tokenizer.next_token().unwrap(), None);
//! tokenizer.feed("2}");
//! tokenizer.finish();
//! assert_eq!(
//!     tokenizer.next_token().unwrap(),
//!     Some(Token::Primitive(Scalar::Number("42".into())))
//! );
//! ```

mod buffer;
mod escape_buffer;
mod literal_buffer;

use core::fmt;

use buffer::Buffer;
use escape_buffer::{UnicodeEscapeBuffer, combine_surrogates};
use literal_buffer::{LiteralMatcher, Step};
use thiserror::Error;

use crate::error::ReaderError;

/// A JSON scalar with its lexical class preserved.
///
/// Numbers keep their source text so that conversion to the target type can
/// decide about precision and overflow.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    /// `null`
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// A number as written.
    Number(String),
    /// A string, unescaped.
    String(String),
}

impl Scalar {
    /// Whether this is `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Number(n) => f.write_str(n),
            Scalar::String(s) => {
                f.write_str("\"")?;
                crate::value::write_escaped_string(s, f)?;
                f.write_str("\"")
            }
        }
    }
}

/// One JSON token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Token {
    /// Nothing has been read yet.
    #[default]
    None,
    /// `{`
    StartObject,
    /// `}`
    EndObject,
    /// `[`
    StartArray,
    /// `]`
    EndArray,
    /// An object member name.
    Property(String),
    /// A scalar value.
    Primitive(Scalar),
    /// The document ended.
    EndOfInput,
}

impl Token {
    /// Whether this is a scalar.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(..))
    }

    /// Whether this is `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Primitive(Scalar::Null))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::None => f.write_str("nothing"),
            Token::StartObject => f.write_str("'{'"),
            Token::EndObject => f.write_str("'}'"),
            Token::StartArray => f.write_str("'['"),
            Token::EndArray => f.write_str("']'"),
            Token::Property(name) => write!(f, "property '{name}'"),
            Token::Primitive(s) => write!(f, "value {s}"),
            Token::EndOfInput => f.write_str("end of input"),
        }
    }
}

/// Malformed JSON found by the [`Tokenizer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    /// A character that cannot start or continue a token.
    #[error("invalid character '{}'", .0.escape_debug())]
    InvalidCharacter(char),
    /// A `\` followed by an unknown escape.
    #[error("invalid escape character '{}'", .0.escape_debug())]
    InvalidEscapeChar(char),
    /// A non-hex digit in a `\u` escape.
    #[error("invalid unicode escape sequence at character: '{0}'")]
    InvalidUnicodeEscapeChar(char),
    /// An unpaired surrogate.
    #[error("invalid unicode escape sequence \\u{0:X}")]
    InvalidUnicodeEscapeSequence(u32),
    /// Input after the top-level value.
    #[error("unexpected character '{}' after the end of the document", .0.escape_debug())]
    TrailingCharacters(char),
    /// The input ended inside a value.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    BeforePropertyName { first: bool },
    AfterPropertyName,
    BeforePropertyValue,
    BeforeArrayValue { first: bool },
    AfterPropertyValue,
    AfterArrayValue,
    End,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberState {
    Sign,
    Zero,
    DecimalInteger,
    DecimalPoint,
    DecimalFraction,
    DecimalExponent,
    DecimalExponentSign,
    DecimalExponentInteger,
}

impl NumberState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Zero | Self::DecimalInteger | Self::DecimalFraction | Self::DecimalExponentInteger
        )
    }
}

/// A lexeme starting at the head of the ring: either complete with the
/// number of characters it spans, or cut off by the end of the fed input.
enum Lexed<T> {
    Complete(T, usize),
    Incomplete,
}

/// Incremental JSON tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    source: Buffer,
    /// Trailing bytes of a UTF-8 sequence split across `feed_bytes` calls.
    pending_bytes: Vec<u8>,
    end_of_input: bool,
    line: usize,
    column: usize,
    state: ParseState,
    stack: Vec<Container>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// A tokenizer with no input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Buffer::new(),
            pending_bytes: Vec::new(),
            end_of_input: false,
            line: 1,
            column: 1,
            state: ParseState::Start,
            stack: Vec::new(),
        }
    }

    /// Creates a tokenizer over a complete document.
    #[must_use]
    pub fn from_complete(text: &str) -> Self {
        let mut tokenizer = Self::new();
        tokenizer.feed(text);
        tokenizer.finish();
        tokenizer
    }

    /// Appends text.
    pub fn feed(&mut self, text: &str) {
        self.source.push(text);
    }

    /// Feeds raw UTF-8. A multi-byte sequence may be split across calls;
    /// invalid sequences decode to U+FFFD.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        self.pending_bytes.extend_from_slice(bytes);
        let data = core::mem::take(&mut self.pending_bytes);
        let mut offset = 0;
        while offset < data.len() {
            let rest = &data[offset..];
            let (ch, len) = bstr::decode_utf8(rest);
            match ch {
                Some(c) => {
                    self.source.push_char(c);
                    offset += len;
                }
                None if is_incomplete_utf8(rest) => break,
                None => {
                    self.source.push_char('\u{FFFD}');
                    offset += len.max(1);
                }
            }
        }
        self.pending_bytes.extend_from_slice(&data[offset..]);
    }

    /// Marks the end of input. Tokens cut off by the end become errors.
    pub fn finish(&mut self) {
        if !self.pending_bytes.is_empty() {
            self.pending_bytes.clear();
            self.source.push_char('\u{FFFD}');
        }
        self.end_of_input = true;
    }

    /// Whether [`Tokenizer::finish`] was called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_of_input
    }

    /// Returns the next whole token, or `Ok(None)` when more input is needed.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Syntax`] for malformed JSON, with the line and column
    /// of the offending token.
    pub fn next_token(&mut self) -> Result<Option<Token>, ReaderError> {
        loop {
            self.skip_whitespace();
            let Some(c) = self.source.peek() else {
                if !self.end_of_input {
                    return Ok(None);
                }
                return match self.state {
                    ParseState::End | ParseState::Done => {
                        self.state = ParseState::Done;
                        Ok(Some(Token::EndOfInput))
                    }
                    _ => Err(self.error(SyntaxError::UnexpectedEndOfInput)),
                };
            };

            match self.state {
                ParseState::Start | ParseState::BeforePropertyValue => return self.lex_value(c),
                ParseState::BeforeArrayValue { first } => {
                    if c == ']' {
                        if !first {
                            return Err(self.error(SyntaxError::InvalidCharacter(c)));
                        }
                        return Ok(Some(self.close(Container::Array)));
                    }
                    return self.lex_value(c);
                }
                ParseState::BeforePropertyName { first } => match c {
                    '}' if first => return Ok(Some(self.close(Container::Object))),
                    '"' => {
                        return match self.lex_string()? {
                            Lexed::Incomplete => Ok(None),
                            Lexed::Complete(name, len) => {
                                self.consume(len);
                                self.state = ParseState::AfterPropertyName;
                                Ok(Some(Token::Property(name)))
                            }
                        };
                    }
                    _ => return Err(self.error(SyntaxError::InvalidCharacter(c))),
                },
                ParseState::AfterPropertyName => {
                    if c != ':' {
                        return Err(self.error(SyntaxError::InvalidCharacter(c)));
                    }
                    self.consume(1);
                    self.state = ParseState::BeforePropertyValue;
                }
                ParseState::AfterPropertyValue => match c {
                    ',' => {
                        self.consume(1);
                        self.state = ParseState::BeforePropertyName { first: false };
                    }
                    '}' => return Ok(Some(self.close(Container::Object))),
                    _ => return Err(self.error(SyntaxError::InvalidCharacter(c))),
                },
                ParseState::AfterArrayValue => match c {
                    ',' => {
                        self.consume(1);
                        self.state = ParseState::BeforeArrayValue { first: false };
                    }
                    ']' => return Ok(Some(self.close(Container::Array))),
                    _ => return Err(self.error(SyntaxError::InvalidCharacter(c))),
                },
                ParseState::End | ParseState::Done => {
                    return Err(self.error(SyntaxError::TrailingCharacters(c)));
                }
            }
        }
    }

    fn lex_value(&mut self, c: char) -> Result<Option<Token>, ReaderError> {
        let lexed = match c {
            '{' => {
                self.consume(1);
                self.stack.push(Container::Object);
                self.state = ParseState::BeforePropertyName { first: true };
                return Ok(Some(Token::StartObject));
            }
            '[' => {
                self.consume(1);
                self.stack.push(Container::Array);
                self.state = ParseState::BeforeArrayValue { first: true };
                return Ok(Some(Token::StartArray));
            }
            '"' => match self.lex_string()? {
                Lexed::Complete(s, len) => Lexed::Complete(Scalar::String(s), len),
                Lexed::Incomplete => Lexed::Incomplete,
            },
            'n' | 't' | 'f' => self.lex_literal(c)?,
            '-' | '0'..='9' => self.lex_number()?,
            _ => return Err(self.error(SyntaxError::InvalidCharacter(c))),
        };

        match lexed {
            Lexed::Incomplete => Ok(None),
            Lexed::Complete(scalar, len) => {
                self.consume(len);
                self.state = self.after_value();
                Ok(Some(Token::Primitive(scalar)))
            }
        }
    }

    /// Lexes a string whose opening quote is at the head of the ring.
    fn lex_string(&self) -> Result<Lexed<String>, ReaderError> {
        let mut out = String::new();
        let mut high: Option<u16> = None;
        let mut i = 1;
        loop {
            let Some(ch) = self.source.get(i) else {
                return self.incomplete();
            };
            if let (Some(hi), false) = (high, ch == '\\') {
                return Err(self.error(SyntaxError::InvalidUnicodeEscapeSequence(u32::from(hi))));
            }
            match ch {
                '"' => return Ok(Lexed::Complete(out, i + 1)),
                '\\' => {
                    let Some(esc) = self.source.get(i + 1) else {
                        return self.incomplete();
                    };
                    let decoded = match esc {
                        '"' | '\\' | '/' => esc,
                        'b' => '\u{0008}',
                        'f' => '\u{000C}',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'u' => {
                            let mut escape = UnicodeEscapeBuffer::new();
                            let mut unit = 0;
                            for k in 0..4 {
                                let Some(h) = self.source.get(i + 2 + k) else {
                                    return self.incomplete();
                                };
                                if let Some(u) = escape.feed(h).map_err(|e| self.error(e))? {
                                    unit = u;
                                }
                            }
                            i += 6;
                            if high.is_none() && (0xD800..=0xDBFF).contains(&unit) {
                                high = Some(unit);
                            } else {
                                out.push(combine_surrogates(high.take(), unit).map_err(|e| self.error(e))?);
                            }
                            continue;
                        }
                        other => return Err(self.error(SyntaxError::InvalidEscapeChar(other))),
                    };
                    if let Some(hi) = high {
                        return Err(self.error(SyntaxError::InvalidUnicodeEscapeSequence(u32::from(hi))));
                    }
                    out.push(decoded);
                    i += 2;
                }
                // JSON allows 0x20 .. 0x10FFFF unescaped.
                '\0'..='\x1F' => return Err(self.error(SyntaxError::InvalidCharacter(ch))),
                _ => {
                    out.push(ch);
                    i += 1;
                }
            }
        }
    }

    fn lex_literal(&self, first: char) -> Result<Lexed<Scalar>, ReaderError> {
        let Some(mut literal) = LiteralMatcher::start(first) else {
            return Err(self.error(SyntaxError::InvalidCharacter(first)));
        };
        let mut i = 1;
        loop {
            let Some(ch) = self.source.get(i) else {
                return self.incomplete();
            };
            match literal.step(ch) {
                Step::NeedMore => i += 1,
                Step::Done(scalar) => return Ok(Lexed::Complete(scalar, i + 1)),
                Step::Reject => return Err(self.error(SyntaxError::InvalidCharacter(ch))),
            }
        }
    }

    fn lex_number(&self) -> Result<Lexed<Scalar>, ReaderError> {
        use NumberState::*;

        let mut text = String::new();
        let mut state = Sign;
        let mut i = 0;
        loop {
            let Some(ch) = self.source.get(i) else {
                if !self.end_of_input {
                    return Ok(Lexed::Incomplete);
                }
                if state.is_terminal() {
                    return Ok(Lexed::Complete(Scalar::Number(text), i));
                }
                return Err(self.error(SyntaxError::UnexpectedEndOfInput));
            };

            let next = match (state, ch) {
                (Sign, '-') if i == 0 => Some(Sign),
                (Sign, '0') => Some(Zero),
                (Sign, '1'..='9') | (DecimalInteger, '0'..='9') => Some(DecimalInteger),
                (Zero | DecimalInteger, '.') => Some(DecimalPoint),
                (DecimalPoint | DecimalFraction, '0'..='9') => Some(DecimalFraction),
                (Zero | DecimalInteger | DecimalFraction, 'e' | 'E') => Some(DecimalExponent),
                (DecimalExponent, '+' | '-') => Some(DecimalExponentSign),
                (DecimalExponent | DecimalExponentSign | DecimalExponentInteger, '0'..='9') => {
                    Some(DecimalExponentInteger)
                }
                _ => None,
            };

            match next {
                Some(next) => {
                    text.push(ch);
                    state = next;
                    i += 1;
                }
                None if state.is_terminal() => return Ok(Lexed::Complete(Scalar::Number(text), i)),
                None => return Err(self.error(SyntaxError::InvalidCharacter(ch))),
            }
        }
    }

    fn close(&mut self, container: Container) -> Token {
        self.consume(1);
        let popped = self.stack.pop();
        debug_assert_eq!(popped, Some(container));
        self.state = self.after_value();
        match container {
            Container::Object => Token::EndObject,
            Container::Array => Token::EndArray,
        }
    }

    fn after_value(&self) -> ParseState {
        match self.stack.last() {
            None => ParseState::End,
            Some(Container::Object) => ParseState::AfterPropertyValue,
            Some(Container::Array) => ParseState::AfterArrayValue,
        }
    }

    fn skip_whitespace(&mut self) {
        let mut n = 0;
        while let Some(' ' | '\n' | '\r' | '\t') = self.source.get(n) {
            n += 1;
        }
        if n > 0 {
            self.consume(n);
        }
    }

    fn consume(&mut self, n: usize) {
        let (line, column) = (&mut self.line, &mut self.column);
        self.source.consume(n, |ch| {
            if ch == '\n' {
                *line += 1;
                *column = 1;
            } else {
                *column += 1;
            }
        });
    }

    fn incomplete<T>(&self) -> Result<Lexed<T>, ReaderError> {
        if self.end_of_input {
            Err(self.error(SyntaxError::UnexpectedEndOfInput))
        } else {
            Ok(Lexed::Incomplete)
        }
    }

    fn error(&self, err: SyntaxError) -> ReaderError {
        ReaderError::Syntax {
            message: err.to_string(),
            line: self.line,
            column: self.column,
        }
    }
}

/// Whether `bytes` is a truncated but so far valid UTF-8 sequence.
fn is_incomplete_utf8(bytes: &[u8]) -> bool {
    let needed = match bytes.first() {
        Some(0xC2..=0xDF) => 2,
        Some(0xE0..=0xEF) => 3,
        Some(0xF0..=0xF4) => 4,
        _ => return false,
    };
    bytes.len() < needed && bytes[1..].iter().all(|b| b & 0xC0 == 0x80)
}

#[cfg(test)]
mod tests {
    use super::{Scalar, Token, Tokenizer};
    use crate::error::ReaderError;

    fn tokens(chunks: &[&str]) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            tokenizer.feed(chunk);
            while let Some(token) = tokenizer.next_token().unwrap() {
                out.push(token);
            }
        }
        tokenizer.finish();
        loop {
            let token = tokenizer.next_token().unwrap().expect("finished tokenizer");
            let done = token == Token::EndOfInput;
            out.push(token);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn object_with_every_scalar() {
        let out = tokens(&[r#"{"a":[null,true,false,-1.5e3,"x\né"]}"#]);
        assert_eq!(
            out,
            vec![
                Token::StartObject,
                Token::Property("a".into()),
                Token::StartArray,
                Token::Primitive(Scalar::Null),
                Token::Primitive(Scalar::Boolean(true)),
                Token::Primitive(Scalar::Boolean(false)),
                Token::Primitive(Scalar::Number("-1.5e3".into())),
                Token::Primitive(Scalar::String("x\né".into())),
                Token::EndArray,
                Token::EndObject,
                Token::EndOfInput,
            ]
        );
    }

    #[test]
    fn chunk_boundaries_do_not_change_tokens() {
        let text = r#"{"name":"va\"lue","n":12345,"t":true,"e":"😀"}"#;
        let whole = tokens(&[text]);
        for split in 1..text.len() {
            let (a, b) = text.split_at(split);
            assert_eq!(tokens(&[a, b]), whole, "split at {split}");
        }
    }

    #[test]
    fn bytes_split_inside_utf8_sequence() {
        let text = r#"["é"]"#.as_bytes();
        let mut tokenizer = Tokenizer::new();
        tokenizer.feed_bytes(&text[..3]);
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::StartArray));
        assert_eq!(tokenizer.next_token().unwrap(), None);
        tokenizer.feed_bytes(&text[3..]);
        tokenizer.finish();
        assert_eq!(
            tokenizer.next_token().unwrap(),
            Some(Token::Primitive(Scalar::String("é".into())))
        );
    }

    #[test]
    fn trailing_comma_is_rejected() {
        let mut tokenizer = Tokenizer::from_complete("[1,]");
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::StartArray));
        assert!(tokenizer.next_token().unwrap().is_some());
        let err = tokenizer.next_token().unwrap_err();
        assert!(matches!(err, ReaderError::Syntax { column: 4, .. }), "{err}");
    }

    #[test]
    fn truncated_document_is_an_error_once_finished() {
        let mut tokenizer = Tokenizer::from_complete(r#"{"a":"#);
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::StartObject));
        assert_eq!(tokenizer.next_token().unwrap(), Some(Token::Property("a".into())));
        assert!(tokenizer.next_token().is_err());
    }

    #[test]
    fn bad_literal_reports_position() {
        let mut tokenizer = Tokenizer::from_complete("\n  nul!");
        let err = tokenizer.next_token().unwrap_err();
        assert!(matches!(err, ReaderError::Syntax { line: 2, column: 3, .. }), "{err}");
    }
}
