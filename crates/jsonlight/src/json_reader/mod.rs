//! A token reader with buffering and member reordering.
//!
//! [`JsonReader`] is positioned on a current token and advances with
//! [`JsonReader::read`]. Between [`JsonReader::start_buffering`] and
//! [`JsonReader::stop_buffering`] every token read is recorded; stopping
//! rewinds to the token that was current when buffering started and replays
//! the recorded tokens before pulling new ones.
//!
//! With reordering enabled, every object pulled from the tokenizer is read
//! in full and its members are put in canonical order (see [`reorder`])
//! before its first member is handed out.

mod reorder;

use std::{collections::VecDeque, sync::Arc};

use log::debug;

use crate::{
    error::{ReaderError, Result},
    token::{Scalar, Token, Tokenizer},
    value::Value,
};

/// A run of tokens waiting to be handed out. Shared between copies of the
/// reader, so snapshots do not copy queued tokens.
#[derive(Debug, Clone)]
struct Segment {
    tokens: Arc<[Token]>,
    next: usize,
}

/// An object being pulled from the tokenizer ahead of the reader, up to its
/// matching `}`.
#[derive(Debug, Clone)]
struct Collecting {
    body: Arc<Vec<Token>>,
    depth: usize,
}

/// A token reader with one token of lookahead, optional object reordering
/// and recording of tokens for replay.
#[derive(Debug, Clone)]
pub struct JsonReader {
    tokenizer: Tokenizer,
    current: Token,
    /// Tokens handed out before pulling from the tokenizer.
    pending: VecDeque<Segment>,
    /// Tokens read since `start_buffering`, beginning with the token that
    /// was current at that point.
    recorded: Option<Vec<Token>>,
    enable_reordering: bool,
    max_depth: usize,
    collecting: Option<Collecting>,
    /// The tokenizer reported the end of input while collecting ahead.
    ended: bool,
    /// Handed out once the queued tokens before it are consumed.
    failure: Option<Arc<ReaderError>>,
}

impl JsonReader {
    /// A reader pulling from `tokenizer`. Objects nest at most `max_depth`
    /// levels when reordering.
    #[must_use]
    pub fn new(tokenizer: Tokenizer, enable_reordering: bool, max_depth: usize) -> Self {
        let mut reader = Self {
            tokenizer,
            current: Token::None,
            pending: VecDeque::new(),
            recorded: None,
            enable_reordering,
            max_depth,
            collecting: None,
            ended: false,
            failure: None,
        };
        reader.collect_ahead();
        reader
    }

    /// A reader over a complete document.
    #[must_use]
    pub fn from_complete(json: &str, enable_reordering: bool) -> Self {
        Self::new(Tokenizer::from_complete(json), enable_reordering, 100)
    }

    /// The current token.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.current
    }

    /// Appends input.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.tokenizer.feed_bytes(bytes);
        self.collect_ahead();
    }

    /// Marks the input as complete.
    pub fn finish(&mut self) {
        self.tokenizer.finish();
        self.collect_ahead();
    }

    /// Whether the input was marked complete.
    #[must_use]
    pub fn is_input_complete(&self) -> bool {
        self.tokenizer.is_finished()
    }

    /// Whether objects are reordered.
    #[must_use]
    pub fn is_reordering(&self) -> bool {
        self.enable_reordering
    }

    /// Advances to the next token.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Pending`] when the tokenizer needs more input. The
    /// reader is then only usable again from a copy taken before the call.
    pub fn read(&mut self) -> Result<&Token> {
        let token = match self.pop_pending() {
            Some(token) => token,
            None if self.enable_reordering => self.next_collected()?,
            None => self.tokenizer.next_token()?.ok_or(ReaderError::Pending)?,
        };
        if let Some(recorded) = &mut self.recorded {
            recorded.push(token.clone());
        }
        self.current = token;
        Ok(&self.current)
    }

    fn pop_pending(&mut self) -> Option<Token> {
        let segment = self.pending.front_mut()?;
        let token = segment.tokens.get(segment.next).cloned();
        segment.next += 1;
        if segment.next >= segment.tokens.len() {
            self.pending.pop_front();
        }
        token
    }

    fn push_front(&mut self, tokens: Vec<Token>) {
        if !tokens.is_empty() {
            self.pending.push_front(Segment {
                tokens: tokens.into(),
                next: 0,
            });
        }
    }

    /// With reordering, tokens only reach the reader through the queue once
    /// `collect_ahead` has seen whole objects.
    fn next_collected(&self) -> Result<Token> {
        if let Some(failure) = &self.failure {
            return Err(replay_error(failure));
        }
        if self.ended {
            Ok(Token::EndOfInput)
        } else {
            Err(ReaderError::Pending)
        }
    }

    /// Drains the tokenizer, queueing complete objects in canonical order.
    /// A partly received object is kept and continued on the next feed.
    fn collect_ahead(&mut self) {
        if !self.enable_reordering || self.ended || self.failure.is_some() {
            return;
        }
        loop {
            let outcome = match self.tokenizer.next_token() {
                Ok(Some(token)) => self.collect(token),
                Ok(None) => return,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.collecting = None;
                self.failure = Some(Arc::new(e));
                return;
            }
            if self.ended {
                return;
            }
        }
    }

    fn collect(&mut self, token: Token) -> Result<()> {
        if self.collecting.is_none() {
            match token {
                Token::StartObject => {
                    self.collecting = Some(Collecting {
                        body: Arc::new(Vec::new()),
                        depth: 1,
                    });
                }
                Token::EndOfInput => self.ended = true,
                other => self.pending.push_back(Segment {
                    tokens: Arc::new([other]),
                    next: 0,
                }),
            }
            return Ok(());
        }
        let max_depth = self.max_depth;
        let Some(collecting) = self.collecting.as_mut() else {
            return Ok(());
        };
        match token {
            Token::StartObject | Token::StartArray => {
                collecting.depth += 1;
                if collecting.depth > max_depth + 1 {
                    return Err(ReaderError::RecursionDepthExceeded { max: max_depth });
                }
            }
            Token::EndObject | Token::EndArray => collecting.depth -= 1,
            Token::EndOfInput | Token::None => return Err(ReaderError::UnbalancedNesting),
            Token::Property(_) | Token::Primitive(_) => {}
        }
        Arc::make_mut(&mut collecting.body).push(token);
        if collecting.depth > 0 {
            return Ok(());
        }

        let Some(Collecting { body, .. }) = self.collecting.take() else {
            return Ok(());
        };
        let body = Arc::try_unwrap(body).unwrap_or_else(|shared| (*shared).clone());
        debug!("reordering buffered object of {} tokens", body.len());
        let mut tokens = Vec::with_capacity(body.len() + 1);
        tokens.push(Token::StartObject);
        tokens.extend(reorder::reorder_object(body, 1, self.max_depth)?);
        self.pending.push_back(Segment {
            tokens: tokens.into(),
            next: 0,
        });
        Ok(())
    }

    /// Records tokens from the current one on, for [`JsonReader::stop_buffering`].
    pub fn start_buffering(&mut self) {
        debug_assert!(self.recorded.is_none(), "buffering is already active");
        self.recorded = Some(vec![self.current.clone()]);
    }

    /// Rewinds to the token that was current when buffering started.
    pub fn stop_buffering(&mut self) {
        debug_assert!(self.recorded.is_some(), "buffering is not active");
        let Some(mut recorded) = self.recorded.take() else {
            return;
        };
        let replay = recorded.split_off(1);
        self.push_front(replay);
        if let Some(first) = recorded.pop() {
            self.current = first;
        }
    }

    /// Whether tokens are being recorded.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.recorded.is_some()
    }

    /// Panics in debug builds while buffering.
    pub fn assert_not_buffering(&self) {
        debug_assert!(!self.is_buffering(), "the reader is buffering");
    }

    /// Skips the value starting at the current token.
    ///
    /// # Errors
    ///
    /// The current token does not start a value, or reading fails.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0_usize;
        loop {
            match &self.current {
                Token::StartObject | Token::StartArray => depth += 1,
                Token::EndObject | Token::EndArray => {
                    depth = depth.checked_sub(1).ok_or(ReaderError::UnbalancedNesting)?;
                }
                Token::Property(_) if depth > 0 => {}
                Token::Primitive(_) => {}
                other => return Err(ReaderError::unexpected("a value", other)),
            }
            self.read()?;
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Reads the value starting at the current token as a raw JSON tree.
    ///
    /// # Errors
    ///
    /// The current token does not start a value, the value nests deeper
    /// than the maximum depth, or reading fails.
    pub fn read_raw_value(&mut self) -> Result<Value> {
        self.read_raw_at(0)
    }

    fn read_raw_at(&mut self, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(ReaderError::RecursionDepthExceeded { max: self.max_depth });
        }
        match core::mem::take(&mut self.current) {
            Token::Primitive(scalar) => {
                self.read()?;
                Ok(scalar.into())
            }
            Token::StartArray => {
                self.read()?;
                let mut items = Vec::new();
                while self.current != Token::EndArray {
                    items.push(self.read_raw_at(depth + 1)?);
                }
                self.read()?;
                Ok(Value::Array(items))
            }
            Token::StartObject => {
                self.read()?;
                let mut members = Vec::new();
                loop {
                    match core::mem::take(&mut self.current) {
                        Token::Property(name) => {
                            self.read()?;
                            members.push((name, self.read_raw_at(depth + 1)?));
                        }
                        Token::EndObject => break,
                        other => return Err(ReaderError::unexpected("a property or '}'", other)),
                    }
                }
                self.read()?;
                Ok(Value::Object(members))
            }
            other => Err(ReaderError::unexpected("a value", other)),
        }
    }

    /// Consumes a string value.
    ///
    /// # Errors
    ///
    /// The current token is not a string.
    pub fn read_string(&mut self) -> Result<String> {
        match &self.current {
            Token::Primitive(Scalar::String(s)) => {
                let s = s.clone();
                self.read()?;
                Ok(s)
            }
            other => Err(ReaderError::unexpected("a string", other)),
        }
    }

    /// Consumes `expected`.
    ///
    /// # Errors
    ///
    /// The current token is something else.
    pub fn expect(&mut self, expected: &Token, description: &'static str) -> Result<()> {
        if &self.current != expected {
            return Err(ReaderError::unexpected(description, &self.current));
        }
        self.read()?;
        Ok(())
    }
}

/// Errors met while collecting ahead: syntax, nesting and depth errors.
fn replay_error(e: &ReaderError) -> ReaderError {
    match e {
        ReaderError::Syntax { message, line, column } => ReaderError::Syntax {
            message: message.clone(),
            line: *line,
            column: *column,
        },
        ReaderError::RecursionDepthExceeded { max } => ReaderError::RecursionDepthExceeded { max: *max },
        _ => ReaderError::UnbalancedNesting,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::JsonReader;
    use crate::{
        error::ReaderError,
        token::{Scalar, Token, Tokenizer},
        value::Value,
    };

    const DOC: &str = r##"{"value":[{"Id":1,"@odata.type":"#NS.T"},{"Id":2}],"@odata.context":"$metadata#T"}"##;

    fn drain(reader: &mut JsonReader) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = reader.read().unwrap().clone();
            if token == Token::EndOfInput {
                return tokens;
            }
            tokens.push(token);
        }
    }

    #[test]
    fn buffering_rewinds_to_the_start_token() {
        let mut reader = JsonReader::from_complete(r#"{"a":1,"b":[true]}"#, false);
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.token(), &Token::Property("a".into()));
        reader.start_buffering();
        for _ in 0..4 {
            reader.read().unwrap();
        }
        assert_eq!(reader.token(), &Token::Primitive(Scalar::Boolean(true)));
        reader.stop_buffering();
        assert_eq!(reader.token(), &Token::Property("a".into()));
        assert_eq!(reader.read().unwrap(), &Token::Primitive(Scalar::Number("1".into())));
        reader.assert_not_buffering();
    }

    #[test]
    fn replay_is_not_reordered_twice() {
        let mut reader = JsonReader::from_complete(r##"{"x":1,"@odata.type":"#T"}"##, true);
        reader.start_buffering();
        reader.read().unwrap();
        assert_eq!(reader.read().unwrap(), &Token::Property("@odata.type".into()));
        reader.stop_buffering();
        assert_eq!(reader.read().unwrap(), &Token::StartObject);
        assert_eq!(reader.read().unwrap(), &Token::Property("@odata.type".into()));
    }

    #[test]
    fn raw_values_and_skipping() {
        let mut reader = JsonReader::from_complete(r#"[{"k":[1,"s"]},null,2]"#, false);
        reader.read().unwrap();
        reader.read().unwrap();
        let raw = reader.read_raw_value().unwrap();
        assert_eq!(raw.to_string(), r#"{"k":[1,"s"]}"#);
        assert_eq!(reader.token(), &Token::Primitive(Scalar::Null));
        reader.skip_value().unwrap();
        assert_eq!(reader.read_raw_value().unwrap(), Value::Number("2".into()));
        assert_eq!(reader.token(), &Token::EndArray);
        assert!(reader.skip_value().is_err());
    }

    #[test]
    fn partial_objects_survive_refills() {
        let expected = drain(&mut JsonReader::from_complete(DOC, true));
        let mut reader = JsonReader::new(Tokenizer::new(), true, 100);
        let mut collected = 0;
        for chunk in DOC.as_bytes().chunks(3) {
            reader.feed(chunk);
            let Some(collecting) = &reader.collecting else {
                break;
            };
            assert!(collecting.body.len() >= collected, "the buffered object was restarted");
            collected = collecting.body.len();
            assert!(matches!(reader.clone().read(), Err(ReaderError::Pending)));
        }
        assert!(collected > 0);
        assert!(reader.collecting.is_none());
        reader.finish();
        assert_eq!(drain(&mut reader), expected);
    }

    #[test]
    fn copies_share_queued_tokens() {
        let mut reader = JsonReader::from_complete(DOC, true);
        reader.read().unwrap();
        reader.read().unwrap();
        let copy = reader.clone();
        assert!(Arc::ptr_eq(&copy.pending[0].tokens, &reader.pending[0].tokens));
        assert_eq!(drain(&mut reader), drain(&mut copy.clone()));
    }

    #[test]
    fn errors_follow_the_tokens_before_them() {
        let mut reader = JsonReader::new(Tokenizer::new(), true, 100);
        reader.feed(br#"{"a":1} x"#);
        reader.finish();
        assert_eq!(reader.read().unwrap(), &Token::StartObject);
        assert_eq!(reader.read().unwrap(), &Token::Property("a".into()));
        reader.read().unwrap();
        assert_eq!(reader.read().unwrap(), &Token::EndObject);
        assert!(matches!(reader.read(), Err(ReaderError::Syntax { .. })));
    }
}
