#![allow(missing_docs)]

mod common;

use std::io::{self, Read};

use common::{Chunked, ORDERS, model};
use jsonlight::{ReaderError, ReaderEvent, ReaderOptions, ReaderState, ReaderTarget, ResourceReader, Result};
use quickcheck_macros::quickcheck;
use rstest::rstest;

fn from_str(json: &str, options: ReaderOptions) -> Vec<ReaderEvent> {
    ResourceReader::from_str(json, model(), ReaderTarget::default(), options)
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

fn options(enable_reordering: bool, chunk_size: usize) -> ReaderOptions {
    ReaderOptions {
        enable_reordering,
        chunk_size,
        ..ReaderOptions::default()
    }
}

#[rstest]
fn chunked_reads_match_a_complete_string(
    #[values(1, 3, 7, 64)] step: usize,
    #[values(true, false)] enable_reordering: bool,
    #[values(5, 8192)] chunk_size: usize,
) {
    let expected = from_str(ORDERS, options(enable_reordering, chunk_size));
    let reader = ResourceReader::from_reader(
        Chunked::new(ORDERS, step),
        model(),
        ReaderTarget::default(),
        options(enable_reordering, chunk_size),
    );
    let events = reader.collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(events, expected);
}

/// Hands out its input in the given chunk sizes, cycling through them.
struct Splits {
    data: Vec<u8>,
    pos: usize,
    sizes: Vec<usize>,
    turn: usize,
}

impl Read for Splits {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.sizes.get(self.turn % self.sizes.len().max(1)).copied().unwrap_or(usize::MAX);
        self.turn += 1;
        let n = size.max(1).min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[quickcheck]
fn arbitrary_splits_read_the_same(sizes: Vec<u8>, enable_reordering: bool) -> bool {
    let source = Splits {
        data: ORDERS.as_bytes().to_vec(),
        pos: 0,
        sizes: sizes.into_iter().map(usize::from).collect(),
        turn: 0,
    };
    let events = ResourceReader::from_reader(source, model(), ReaderTarget::default(), options(enable_reordering, 16))
        .collect::<Result<Vec<_>>>();
    events.is_ok_and(|events| events == from_str(ORDERS, options(enable_reordering, 16)))
}

/// Fails after handing out `good` bytes; `Interrupted` every other call
/// before that.
struct Flaky {
    data: Vec<u8>,
    pos: usize,
    good: usize,
    calls: usize,
}

impl Read for Flaky {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(io::ErrorKind::Interrupted.into());
        }
        if self.pos == self.data.len() {
            return Ok(0);
        }
        if self.pos >= self.good {
            return Err(io::Error::other("connection reset"));
        }
        let n = 4_usize.min(buf.len()).min(self.good - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test_log::test]
fn io_errors_poison_the_reader() {
    let source = Flaky {
        data: ORDERS.as_bytes().to_vec(),
        pos: 0,
        good: 40,
        calls: 0,
    };
    let mut reader = ResourceReader::from_reader(source, model(), ReaderTarget::default(), options(false, 8));
    let err = loop {
        match reader.read() {
            Ok(true) => {}
            Ok(false) => panic!("the source fails before the payload ends"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, ReaderError::Io(_)), "unexpected error: {err:?}");
    assert_eq!(reader.state(), ReaderState::Exception);
    assert!(matches!(reader.read(), Err(ReaderError::Poisoned)));
}

#[test_log::test]
fn interrupted_reads_are_retried() {
    let source = Flaky {
        data: ORDERS.as_bytes().to_vec(),
        pos: 0,
        good: ORDERS.len(),
        calls: 0,
    };
    let reader = ResourceReader::from_reader(source, model(), ReaderTarget::default(), options(true, 8));
    let events = reader.take_while(|e| e.is_ok()).count();
    assert_eq!(events, from_str(ORDERS, options(true, 8)).len());
}

#[rstest]
#[case::reordering(true)]
#[case::streaming(false)]
fn truncated_source(#[case] enable_reordering: bool) {
    let json = &ORDERS[..ORDERS.find(r#""Lines""#).unwrap()];
    let reader = ResourceReader::from_reader(
        Chunked::new(json, 5),
        model(),
        ReaderTarget::default(),
        options(enable_reordering, 8),
    );
    let err = reader
        .collect::<Result<Vec<_>>>()
        .expect_err("a truncated payload must not read");
    assert!(
        matches!(err, ReaderError::UnexpectedEndOfInput | ReaderError::Syntax { .. }),
        "unexpected error: {err:?}"
    );
}
