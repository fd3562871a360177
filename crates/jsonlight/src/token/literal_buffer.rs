//! Matching of the `null`, `true` and `false` keywords.

use super::Scalar;

/// Outcome of matching one more character of a keyword.
pub enum Step {
    NeedMore,
    Done(Scalar),
    Reject,
}

/// A keyword matched up to `matched` characters.
#[derive(Debug, Clone, Copy)]
pub struct LiteralMatcher {
    keyword: &'static str,
    matched: usize,
}

impl LiteralMatcher {
    /// Starts past the first character; `None` if no keyword begins with it.
    pub fn start(first: char) -> Option<Self> {
        let keyword = match first {
            'n' => "null",
            't' => "true",
            'f' => "false",
            _ => return None,
        };
        Some(Self { keyword, matched: 1 })
    }

    pub fn step(&mut self, c: char) -> Step {
        let expected = self.keyword.as_bytes().get(self.matched).copied().map(char::from);
        if expected != Some(c) {
            return Step::Reject;
        }
        self.matched += 1;
        if self.matched < self.keyword.len() {
            return Step::NeedMore;
        }
        Step::Done(match self.keyword {
            "null" => Scalar::Null,
            keyword => Scalar::Boolean(keyword == "true"),
        })
    }
}
