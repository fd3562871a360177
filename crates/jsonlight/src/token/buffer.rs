use std::collections::VecDeque;

/// Ring of unread characters backing the tokenizer.
///
/// The tokenizer only ever looks ahead by index and drains once a whole
/// token has been recognised, so an incomplete token leaves the ring intact.
#[derive(Debug, Clone, Default)]
pub(crate) struct Buffer {
    data: VecDeque<char>,
}

impl Buffer {
    pub(crate) fn new() -> Self {
        Self {
            data: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        // Reserve the byte length as an upper bound on additional chars
        self.data.reserve(text.len());
        self.data.extend(text.chars());
    }

    pub(crate) fn push_char(&mut self, c: char) {
        self.data.push_back(c);
    }

    #[inline]
    pub(crate) fn peek(&self) -> Option<char> {
        self.data.front().copied()
    }

    #[inline]
    pub(crate) fn get(&self, offset: usize) -> Option<char> {
        self.data.get(offset).copied()
    }

    /// Removes the first `n` characters, handing each to `visit` so the caller
    /// can keep its line and column counters current.
    pub(crate) fn consume<F>(&mut self, n: usize, mut visit: F)
    where
        F: FnMut(char),
    {
        for ch in self.data.drain(..n) {
            visit(ch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;

    #[test]
    fn lookahead_does_not_consume() {
        let mut buf = Buffer::new();
        buf.push("ab");
        buf.push_char('c');
        assert_eq!(buf.get(2), Some('c'));
        assert_eq!(buf.peek(), Some('a'));
        let mut seen = String::new();
        buf.consume(2, |c| seen.push(c));
        assert_eq!(seen, "ab");
        assert_eq!(buf.peek(), Some('c'));
        assert_eq!(buf.get(1), None);
    }
}
