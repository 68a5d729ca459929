use std::fmt::{Display, Formatter};

use crate::Pep508Error;

/// A read position in a requirement string.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// `len` bytes of the input from `start`.
    pub(crate) fn slice(&self, start: usize, len: usize) -> &'a str {
        &self.input[start..start + len]
    }

    /// The number of bytes left in the input.
    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub(crate) fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn peek(&self) -> Option<(usize, char)> {
        self.peek_char().map(|char| (self.pos, char))
    }

    pub(crate) fn next(&mut self) -> Option<(usize, char)> {
        let (pos, char) = self.peek()?;
        self.pos += char.len_utf8();
        Some((pos, char))
    }

    /// Consume `token` if it comes next, returning where it was.
    pub(crate) fn eat_char(&mut self, token: char) -> Option<usize> {
        match self.peek()? {
            (pos, char) if char == token => {
                self.pos += char.len_utf8();
                Some(pos)
            }
            _ => None,
        }
    }

    pub(crate) fn eat_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// The `(start, len)` span of the characters from here on that match `condition`.
    pub(crate) fn peek_while(&self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let len = self
            .rest()
            .find(|char: char| !condition(char))
            .unwrap_or_else(|| self.remaining());
        (self.pos, len)
    }

    /// Like [`Cursor::peek_while`], but consumes the span.
    pub(crate) fn take_while(&mut self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let span = self.peek_while(condition);
        self.pos += span.1;
        span
    }

    /// Consume `expected`, or fail pointing at whatever is there instead.
    pub(crate) fn next_expect_char(
        &mut self,
        expected: char,
        span_start: usize,
    ) -> Result<(), Pep508Error> {
        let (pos, len, found) = match self.next() {
            Some((_, char)) if char == expected => return Ok(()),
            Some((pos, char)) => (pos, char.len_utf8(), format!("'{char}'")),
            None => (span_start, 1, "end of dependency specification".to_string()),
        };
        Err(Pep508Error::new(
            format!("Expected '{expected}', found {found}"),
            pos,
            len,
            self.input,
        ))
    }
}

impl Display for Cursor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.input)
    }
}
