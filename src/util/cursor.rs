//! Byte cursor for hand-written recursive-descent scanners.
//!
//! The cursor never mutates its input; every scan returns a borrowed slice
//! and advances an explicit position.

/// Read-only cursor over an ASCII buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor at the start of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    /// Current byte offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current byte, if any.
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    /// Consume and return the current byte.
    #[inline]
    pub fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    /// Returns `true` once all input is consumed.
    pub fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Consume `expected` if it is the current byte.
    pub fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Skip ASCII whitespace.
    pub fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    /// Consume bytes while `predicate` holds and return them.
    pub fn take_while(&mut self, predicate: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.position;
        while matches!(self.peek(), Some(byte) if predicate(byte)) {
            self.position += 1;
        }
        &self.input[start..self.position]
    }

    /// Consume up to (not including) `delimiter` and return the bytes.
    ///
    /// Returns `None` without moving if `delimiter` never occurs.
    pub fn take_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        let rest = &self.input[self.position..];
        let length = rest.iter().position(|&byte| byte == delimiter)?;
        self.position += length;
        Some(&rest[..length])
    }
}
