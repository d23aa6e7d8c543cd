//! Byte-level JSON token reader
//!
//! The decoder pulls tokens from here one at a time; no document tree is
//! built. Offsets in errors are absolute: a reader over a sub-document keeps
//! the offset of that sub-document in `base`, and its nesting in `depth`.

use crate::error::{FormatError, Result};
use crate::MAX_DEPTH;
use fhirkit_models::value::number_literal_len;
use std::borrow::Cow;

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    x: usize,
    base: usize,
    /// Objects and arrays currently open, including enclosing documents
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self::nested(data, base, 0)
    }

    /// A reader over a sub-document opened `depth` levels deep
    pub fn nested(data: &'a [u8], base: usize, depth: usize) -> Self {
        Self {
            data,
            x: 0,
            base,
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.base + self.x
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.data.get(self.x) {
            self.x += 1;
        }
    }

    /// Next significant byte, without consuming it
    pub fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.data.get(self.x).copied()
    }

    pub fn error(&mut self, expected: &str) -> FormatError {
        let found = self.describe_next();
        FormatError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            offset: self.offset(),
        }
    }

    fn describe_next(&mut self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some(b'{') => "'{'".to_string(),
            Some(b'}') => "'}'".to_string(),
            Some(b'[') => "'['".to_string(),
            Some(b']') => "']'".to_string(),
            Some(b'"') => "string".to_string(),
            Some(b't' | b'f') => "boolean".to_string(),
            Some(b'n') => "null".to_string(),
            Some(b'-' | b'0'..=b'9') => "number".to_string(),
            Some(c) => format!("'{}'", c.escape_ascii()),
        }
    }

    /// Consume `byte` or fail with a token error
    pub fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.x += 1;
            Ok(())
        } else {
            Err(self.error(&format!("'{}'", byte as char)))
        }
    }

    /// Consume an opening `{` or `[` and count it against [`MAX_DEPTH`]
    pub fn open(&mut self, byte: u8) -> Result<()> {
        self.expect(byte)?;
        if self.depth >= MAX_DEPTH {
            return Err(FormatError::DepthLimit {
                limit: MAX_DEPTH,
                offset: self.offset() - 1,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Pair of [`Reader::open`], once `next_member` consumed the delimiter
    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Consume `byte` if it is next
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.x += 1;
            true
        } else {
            false
        }
    }

    /// Advance to the next member of an object or array.
    ///
    /// Returns `false` once the closing delimiter has been consumed.
    pub fn next_member(&mut self, first: &mut bool, close: u8) -> Result<bool> {
        if self.eat(close) {
            return Ok(false);
        }
        if !*first {
            self.expect(b',')?;
        }
        *first = false;
        Ok(true)
    }

    /// Read an object key and its `:` separator
    pub fn read_key(&mut self) -> Result<Cow<'a, str>> {
        if self.peek() != Some(b'"') {
            return Err(self.error("field name"));
        }
        let key = self.read_str()?;
        self.expect(b':')?;
        Ok(key)
    }

    pub fn read_str(&mut self) -> Result<Cow<'a, str>> {
        if self.peek() != Some(b'"') {
            return Err(self.error("string"));
        }
        let data = self.data;
        let start = self.x + 1;
        let mut end = start;
        let mut escaped = false;
        loop {
            match data.get(end) {
                None => {
                    self.x = end;
                    return Err(self.error("closing '\"'"));
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    escaped = true;
                    end += 2;
                }
                Some(_) => end += 1,
            }
        }

        let text = if escaped {
            Cow::Owned(serde_json::from_slice::<String>(&data[start - 1..=end])?)
        } else {
            Cow::Borrowed(std::str::from_utf8(&data[start..end])?)
        };
        self.x = end + 1;
        Ok(text)
    }

    /// Read a number literal and return its exact text
    pub fn read_number(&mut self) -> Result<&'a str> {
        self.skip_whitespace();
        let data = self.data;
        let rest = &data[self.x..];
        let len = number_literal_len(rest).ok_or_else(|| self.error("number"))?;
        let text = std::str::from_utf8(&rest[..len])?;
        self.x += len;
        Ok(text)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        if self.eat_literal(b"true") {
            Ok(true)
        } else if self.eat_literal(b"false") {
            Ok(false)
        } else {
            Err(self.error("boolean"))
        }
    }

    /// Consume `null` if it is next
    pub fn eat_null(&mut self) -> bool {
        self.eat_literal(b"null")
    }

    fn eat_literal(&mut self, literal: &[u8]) -> bool {
        self.skip_whitespace();
        if self.data[self.x..].starts_with(literal) {
            self.x += literal.len();
            true
        } else {
            false
        }
    }

    /// Skip one complete value and return its raw bytes and absolute start offset
    pub fn skip_value(&mut self) -> Result<(&'a [u8], usize)> {
        self.skip_whitespace();
        let data = self.data;
        let start = self.x;
        match self.peek() {
            Some(b'{') => {
                self.open(b'{')?;
                let mut first = true;
                while self.next_member(&mut first, b'}')? {
                    self.read_key()?;
                    self.skip_value()?;
                }
                self.close();
            }
            Some(b'[') => {
                self.open(b'[')?;
                let mut first = true;
                while self.next_member(&mut first, b']')? {
                    self.skip_value()?;
                }
                self.close();
            }
            Some(b'"') => {
                self.read_str()?;
            }
            Some(b't' | b'f') => {
                self.read_bool()?;
            }
            Some(b'n') if self.eat_null() => {}
            Some(b'-' | b'0'..=b'9') => {
                self.read_number()?;
            }
            _ => return Err(self.error("value")),
        }
        Ok((&data[start..self.x], self.base + start))
    }

    /// Fail unless only whitespace remains
    pub fn finish(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_borrow_unless_escaped() {
        let mut reader = Reader::new(br#" "plain" "a\"b\u00e9" "#);
        assert!(matches!(reader.read_str().unwrap(), Cow::Borrowed("plain")));
        assert_eq!(reader.read_str().unwrap(), "a\"b\u{e9}");
        reader.finish().unwrap();
    }

    #[test]
    fn numbers_keep_their_text() {
        let mut reader = Reader::new(b"[1.10, -0, 6.02e23]");
        reader.expect(b'[').unwrap();
        let mut first = true;
        let mut seen = Vec::new();
        while reader.next_member(&mut first, b']').unwrap() {
            seen.push(reader.read_number().unwrap());
        }
        assert_eq!(seen, vec!["1.10", "-0", "6.02e23"]);
    }

    #[test]
    fn skip_value_returns_span_with_absolute_offset() {
        let input = br#"{"a": {"b": [1, "x", null]}, "c": true}"#;
        let mut reader = Reader::with_base(input, 100);
        reader.expect(b'{').unwrap();
        assert_eq!(reader.read_key().unwrap(), "a");
        let (span, offset) = reader.skip_value().unwrap();
        assert_eq!(span, br#"{"b": [1, "x", null]}"#);
        assert_eq!(offset, 106);
    }

    #[test]
    fn skip_value_stops_at_depth_limit() {
        let mut deep = "[".repeat(MAX_DEPTH + 1);
        deep.push_str(&"]".repeat(MAX_DEPTH + 1));
        let mut reader = Reader::new(deep.as_bytes());
        match reader.skip_value() {
            Err(FormatError::DepthLimit { limit, offset }) => {
                assert_eq!(limit, MAX_DEPTH);
                assert_eq!(offset, MAX_DEPTH);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let shallow = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        let mut reader = Reader::new(shallow.as_bytes());
        reader.skip_value().unwrap();
        assert_eq!(reader.depth(), 0);
        reader.finish().unwrap();
    }

    #[test]
    fn nested_reader_inherits_depth() {
        let mut reader = Reader::nested(b"[]", 10, MAX_DEPTH);
        assert!(matches!(
            reader.skip_value(),
            Err(FormatError::DepthLimit { offset: 10, .. })
        ));
    }

    #[test]
    fn errors_describe_found_token() {
        let mut reader = Reader::new(b"  [1]");
        match reader.expect(b'{') {
            Err(FormatError::UnexpectedToken { expected, found, offset }) => {
                assert_eq!(expected, "'{'");
                assert_eq!(found, "'['");
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
