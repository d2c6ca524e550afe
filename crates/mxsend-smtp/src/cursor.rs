//! Buffered read cursor over a transport.
//!
//! All parsing in this crate reads through a [`ByteCursor`]. Bytes are pulled
//! from the transport only when a caller needs more than is buffered, so the
//! transport reads inside [`ByteCursor::peek`], [`ByteCursor::consume_one`]
//! and [`ByteCursor::read_exact`] are the only suspension points of a parse.

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Initial buffer capacity.
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Saved cursor position for [`ByteCursor::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(u64);

impl Mark {
    /// Absolute stream offset of the mark.
    #[must_use]
    pub const fn position(self) -> u64 {
        self.0
    }
}

/// Read cursor with look-ahead, single-byte push-back and mark/reset.
///
/// Consumed bytes stay buffered until [`ByteCursor::compact`] is called, which
/// is what allows [`ByteCursor::reset`] to rewind across several tokens.
#[derive(Debug)]
pub struct ByteCursor<S> {
    stream: S,
    buf: BytesMut,
    /// Read index into `buf`.
    pos: usize,
    /// Absolute stream offset of `buf[0]`.
    base: u64,
    can_unread: bool,
}

impl<S> ByteCursor<S> {
    /// Creates a cursor over `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            pos: 0,
            base: 0,
            can_unread: false,
        }
    }

    /// Absolute offset of the next unread byte.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Number of bytes buffered ahead of the cursor.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Records the current position.
    #[must_use]
    pub fn mark(&self) -> Mark {
        Mark(self.position())
    }

    /// Rewinds (or fast-forwards) to a previously recorded position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the mark lies outside the buffered window,
    /// i.e. it was compacted away or never read.
    pub fn reset(&mut self, mark: Mark) -> Result<()> {
        let end = self.base + self.buf.len() as u64;
        if mark.0 < self.base || mark.0 > end {
            return Err(Error::InvalidState(format!(
                "mark {} outside buffered window {}..{end}",
                mark.0, self.base
            )));
        }
        self.pos = usize::try_from(mark.0 - self.base)
            .map_err(|_| Error::InvalidState("mark offset overflow".into()))?;
        self.can_unread = false;
        Ok(())
    }

    /// Drops consumed bytes. Marks taken before this call become invalid.
    pub fn compact(&mut self) {
        self.buf.advance(self.pos);
        self.base += self.pos as u64;
        self.pos = 0;
        self.can_unread = false;
    }

    /// Returns the most recently consumed byte to the stream.
    ///
    /// # Errors
    ///
    /// Returns `NoByteToUnread` when nothing was consumed since the last
    /// push-back, reset or compaction.
    pub fn push_back(&mut self) -> Result<()> {
        if !self.can_unread || self.pos == 0 {
            return Err(Error::NoByteToUnread);
        }
        self.pos -= 1;
        self.can_unread = false;
        Ok(())
    }

    /// Mutable access to the transport, for writing.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consumes the cursor, returning the transport.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> ByteCursor<S>
where
    S: AsyncRead + Unpin,
{
    /// Reads from the transport until at least `n` bytes are buffered.
    async fn fill(&mut self, n: usize) -> Result<()> {
        while self.buffered() < n {
            self.buf.reserve(DEFAULT_BUFFER_SIZE.max(n));
            let read = self.stream.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(Error::StreamExhausted);
            }
        }
        Ok(())
    }

    /// Returns the next `n` bytes without consuming them.
    ///
    /// # Errors
    ///
    /// Returns `StreamExhausted` if the stream closes first, or `Io` if the
    /// transport fails.
    pub async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n).await?;
        Ok(&self.buf[self.pos..self.pos + n])
    }

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    ///
    /// Same as [`ByteCursor::peek`].
    pub async fn peek_byte(&mut self) -> Result<u8> {
        self.fill(1).await?;
        Ok(self.buf[self.pos])
    }

    /// Consumes and returns exactly one byte.
    ///
    /// # Errors
    ///
    /// Same as [`ByteCursor::peek`].
    pub async fn consume_one(&mut self) -> Result<u8> {
        self.fill(1).await?;
        let byte = self.buf[self.pos];
        self.pos += 1;
        self.can_unread = true;
        Ok(byte)
    }

    /// Consumes exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`ByteCursor::peek`].
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n).await?;
        let bytes = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        self.can_unread = n > 0;
        Ok(bytes)
    }

    /// Consumes one line and returns it without its line terminator.
    ///
    /// CRLF and bare LF both end a line.
    ///
    /// # Errors
    ///
    /// Returns `Io` with `InvalidData` when no terminator shows up within
    /// `max` bytes, otherwise the errors of [`ByteCursor::peek`].
    pub async fn read_line(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            let window = &self.buf[self.pos..];
            if let Some(lf) = window[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + lf;
                if end > max {
                    return Err(line_too_long(max));
                }
                let mut line = window[..end].to_vec();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.pos += end + 1;
                self.can_unread = true;
                return Ok(line);
            }
            scanned = window.len();
            if scanned > max {
                return Err(line_too_long(max));
            }
            self.fill(scanned + 1).await?;
        }
    }
}

fn line_too_long(max: usize) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line exceeds {max} bytes"),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cursor(input: &'static [u8]) -> ByteCursor<&'static [u8]> {
        ByteCursor::new(input)
    }

    #[tokio::test]
    async fn test_peek_does_not_advance() {
        let mut c = cursor(b"EHLO x");
        assert_eq!(c.peek(4).await.unwrap(), b"EHLO");
        assert_eq!(c.peek(4).await.unwrap(), b"EHLO");
        assert_eq!(c.position(), 0);
    }

    #[tokio::test]
    async fn test_consume_and_push_back() {
        let mut c = cursor(b"ab");
        assert_eq!(c.consume_one().await.unwrap(), b'a');
        c.push_back().unwrap();
        assert!(matches!(c.push_back(), Err(Error::NoByteToUnread)));
        assert_eq!(c.consume_one().await.unwrap(), b'a');
        assert_eq!(c.consume_one().await.unwrap(), b'b');
        assert_eq!(c.position(), 2);
    }

    #[tokio::test]
    async fn test_push_back_before_any_read() {
        let mut c = cursor(b"a");
        assert!(matches!(c.push_back(), Err(Error::NoByteToUnread)));
    }

    #[tokio::test]
    async fn test_read_exact_and_exhaustion() {
        let mut c = cursor(b"MAIL");
        assert_eq!(c.read_exact(4).await.unwrap(), b"MAIL");
        assert!(matches!(c.read_exact(1).await, Err(Error::StreamExhausted)));
        assert!(matches!(c.peek(1).await, Err(Error::StreamExhausted)));
    }

    #[tokio::test]
    async fn test_peek_past_end_is_exhausted() {
        let mut c = cursor(b"abc");
        assert!(matches!(c.peek(4).await, Err(Error::StreamExhausted)));
        assert_eq!(c.peek(3).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_mark_reset() {
        let mut c = cursor(b"hello world");
        c.consume_one().await.unwrap();
        let mark = c.mark();
        c.read_exact(5).await.unwrap();
        c.reset(mark).unwrap();
        assert_eq!(c.position(), 1);
        assert_eq!(c.read_exact(4).await.unwrap(), b"ello");
    }

    #[tokio::test]
    async fn test_compact_invalidates_old_marks() {
        let mut c = cursor(b"abcdef");
        let mark = c.mark();
        c.read_exact(3).await.unwrap();
        c.compact();
        assert_eq!(c.position(), 3);
        assert!(c.reset(mark).is_err());
        assert_eq!(c.consume_one().await.unwrap(), b'd');
    }

    #[tokio::test]
    async fn test_read_line() {
        let mut c = cursor(b"250 OK\r\n221 bye\nrest");
        assert_eq!(c.read_line(1024).await.unwrap(), b"250 OK");
        assert_eq!(c.read_line(1024).await.unwrap(), b"221 bye");
        assert!(matches!(
            c.read_line(1024).await,
            Err(Error::StreamExhausted)
        ));
    }

    #[tokio::test]
    async fn test_read_line_limit() {
        let mut c = cursor(b"0123456789\r\n");
        assert!(matches!(c.read_line(4).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_from_chunked_stream() {
        let stream = tokio_test::io::Builder::new()
            .read(b"22")
            .read(b"0 hi\r\n")
            .build();
        let mut c = ByteCursor::new(stream);
        assert_eq!(c.peek(3).await.unwrap(), b"220");
        assert_eq!(c.read_line(64).await.unwrap(), b"220 hi");
    }

    proptest! {
        #[test]
        fn prop_double_peek_is_stable(input in proptest::collection::vec(any::<u8>(), 0..64), n in 0usize..80) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let mut c = ByteCursor::new(input.as_slice());
                let first = c.peek(n).await.map(<[u8]>::to_vec).ok();
                let second = c.peek(n).await.map(<[u8]>::to_vec).ok();
                prop_assert_eq!(first, second);
                prop_assert_eq!(c.position(), 0);
                Ok(())
            })?;
        }
    }
}
