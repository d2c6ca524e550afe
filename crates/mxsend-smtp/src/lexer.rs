//! Lexical classes of the RFC 5321 command grammar.
//!
//! [`TokenMatcher`] tests the next position of a [`ByteCursor`] against one
//! [`LexicalClass`]. A mismatch leaves the cursor where it was and reports
//! [`Error::ClassNotFound`], which the grammar uses to backtrack.

use std::fmt;

use tokio::io::AsyncRead;

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// Character classes of the command grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexicalClass {
    /// `SP`
    Space,
    /// `<`
    LeftAngle,
    /// `>`
    RightAngle,
    /// ASCII letter
    Alpha,
    /// ASCII digit
    Digit,
    /// `@`
    At,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `atext` of RFC 5322
    Atext,
    /// `"`
    Dquote,
    /// `qtextSMTP`: printable ASCII except `"` and `\`
    Qtext,
    /// `quoted-pairSMTP`: `\` followed by printable ASCII
    Qpair,
    /// Fixed command word; matched through [`TokenMatcher::expect_keyword`]
    Keyword,
    /// `-`
    Hyphen,
    /// `,`
    Comma,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `dcontent`: printable ASCII except `[`, `\` and `]`
    Dcontent,
    /// `esmtp-value` character: printable ASCII except `=`
    EsmtpValue,
}

impl LexicalClass {
    /// Tests a single byte against the class.
    ///
    /// `Qpair` and `Keyword` span several bytes and never match a lone byte.
    #[must_use]
    pub const fn matches(self, byte: u8) -> bool {
        match self {
            Self::Space => byte == b' ',
            Self::LeftAngle => byte == b'<',
            Self::RightAngle => byte == b'>',
            Self::Alpha => byte.is_ascii_alphabetic(),
            Self::Digit => byte.is_ascii_digit(),
            Self::At => byte == b'@',
            Self::Dot => byte == b'.',
            Self::Colon => byte == b':',
            Self::Atext => is_atext(byte),
            Self::Dquote => byte == b'"',
            Self::Qtext => is_printable(byte) && byte != b'"' && byte != b'\\',
            Self::Hyphen => byte == b'-',
            Self::Comma => byte == b',',
            Self::LeftBracket => byte == b'[',
            Self::RightBracket => byte == b']',
            Self::Dcontent => matches!(byte, 33..=90 | 94..=126),
            Self::EsmtpValue => matches!(byte, 33..=60 | 62..=126),
            Self::Qpair | Self::Keyword => false,
        }
    }
}

impl fmt::Display for LexicalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Space => "SP",
            Self::LeftAngle => "\"<\"",
            Self::RightAngle => "\">\"",
            Self::Alpha => "ALPHA",
            Self::Digit => "DIGIT",
            Self::At => "\"@\"",
            Self::Dot => "\".\"",
            Self::Colon => "\":\"",
            Self::Atext => "atext",
            Self::Dquote => "DQUOTE",
            Self::Qtext => "qtextSMTP",
            Self::Qpair => "quoted-pairSMTP",
            Self::Keyword => "keyword",
            Self::Hyphen => "\"-\"",
            Self::Comma => "\",\"",
            Self::LeftBracket => "\"[\"",
            Self::RightBracket => "\"]\"",
            Self::Dcontent => "dcontent",
            Self::EsmtpValue => "esmtp-value",
        };
        f.write_str(name)
    }
}

/// `atext` per RFC 5322 section 3.2.3.
const fn is_atext(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

/// Printable ASCII including space (`%d32-126`).
const fn is_printable(byte: u8) -> bool {
    matches!(byte, 32..=126)
}

/// Matches lexical classes at the head of a [`ByteCursor`].
#[derive(Debug)]
pub struct TokenMatcher<S> {
    cursor: ByteCursor<S>,
}

impl<S> TokenMatcher<S> {
    /// Wraps a cursor.
    pub const fn new(cursor: ByteCursor<S>) -> Self {
        Self { cursor }
    }

    /// Creates a matcher directly over a stream.
    pub fn from_stream(stream: S) -> Self {
        Self::new(ByteCursor::new(stream))
    }

    /// Absolute offset of the next unread byte.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// The underlying cursor.
    pub fn cursor_mut(&mut self) -> &mut ByteCursor<S> {
        &mut self.cursor
    }

    /// Consumes the matcher, returning the cursor.
    pub fn into_cursor(self) -> ByteCursor<S> {
        self.cursor
    }
}

impl<S> TokenMatcher<S>
where
    S: AsyncRead + Unpin,
{
    /// Matches one token of `class` and returns its text.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound` (cursor unchanged) on mismatch, or the
    /// cursor's I/O errors.
    pub async fn expect(&mut self, class: LexicalClass) -> Result<String> {
        let first = self.cursor.peek_byte().await?;
        match class {
            LexicalClass::Qpair => {
                if first != b'\\' {
                    return Err(Error::class_not_found(class));
                }
                let pair = self.cursor.peek(2).await?;
                if !is_printable(pair[1]) {
                    return Err(Error::class_not_found(class));
                }
                let bytes = self.cursor.read_exact(2).await?;
                Ok(ascii_string(&bytes))
            }
            _ if class.matches(first) => {
                self.cursor.consume_one().await?;
                Ok(char::from(first).to_string())
            }
            _ => Err(Error::class_not_found(class)),
        }
    }

    /// Tries each class in order and returns the first match.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound` without a class if none matches; the cursor is
    /// unchanged in that case.
    pub async fn expect_any(&mut self, classes: &[LexicalClass]) -> Result<String> {
        for &class in classes {
            match self.expect(class).await {
                Err(Error::ClassNotFound { .. }) => {}
                other => return other,
            }
        }
        Err(Error::ClassNotFound { class: None })
    }

    /// Matches a fixed word, ASCII case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound { Keyword }` (cursor unchanged) on mismatch.
    pub async fn expect_keyword(&mut self, word: &str) -> Result<String> {
        // Widen the look-ahead one byte at a time so a mismatch is reported
        // before running into the end of the stream.
        for (i, expected) in word.bytes().enumerate() {
            let candidate = self.cursor.peek(i + 1).await?;
            if !candidate[i].eq_ignore_ascii_case(&expected) {
                return Err(Error::class_not_found(LexicalClass::Keyword));
            }
        }
        let bytes = self.cursor.read_exact(word.len()).await?;
        Ok(ascii_string(&bytes))
    }

    /// Matches one or more tokens of any of `classes` and returns their text.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound` if not even one token matches.
    pub async fn expect_run(&mut self, classes: &[LexicalClass]) -> Result<String> {
        let mut run = self.expect_any(classes).await?;
        while let Some(next) = self.optional_any(classes).await? {
            run.push_str(&next);
        }
        Ok(run)
    }

    /// Matches CRLF.
    ///
    /// # Errors
    ///
    /// Returns `ClassNotFound { Keyword }` if the next bytes are not CRLF.
    pub async fn expect_crlf(&mut self) -> Result<()> {
        self.expect_keyword("\r\n").await.map(|_| ())
    }

    async fn optional_any(&mut self, classes: &[LexicalClass]) -> Result<Option<String>> {
        match self.expect_any(classes).await {
            Ok(text) => Ok(Some(text)),
            Err(Error::ClassNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Matched bytes are ASCII by construction of every class.
fn ascii_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}
