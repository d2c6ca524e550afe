//! Reply reader and typed dispatch.
//!
//! Replies are one or more lines of the form `DDD[ -]text CRLF`. Lines
//! continue while the fourth byte is `-`; a space or a bare code ends the
//! reply.

use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::lexer::TokenMatcher;
use crate::types::{
    EhloReply, Extension, GreetingReply, Reply, ReplyCode, ReplyShape, TypedReply,
};

/// Reads replies from a borrowed [`TokenMatcher`].
#[derive(Debug)]
pub struct ReplyParser<'a, S> {
    m: &'a mut TokenMatcher<S>,
    max_line_length: usize,
}

impl<'a, S> ReplyParser<'a, S>
where
    S: AsyncRead + Unpin,
{
    /// Creates a parser that rejects lines longer than `max_line_length`.
    pub const fn new(matcher: &'a mut TokenMatcher<S>, max_line_length: usize) -> Self {
        Self {
            m: matcher,
            max_line_length,
        }
    }

    /// Reads one complete reply, across all of its lines.
    ///
    /// # Errors
    ///
    /// `MalformedReply` if a line does not start with three digits, has an
    /// unknown separator, or carries a different code than the first line.
    /// I/O errors and `StreamExhausted` pass through.
    pub async fn parse_reply_line(&mut self) -> Result<Reply> {
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();
        loop {
            let raw = self.m.cursor_mut().read_line(self.max_line_length).await?;
            let (line_code, more, text) = split_line(&raw)?;
            match code {
                None => code = Some(line_code),
                Some(first) if first != line_code => {
                    return Err(Error::MalformedReply(format!(
                        "continuation code {line_code} does not match {first}"
                    )));
                }
                Some(_) => {}
            }
            lines.push(text);
            if !more {
                break;
            }
        }
        self.m.cursor_mut().compact();
        // The loop runs at least once, so `code` is set here.
        let code = code.ok_or_else(|| Error::MalformedReply("empty reply".into()))?;
        Ok(Reply::new(ReplyCode::new(code), lines))
    }

    /// Reads one reply and extracts the fields of `shape`.
    ///
    /// # Errors
    ///
    /// `Rejected` when a greeting or EHLO answer has a 4xx/5xx code;
    /// `UnexpectedReplyShape` for any other code or layout that does not fit
    /// `shape`; plus the errors of [`ReplyParser::parse_reply_line`].
    pub async fn read(&mut self, shape: ReplyShape) -> Result<TypedReply> {
        let reply = self.parse_reply_line().await?;
        match shape {
            ReplyShape::Generic => Ok(TypedReply::Generic(reply)),
            ReplyShape::Greeting => greeting(reply).map(TypedReply::Greeting),
            ReplyShape::EhloAck => ehlo_ack(reply).map(TypedReply::EhloAck),
        }
    }
}

/// Splits a raw line into code, continuation flag and text.
fn split_line(raw: &[u8]) -> Result<(u16, bool, String)> {
    let malformed = || Error::MalformedReply(String::from_utf8_lossy(raw).into_owned());
    if raw.len() < 3 || !raw[..3].iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let code = raw[..3]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    let more = match raw.get(3) {
        None | Some(b' ') => false,
        Some(b'-') => true,
        Some(_) => return Err(malformed()),
    };
    let text = raw.get(4..).unwrap_or_default();
    Ok((code, more, String::from_utf8_lossy(text).into_owned()))
}

fn reject_failure(reply: &Reply) -> Result<()> {
    if reply.is_failure() {
        return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
    }
    Ok(())
}

/// Splits `word rest` at the first space; the word must be non-empty.
fn leading_word(reply: &Reply, what: &str) -> Result<(String, String)> {
    let first = reply.first_line();
    let (word, rest) = first.split_once(' ').unwrap_or((first, ""));
    if word.is_empty() {
        return Err(Error::UnexpectedReplyShape(format!(
            "{what} reply {} has no {what} identifier",
            reply.code
        )));
    }
    Ok((word.to_string(), rest.to_string()))
}

fn greeting(reply: Reply) -> Result<GreetingReply> {
    reject_failure(&reply)?;
    if reply.code != ReplyCode::SERVICE_READY {
        return Err(Error::UnexpectedReplyShape(format!(
            "expected greeting 220, got {}",
            reply.code
        )));
    }
    let (server_identifier, text) = leading_word(&reply, "greeting")?;
    Ok(GreetingReply {
        server_identifier,
        text,
        reply,
    })
}

fn ehlo_ack(reply: Reply) -> Result<EhloReply> {
    reject_failure(&reply)?;
    if !reply.is_success() {
        return Err(Error::UnexpectedReplyShape(format!(
            "expected 2xx to EHLO, got {}",
            reply.code
        )));
    }
    let (domain, _) = leading_word(&reply, "ehlo")?;
    let extensions = reply
        .lines
        .iter()
        .skip(1)
        .map(|line| Extension::parse(line))
        .collect();
    Ok(EhloReply {
        code: reply.code,
        domain,
        extensions,
        reply,
    })
}
