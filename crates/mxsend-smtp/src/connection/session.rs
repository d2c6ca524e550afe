//! One SMTP dialogue with one exchanger.
//!
//! A [`Session`] walks a fixed sequence of states, writing one command and
//! reading exactly one reply per step:
//!
//! ```text
//! Connected -> GreetingPending -> GreetingOk -> EhloPending -> EhloOk
//!   -> MailPending -> MailOk -> RcptPending -> RcptOk -> DataPending
//!   -> DataOk -> MessagePending -> MessageOk -> QuitPending -> Closed
//! ```
//!
//! Any failure ends the dialogue in `Closed`. The transport is shut down on
//! every exit path. When the server refused something but the dialogue itself
//! is still in sync, a best-effort `QUIT` is sent first.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{Instrument, Span};

use super::{Config, ServerInfo};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::lexer::TokenMatcher;
use crate::parser::ReplyParser;
use crate::types::{Host, Path, Reply, ReplyCode, ReplyShape, ReversePath, TypedReply};

/// Sender, recipient and body of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` path.
    pub from: ReversePath,
    /// `RCPT TO` path.
    pub to: Path,
    /// Message text. Line endings are normalised on the wire.
    pub body: Option<String>,
}

/// Position of a [`Session`] in the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, nothing read yet.
    Connected,
    /// Waiting for the 220 banner.
    GreetingPending,
    /// Banner accepted.
    GreetingOk,
    /// EHLO (or HELO) sent.
    EhloPending,
    /// Server acknowledged the client.
    EhloOk,
    /// MAIL sent.
    MailPending,
    /// Sender accepted.
    MailOk,
    /// RCPT sent.
    RcptPending,
    /// Recipient accepted.
    RcptOk,
    /// DATA sent.
    DataPending,
    /// Server is ready for the message.
    DataOk,
    /// Message and terminating dot sent.
    MessagePending,
    /// Message accepted for delivery.
    MessageOk,
    /// QUIT sent.
    QuitPending,
    /// Transport closed.
    Closed,
}

impl SessionState {
    /// Short name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::GreetingPending => "greeting-pending",
            Self::GreetingOk => "greeting-ok",
            Self::EhloPending => "ehlo-pending",
            Self::EhloOk => "ehlo-ok",
            Self::MailPending => "mail-pending",
            Self::MailOk => "mail-ok",
            Self::RcptPending => "rcpt-pending",
            Self::RcptOk => "rcpt-ok",
            Self::DataPending => "data-pending",
            Self::DataOk => "data-ok",
            Self::MessagePending => "message-pending",
            Self::MessageOk => "message-ok",
            Self::QuitPending => "quit-pending",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client side of a single SMTP dialogue.
///
/// The session owns its transport exclusively; nothing is shared with other
/// sessions, so any number of them may run concurrently.
#[derive(Debug)]
pub struct Session<S> {
    matcher: TokenMatcher<S>,
    state: SessionState,
    helo: Host,
    io_timeout: Duration,
    max_line_length: usize,
    server: ServerInfo,
    span: Span,
}

impl<S> Session<S> {
    /// Creates a session over an open transport.
    ///
    /// Every step is logged inside `span`.
    pub fn new(stream: S, helo: Host, config: &Config, span: Span) -> Self {
        Self {
            matcher: TokenMatcher::from_stream(stream),
            state: SessionState::Connected,
            helo,
            io_timeout: config.io_timeout,
            max_line_length: config.max_line_length,
            server: ServerInfo::default(),
            span,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// What the server has told us so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    fn enter(&mut self, next: SessionState) {
        tracing::trace!(from = %self.state, to = %next, "state");
        self.state = next;
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the whole dialogue for `envelope`.
    ///
    /// The session ends in [`SessionState::Closed`] whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the server answered a step with 4xx/5xx
    /// - `MessageTooLarge` if the body exceeds the advertised SIZE
    /// - `MalformedReply`, `UnexpectedReplyShape` on protocol violations
    /// - `Io`, `StreamExhausted`, `Timeout` on transport failure
    /// - `InvalidState` if the session was already used
    pub async fn deliver(&mut self, envelope: &Envelope) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState(format!(
                "session is {}, expected connected",
                self.state
            )));
        }
        let span = self.span.clone();
        async {
            let result = self.dialogue(envelope).await;
            if let Err(e) = &result {
                tracing::debug!(state = %self.state, error = %e, "dialogue aborted");
                if matches!(e, Error::Rejected { .. } | Error::MessageTooLarge { .. }) {
                    if let Err(quit) = self.quit().await {
                        tracing::debug!(error = %quit, "QUIT after failure went unanswered");
                    }
                }
            }
            self.close().await;
            result
        }
        .instrument(span)
        .await
    }

    async fn dialogue(&mut self, envelope: &Envelope) -> Result<()> {
        self.greeting().await?;
        self.hello().await?;

        let body = envelope.body.as_deref().unwrap_or_default();
        let payload = encode_body(body);
        if let Some(limit) = self.server.max_message_size()
            && payload.len() > limit
        {
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                limit,
            });
        }
        let eight_bit = !body.is_ascii();
        if eight_bit && !self.server.supports_8bitmime() {
            tracing::warn!("sending 8-bit body to a server without 8BITMIME");
        }

        let mail = Command::MailFrom {
            from: envelope.from.clone(),
            body: (eight_bit && self.server.supports_8bitmime()).then(|| "8BITMIME".to_string()),
            size: self.server.supports_size().then_some(payload.len()),
        };
        self.step(&mail, SessionState::MailPending, Reply::is_success)
            .await?;
        self.enter(SessionState::MailOk);

        let rcpt = Command::RcptTo {
            to: envelope.to.clone(),
        };
        self.step(&rcpt, SessionState::RcptPending, Reply::is_success)
            .await?;
        self.enter(SessionState::RcptOk);

        self.step(&Command::Data, SessionState::DataPending, |r| {
            r.code == ReplyCode::START_DATA
        })
        .await?;
        self.enter(SessionState::DataOk);

        self.enter(SessionState::MessagePending);
        self.send(&payload).await?;
        let reply = accept(self.read_generic().await?, Reply::is_success)?;
        self.enter(SessionState::MessageOk);
        tracing::info!(code = %reply.code, text = reply.first_line(), "message accepted");

        // The message is already accepted; a broken QUIT does not undo that.
        if let Err(e) = self.quit().await {
            tracing::debug!(error = %e, "QUIT failed after delivery");
        }
        Ok(())
    }

    async fn greeting(&mut self) -> Result<()> {
        self.enter(SessionState::GreetingPending);
        match self.read(ReplyShape::Greeting).await? {
            TypedReply::Greeting(greeting) => {
                tracing::debug!(server = %greeting.server_identifier, "greeting");
                self.server.identifier = greeting.server_identifier;
            }
            other => return Err(unexpected(other.reply())),
        }
        self.enter(SessionState::GreetingOk);
        Ok(())
    }

    /// EHLO, falling back to HELO when the server does not know EHLO.
    async fn hello(&mut self) -> Result<()> {
        self.enter(SessionState::EhloPending);
        let ehlo = Command::Ehlo {
            host: self.helo.clone(),
        };
        self.send(&ehlo.serialize()).await?;
        match self.read(ReplyShape::EhloAck).await {
            Ok(TypedReply::EhloAck(ack)) => {
                tracing::debug!(domain = %ack.domain, extensions = ack.extensions.len(), "EHLO accepted");
                self.server.apply_ehlo(&ack);
            }
            Ok(other) => return Err(unexpected(other.reply())),
            Err(Error::Rejected { code: 500 | 502, .. }) => {
                tracing::debug!("EHLO not recognised, falling back to HELO");
                let helo = Command::Helo {
                    host: self.helo.clone(),
                };
                self.send(&helo.serialize()).await?;
                let reply = accept(self.read_generic().await?, Reply::is_success)?;
                self.server.domain = reply
                    .first_line()
                    .split(' ')
                    .next()
                    .unwrap_or_default()
                    .to_string();
            }
            Err(e) => return Err(e),
        }
        self.enter(SessionState::EhloOk);
        Ok(())
    }

    async fn step(
        &mut self,
        command: &Command,
        pending: SessionState,
        wanted: fn(&Reply) -> bool,
    ) -> Result<Reply> {
        self.enter(pending);
        self.send(&command.serialize()).await?;
        let reply = self.read_generic().await?;
        accept(reply, wanted)
    }

    async fn quit(&mut self) -> Result<()> {
        self.enter(SessionState::QuitPending);
        self.send(&Command::Quit.serialize()).await?;
        let reply = self.read_generic().await?;
        if reply.code != ReplyCode::CLOSING {
            tracing::debug!(code = %reply.code, "unusual QUIT reply");
        }
        Ok(())
    }

    async fn close(&mut self) {
        let limit = self.io_timeout;
        let stream = self.matcher.cursor_mut().get_mut();
        let shutdown = async { stream.shutdown().await.map_err(Error::from) };
        if let Err(e) = with_timeout(limit, shutdown).await {
            tracing::debug!(error = %e, "transport shutdown failed");
        }
        self.enter(SessionState::Closed);
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        tracing::debug!(bytes = bytes.len(), state = %self.state, "send");
        let limit = self.io_timeout;
        let stream = self.matcher.cursor_mut().get_mut();
        with_timeout(limit, async {
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok::<_, Error>(())
        })
        .await
    }

    async fn read(&mut self, shape: ReplyShape) -> Result<TypedReply> {
        let limit = self.io_timeout;
        let mut parser = ReplyParser::new(&mut self.matcher, self.max_line_length);
        let typed = with_timeout(limit, parser.read(shape)).await?;
        tracing::debug!(code = %typed.reply().code, state = %self.state, "reply");
        Ok(typed)
    }

    async fn read_generic(&mut self) -> Result<Reply> {
        match self.read(ReplyShape::Generic).await? {
            TypedReply::Generic(reply) => Ok(reply),
            other => Err(unexpected(other.reply())),
        }
    }
}

/// Maps a reply to the outcome of a step.
fn accept(reply: Reply, wanted: fn(&Reply) -> bool) -> Result<Reply> {
    if reply.is_failure() {
        return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
    }
    if !wanted(&reply) {
        return Err(unexpected(&reply));
    }
    Ok(reply)
}

fn unexpected(reply: &Reply) -> Error {
    Error::UnexpectedReplyShape(format!("unexpected {} reply: {}", reply.code, reply.first_line()))
}

async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

/// Converts a message body into DATA payload: every line ends in CRLF, lines
/// starting with `.` get a second dot, and the terminating `.` line follows.
///
/// CRLF, bare LF and bare CR all end a line.
pub(crate) fn encode_body(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 32 + 5);
    let mut rest = body;
    while !rest.is_empty() {
        let (line, next) = match rest.find(['\r', '\n']) {
            Some(i) if rest[i..].starts_with("\r\n") => (&rest[..i], &rest[i + 2..]),
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        if line.starts_with('.') {
            out.push(b'.');
        }
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
        rest = next;
    }
    out.extend_from_slice(b".\r\n");
    out
}
