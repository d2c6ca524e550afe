//! SMTP reply types.
//!
//! A [`Reply`] is the raw aggregate of one reply: its code and text lines.
//! The typed forms ([`GreetingReply`], [`EhloReply`]) add the fields the
//! session needs at the step where that shape is expected.

use super::Extension;

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Text of each line, without code, separator or CRLF.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true for 4xx and 5xx replies.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.code.is_transient() || self.code.is_permanent()
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.is_transient()
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.is_permanent()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Text of the first line, or `""` for a bare code.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.lines.first().map_or("", String::as_str)
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the client dialogue looks at
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
}

/// Reply shape the session expects at its current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Opening banner: code 220, server identifier, free text.
    Greeting,
    /// EHLO acknowledgement: acknowledged domain, then extension lines.
    EhloAck,
    /// Any other step: code and lines only.
    Generic,
}

/// Opening banner of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingReply {
    /// First word of the first line.
    pub server_identifier: String,
    /// Remainder of the first line.
    pub text: String,
    /// The raw reply.
    pub reply: Reply,
}

/// Positive or negative answer to EHLO/HELO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EhloReply {
    /// Reply code as received.
    pub code: ReplyCode,
    /// Domain the server acknowledged with.
    pub domain: String,
    /// Extensions from the lines after the first.
    pub extensions: Vec<Extension>,
    /// The raw reply.
    pub reply: Reply,
}

/// A reply after shape-specific extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedReply {
    /// See [`ReplyShape::Greeting`].
    Greeting(GreetingReply),
    /// See [`ReplyShape::EhloAck`].
    EhloAck(EhloReply),
    /// See [`ReplyShape::Generic`].
    Generic(Reply),
}

impl TypedReply {
    /// The raw reply underneath.
    #[must_use]
    pub const fn reply(&self) -> &Reply {
        match self {
            Self::Greeting(g) => &g.reply,
            Self::EhloAck(e) => &e.reply,
            Self::Generic(r) => r,
        }
    }

    /// Shape this reply was parsed as.
    #[must_use]
    pub const fn shape(&self) -> ReplyShape {
        match self {
            Self::Greeting(_) => ReplyShape::Greeting,
            Self::EhloAck(_) => ReplyShape::EhloAck,
            Self::Generic(_) => ReplyShape::Generic,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classes() {
        let cases = [
            (220, "success"),
            (221, "success"),
            (250, "success"),
            (354, "intermediate"),
            (421, "transient"),
            (451, "transient"),
            (502, "permanent"),
            (550, "permanent"),
        ];
        for (code, class) in cases {
            let code = ReplyCode::new(code);
            let actual = if code.is_success() {
                "success"
            } else if code.is_intermediate() {
                "intermediate"
            } else if code.is_transient() {
                "transient"
            } else if code.is_permanent() {
                "permanent"
            } else {
                "none"
            };
            assert_eq!(actual, class, "{code}");
        }
        assert_eq!(ReplyCode::new(220), ReplyCode::SERVICE_READY);
    }

    #[test]
    fn test_failure_covers_4xx_and_5xx() {
        let busy = Reply::new(ReplyCode::new(450), vec!["busy".into()]);
        let gone = Reply::new(ReplyCode::new(550), vec!["no".into()]);
        let go_ahead = Reply::new(ReplyCode::START_DATA, vec![]);
        assert!(busy.is_failure() && busy.is_transient_error());
        assert!(gone.is_failure() && gone.is_permanent_error());
        assert!(!go_ahead.is_failure() && !go_ahead.is_success());
    }

    #[test]
    fn test_text_accessors() {
        let reply = Reply::new(ReplyCode::OK, vec!["mx.example".into(), "SIZE 10".into()]);
        assert_eq!(reply.message_text(), "mx.example\nSIZE 10");
        assert_eq!(reply.first_line(), "mx.example");
        assert_eq!(Reply::new(ReplyCode::OK, vec![]).first_line(), "");
    }

    #[test]
    fn test_typed_reply_accessors() {
        let raw = Reply::new(ReplyCode::OK, vec!["ok".into()]);
        let typed = TypedReply::Generic(raw.clone());
        assert_eq!(typed.reply(), &raw);
        assert_eq!(typed.shape(), ReplyShape::Generic);

        let ehlo = TypedReply::EhloAck(EhloReply {
            code: ReplyCode::OK,
            domain: "mx.example".into(),
            extensions: vec![Extension::Dsn],
            reply: raw.clone(),
        });
        assert_eq!(ehlo.shape(), ReplyShape::EhloAck);
        assert_eq!(ehlo.reply().code, ReplyCode::OK);
    }
}
