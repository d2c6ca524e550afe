//! Error types for SMTP delivery.

use std::io;
use std::time::Duration;

use crate::lexer::LexicalClass;

/// Result type alias for session and parser operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Session-level error types.
///
/// Everything except [`Error::ClassNotFound`] is fatal to the session that
/// produced it. `ClassNotFound` is the backtracking signal of the grammar and
/// is recovered by the production that can try an alternative.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended before the requested bytes arrived.
    #[error("Stream exhausted")]
    StreamExhausted,

    /// Push-back requested with no freshly consumed byte.
    #[error("No byte to unread")]
    NoByteToUnread,

    /// The next input does not belong to the requested lexical class.
    #[error("{}", describe_miss(.class))]
    ClassNotFound {
        /// Attempted class, `None` when several alternatives were tried.
        class: Option<LexicalClass>,
    },

    /// Input violates the grammar and no alternative remains.
    #[error("Grammar violation in {production} at byte {position}")]
    GrammarViolation {
        /// Production that failed.
        production: &'static str,
        /// Absolute stream offset of the failure.
        position: u64,
    },

    /// Reply line does not follow `DDD[ -]text CRLF`.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Reply parsed but does not fit the expected shape.
    #[error("Unexpected reply shape: {0}")]
    UnexpectedReplyShape(String),

    /// Server answered with a failure-class reply (4xx or 5xx).
    #[error("SMTP error {code}: {message}")]
    Rejected {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Operation attempted in the wrong session state.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// Message exceeds the size advertised by the server.
    #[error("Message exceeds size limit: {size} bytes (limit {limit})")]
    MessageTooLarge {
        /// Size of the message on the wire.
        size: usize,
        /// Limit advertised by the SIZE extension.
        limit: usize,
    },

    /// Read or write did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Creates a rejection from a reply code and message.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Creates a `ClassNotFound` for a single class.
    #[must_use]
    pub const fn class_not_found(class: LexicalClass) -> Self {
        Self::ClassNotFound { class: Some(class) }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if this is the grammar's backtracking signal.
    #[must_use]
    pub const fn is_class_not_found(&self) -> bool {
        matches!(self, Self::ClassNotFound { .. })
    }

    /// Returns true if the peer broke the protocol (as opposed to refusing).
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::GrammarViolation { .. }
                | Self::MalformedReply(_)
                | Self::UnexpectedReplyShape(_)
                | Self::ClassNotFound { .. }
        )
    }
}

/// Backtracking helpers for grammar results.
pub trait Backtrack<T> {
    /// Turns `ClassNotFound` into `Ok(None)`; other errors pass through.
    ///
    /// # Errors
    ///
    /// Returns every error other than `ClassNotFound`.
    fn optional(self) -> Result<Option<T>>;

    /// Escalates `ClassNotFound` to `GrammarViolation`.
    ///
    /// # Errors
    ///
    /// Returns the escalated or original error.
    fn commit(self, production: &'static str, position: u64) -> Result<T>;
}

impl<T> Backtrack<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(Error::ClassNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn commit(self, production: &'static str, position: u64) -> Result<T> {
        self.map_err(|e| match e {
            Error::ClassNotFound { .. } => Error::GrammarViolation {
                production,
                position,
            },
            other => other,
        })
    }
}

/// Why one exchanger did not take the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    /// Exchanger host name.
    pub host: String,
    /// Human-readable reason.
    pub reason: String,
}

impl std::fmt::Display for HostFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.host, self.reason)
    }
}

/// User-visible delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Address does not parse as a mailbox.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Lookup returned no exchangers or failed.
    #[error("No mail exchangers found for {domain}: {reason}")]
    NoExchangersFound {
        /// Domain that was looked up.
        domain: String,
        /// Lookup failure or "empty answer".
        reason: String,
    },

    /// Every candidate was tried and none accepted the message.
    #[error("All {} exchangers failed: {}", .failures.len(), join_failures(.failures))]
    AllExchangersFailed {
        /// One entry per attempted host, in attempt order.
        failures: Vec<HostFailure>,
    },
}

fn describe_miss(class: &Option<LexicalClass>) -> String {
    match class {
        Some(class) => format!("Expected {class} not found"),
        None => "No expected token found".to_string(),
    }
}

fn join_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::rejected(550, "no such user").is_permanent());
        assert!(Error::rejected(451, "try later").is_transient());
        assert!(!Error::rejected(451, "try later").is_permanent());
        assert!(!Error::StreamExhausted.is_permanent());
        assert!(Error::MalformedReply("x".into()).is_protocol_violation());
        assert!(!Error::rejected(550, "x").is_protocol_violation());
    }

    #[test]
    fn test_optional_swallows_only_class_not_found() {
        let miss: Result<u8> = Err(Error::class_not_found(LexicalClass::At));
        assert!(miss.optional().unwrap().is_none());

        let io: Result<u8> = Err(Error::StreamExhausted);
        assert!(matches!(io.optional(), Err(Error::StreamExhausted)));
    }

    #[test]
    fn test_commit_escalates() {
        let miss: Result<u8> = Err(Error::class_not_found(LexicalClass::RightAngle));
        match miss.commit("path", 7) {
            Err(Error::GrammarViolation {
                production,
                position,
            }) => {
                assert_eq!(production, "path");
                assert_eq!(position, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_all_failed_display() {
        let err = DeliveryError::AllExchangersFailed {
            failures: vec![
                HostFailure {
                    host: "mx1".into(),
                    reason: "SMTP error 550: nope".into(),
                },
                HostFailure {
                    host: "mx2".into(),
                    reason: "I/O error: refused".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("All 2 exchangers failed"));
        assert!(text.contains("mx1: SMTP error 550"));
    }
}
