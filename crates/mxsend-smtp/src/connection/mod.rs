//! SMTP client connections.
//!
//! - Configuration (HELO name, port, timeouts, routing)
//! - Transport abstraction with a TCP implementation
//! - The per-exchanger dialogue [`Session`]

mod config;
mod session;
mod stream;

pub use config::{Config, ConfigBuilder, DEFAULT_MAX_LINE_LENGTH, DEFAULT_PORT, RouteBy};
pub use session::{Envelope, Session, SessionState};
pub use stream::{TcpTransport, Transport};

use std::collections::HashSet;

use crate::types::{EhloReply, Extension};

/// What the exchanger told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server identifier from the greeting.
    pub identifier: String,
    /// Domain from the EHLO/HELO acknowledgement.
    pub domain: String,
    /// Supported extensions; empty after a HELO fallback.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Records an EHLO acknowledgement.
    pub fn apply_ehlo(&mut self, ehlo: &EhloReply) {
        self.domain.clone_from(&ehlo.domain);
        self.extensions = ehlo.extensions.iter().cloned().collect();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Returns true if SIZE was advertised, with or without a limit.
    #[must_use]
    pub fn supports_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised. Zero means no limit.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        for ext in &self.extensions {
            if let Extension::Size(Some(size)) = ext {
                return (*size > 0).then_some(*size);
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::{Reply, ReplyCode};

    fn info(extensions: Vec<Extension>) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.apply_ehlo(&EhloReply {
            code: ReplyCode::OK,
            domain: "mx.example.com".into(),
            extensions,
            reply: Reply::new(ReplyCode::OK, vec![]),
        });
        info
    }

    #[test]
    fn test_apply_ehlo() {
        let info = info(vec![Extension::EightBitMime, Extension::Pipelining]);
        assert_eq!(info.domain, "mx.example.com");
        assert!(info.supports_8bitmime());
        assert!(info.supports(&Extension::Pipelining));
        assert!(!info.supports(&Extension::Chunking));
    }

    #[test]
    fn test_max_message_size() {
        assert_eq!(info(vec![Extension::Size(Some(1000))]).max_message_size(), Some(1000));
        assert_eq!(info(vec![Extension::Size(Some(0))]).max_message_size(), None);
        assert!(info(vec![Extension::Size(None)]).supports_size());
        assert_eq!(info(vec![]).max_message_size(), None);
        assert!(!info(vec![]).supports_size());
    }
}
