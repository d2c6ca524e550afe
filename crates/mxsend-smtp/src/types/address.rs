//! Envelope address types.
//!
//! Values here are produced by [`crate::parser::GrammarParser`] and are
//! immutable once parsed. `Display` writes the exact text that was accepted,
//! except that source routes are dropped from paths.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// `Local-part`: a dot-string or a quoted string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalPart {
    /// `Dot-string`, e.g. `first.last`.
    DotString(String),
    /// `Quoted-string` including the surrounding quotes and any escapes.
    Quoted(String),
}

impl LocalPart {
    /// Returns the local part as written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DotString(s) | Self::Quoted(s) => s,
        }
    }

    /// Returns true for the quoted form.
    #[must_use]
    pub const fn is_quoted(&self) -> bool {
        matches!(self, Self::Quoted(_))
    }
}

impl fmt::Display for LocalPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Domain`: sub-domains joined by dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain(String);

impl Domain {
    pub(crate) const fn new(name: String) -> Self {
        Self(name)
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the sub-domains.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `address-literal`, the bracketed host form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressLiteral {
    /// `[192.0.2.1]`
    Ipv4(Ipv4Addr),
    /// `[IPv6:2001:db8::1]`
    Ipv6(Ipv6Addr),
    /// `[tag:content]` with a tag other than `IPv6`.
    General {
        /// Standardized tag.
        tag: String,
        /// Literal content after the colon.
        content: String,
    },
}

impl fmt::Display for AddressLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4(ip) => write!(f, "[{ip}]"),
            Self::Ipv6(ip) => write!(f, "[IPv6:{ip}]"),
            Self::General { tag, content } => write!(f, "[{tag}:{content}]"),
        }
    }
}

/// Right-hand side of a mailbox, and the EHLO argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    /// Domain name.
    Domain(Domain),
    /// Bracketed literal.
    Literal(AddressLiteral),
}

impl Host {
    /// Returns the domain, if this is not a literal.
    #[must_use]
    pub const fn domain(&self) -> Option<&Domain> {
        match self {
            Self::Domain(d) => Some(d),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(d) => d.fmt(f),
            Self::Literal(l) => l.fmt(f),
        }
    }
}

/// `Mailbox`: `Local-part "@" ( Domain / address-literal )`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// Part before the `@`.
    pub local_part: LocalPart,
    /// Part after the `@`.
    pub host: Host,
}

impl Mailbox {
    /// Creates a mailbox from parsed parts.
    #[must_use]
    pub const fn new(local_part: LocalPart, host: Host) -> Self {
        Self { local_part, host }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.host)
    }
}

/// `Path`: a bracketed mailbox. Any source route was parsed and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    /// Destination mailbox.
    pub mailbox: Mailbox,
}

impl Path {
    /// Wraps a mailbox.
    #[must_use]
    pub const fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }
}

impl From<Mailbox> for Path {
    fn from(mailbox: Mailbox) -> Self {
        Self::new(mailbox)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.mailbox)
    }
}

/// `Reverse-path`: a path or the null sender `<>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReversePath {
    /// `<>`, used for bounces.
    Null,
    /// Regular sender.
    Path(Path),
}

impl ReversePath {
    /// Returns the sender mailbox, or `None` for the null path.
    #[must_use]
    pub const fn mailbox(&self) -> Option<&Mailbox> {
        match self {
            Self::Null => None,
            Self::Path(p) => Some(&p.mailbox),
        }
    }
}

impl fmt::Display for ReversePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<>"),
            Self::Path(p) => p.fmt(f),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn mailbox(local: &str, domain: &str) -> Mailbox {
        Mailbox::new(
            LocalPart::DotString(local.to_string()),
            Host::Domain(Domain::new(domain.to_string())),
        )
    }

    #[test]
    fn test_mailbox_display() {
        assert_eq!(mailbox("a.b", "example.com").to_string(), "a.b@example.com");
    }

    #[test]
    fn test_path_display() {
        let path = Path::from(mailbox("user", "example.com"));
        assert_eq!(path.to_string(), "<user@example.com>");
        assert_eq!(ReversePath::Path(path).to_string(), "<user@example.com>");
        assert_eq!(ReversePath::Null.to_string(), "<>");
    }

    #[test]
    fn test_literal_display() {
        let v4 = AddressLiteral::Ipv4(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(v4.to_string(), "[192.0.2.1]");
        let v6 = AddressLiteral::Ipv6(Ipv6Addr::LOCALHOST);
        assert_eq!(v6.to_string(), "[IPv6:::1]");
    }

    #[test]
    fn test_host_domain() {
        let host = Host::Domain(Domain::new("mx.example.com".into()));
        assert_eq!(host.domain().unwrap().labels().count(), 3);
        let lit = Host::Literal(AddressLiteral::Ipv4(Ipv4Addr::LOCALHOST));
        assert!(lit.domain().is_none());
    }

    #[test]
    fn test_reverse_path_mailbox() {
        assert!(ReversePath::Null.mailbox().is_none());
        let rp = ReversePath::Path(Path::from(mailbox("a", "b.c")));
        assert_eq!(rp.mailbox().unwrap().to_string(), "a@b.c");
    }
}
