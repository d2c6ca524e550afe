//! Service extensions advertised in the EHLO reply.

/// SMTP extensions discovered from EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// CHUNKING - Chunked message transfer
    Chunking,
    /// SMTPUTF8 - UTF-8 email addresses
    SmtpUtf8,
    /// DSN - Delivery status notifications
    Dsn,
    /// BINARYMIME - Binary MIME
    BinaryMime,
    /// ENHANCEDSTATUSCODES - RFC 3463 status codes in replies
    EnhancedStatusCodes,
    /// Unknown extension
    Unknown(String),
}

impl Extension {
    /// Parses one EHLO keyword line such as `SIZE 35882577`.
    ///
    /// Keywords are case-insensitive. Lines that name no known extension are
    /// kept verbatim as [`Extension::Unknown`].
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_ascii_whitespace();
        let Some(keyword) = words.next() else {
            return Self::Unknown(line.to_string());
        };
        match keyword.to_ascii_uppercase().as_str() {
            "SIZE" => Self::Size(words.next().and_then(|limit| limit.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "STARTTLS" => Self::StartTls,
            "PIPELINING" => Self::Pipelining,
            "CHUNKING" => Self::Chunking,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            "BINARYMIME" => Self::BinaryMime,
            "ENHANCEDSTATUSCODES" => Self::EnhancedStatusCodes,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keywords() {
        let table = [
            ("8BITMIME", Extension::EightBitMime),
            ("starttls", Extension::StartTls),
            ("Pipelining", Extension::Pipelining),
            ("CHUNKING", Extension::Chunking),
            ("SMTPUTF8", Extension::SmtpUtf8),
            ("DSN", Extension::Dsn),
            ("BINARYMIME", Extension::BinaryMime),
            ("ENHANCEDSTATUSCODES", Extension::EnhancedStatusCodes),
        ];
        for (line, expected) in table {
            assert_eq!(Extension::parse(line), expected, "{line}");
        }
    }

    #[test]
    fn test_size_argument() {
        assert_eq!(
            Extension::parse("SIZE 35882577"),
            Extension::Size(Some(35_882_577))
        );
        assert_eq!(Extension::parse("size"), Extension::Size(None));
        assert_eq!(Extension::parse("SIZE lots"), Extension::Size(None));
    }

    #[test]
    fn test_unknown_kept_verbatim() {
        // AUTH is not negotiated by an outbound relay.
        assert_eq!(
            Extension::parse("AUTH PLAIN LOGIN"),
            Extension::Unknown("AUTH PLAIN LOGIN".into())
        );
        assert_eq!(Extension::parse("  "), Extension::Unknown("  ".into()));
    }
}
