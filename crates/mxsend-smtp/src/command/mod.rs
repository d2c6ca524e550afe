//! SMTP command builder.

use crate::types::{Host, Path, ReversePath};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client host
        host: Host,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client host
        host: Host,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender path
        from: ReversePath,
        /// BODY parameter (7BIT, 8BITMIME)
        body: Option<String>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient path
        to: Path,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// The four-letter command word.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.keyword().as_bytes());

        match self {
            Self::Helo { host } | Self::Ehlo { host } => {
                buf.push(b' ');
                buf.extend_from_slice(host.to_string().as_bytes());
            }
            Self::MailFrom { from, body, size } => {
                buf.extend_from_slice(b" FROM:");
                buf.extend_from_slice(from.to_string().as_bytes());
                if let Some(body_type) = body {
                    buf.extend_from_slice(b" BODY=");
                    buf.extend_from_slice(body_type.as_bytes());
                }
                if let Some(msg_size) = size {
                    buf.extend_from_slice(format!(" SIZE={msg_size}").as_bytes());
                }
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b" TO:");
                buf.extend_from_slice(to.to_string().as_bytes());
            }
            Self::Data | Self::Quit => {}
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::{parse_host_str, parse_mailbox_str};

    #[tokio::test]
    async fn test_ehlo_command() {
        let cmd = Command::Ehlo {
            host: parse_host_str("client.example.com").await.unwrap(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[tokio::test]
    async fn test_helo_literal() {
        let cmd = Command::Helo {
            host: parse_host_str("[192.0.2.7]").await.unwrap(),
        };
        assert_eq!(cmd.serialize(), b"HELO [192.0.2.7]\r\n");
    }

    #[tokio::test]
    async fn test_mail_from_simple() {
        let from = parse_mailbox_str("sender@example.com").await.unwrap();
        let cmd = Command::MailFrom {
            from: ReversePath::Path(from.into()),
            body: None,
            size: None,
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
    }

    #[tokio::test]
    async fn test_mail_from_with_params() {
        let from = parse_mailbox_str("sender@example.com").await.unwrap();
        let cmd = Command::MailFrom {
            from: ReversePath::Path(from.into()),
            body: Some("8BITMIME".to_string()),
            size: Some(12345),
        };
        assert_eq!(
            cmd.serialize(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn test_mail_from_null_sender() {
        let cmd = Command::MailFrom {
            from: ReversePath::Null,
            body: None,
            size: None,
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<>\r\n");
    }

    #[tokio::test]
    async fn test_rcpt_to_command() {
        let to = parse_mailbox_str("recipient@example.com").await.unwrap();
        let cmd = Command::RcptTo { to: to.into() };
        assert_eq!(cmd.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }
}
