//! Recursive-descent parser for the RFC 5321 command grammar.
//!
//! One method per production. A production either succeeds having consumed
//! its text, or fails with [`Error::ClassNotFound`] having consumed nothing,
//! or fails with a fatal error. Once a production has consumed input and no
//! alternative is left, a missing token is escalated to
//! [`Error::GrammarViolation`] through [`Backtrack::commit`].
//!
//! ```text
//! Reverse-path   = Path / "<>"
//! Path           = "<" [ A-d-l ":" ] Mailbox ">"
//! A-d-l          = At-domain *( "," At-domain )
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *( "." Atom )
//! Quoted-string  = DQUOTE *( qtextSMTP / quoted-pairSMTP ) DQUOTE
//! Domain         = sub-domain *( "." sub-domain )
//! sub-domain     = Let-dig [ Ldh-str ]
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::AsyncRead;

use crate::command::Command;
use crate::error::{Backtrack, Error, Result};
use crate::lexer::{LexicalClass as Class, TokenMatcher};
use crate::types::{AddressLiteral, Domain, Host, LocalPart, Mailbox, Path, ReversePath};

/// Grammar parser borrowing a [`TokenMatcher`].
///
/// The parser holds no state of its own, so a session can build one on
/// demand over the same matcher its reply parser uses.
#[derive(Debug)]
pub struct GrammarParser<'a, S> {
    m: &'a mut TokenMatcher<S>,
}

impl<'a, S> GrammarParser<'a, S>
where
    S: AsyncRead + Unpin,
{
    /// Creates a parser over `matcher`.
    pub const fn new(matcher: &'a mut TokenMatcher<S>) -> Self {
        Self { m: matcher }
    }

    fn pos(&self) -> u64 {
        self.m.position()
    }

    /// Reads the fixed 4-byte command word and upper-cases it.
    ///
    /// # Errors
    ///
    /// `GrammarViolation` if the word is not alphabetic; `StreamExhausted` if
    /// the stream ends first.
    pub async fn command_keyword(&mut self) -> Result<String> {
        let pos = self.pos();
        let bytes = self.m.cursor_mut().read_exact(4).await?;
        if !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(Error::GrammarViolation {
                production: "command",
                position: pos,
            });
        }
        Ok(bytes
            .iter()
            .map(|b| char::from(b.to_ascii_uppercase()))
            .collect())
    }

    /// `Atom = 1*atext`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if no atext is present.
    pub async fn atom(&mut self) -> Result<String> {
        self.m.expect_run(&[Class::Atext]).await
    }

    /// `Dot-string = Atom *("." Atom)`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if the first atom is missing; `GrammarViolation` if a
    /// dot is not followed by an atom.
    pub async fn dot_string(&mut self) -> Result<String> {
        let mut value = self.atom().await?;
        while self.m.expect(Class::Dot).await.optional()?.is_some() {
            let pos = self.pos();
            let atom = self.atom().await.commit("dot-string", pos)?;
            value.push('.');
            value.push_str(&atom);
        }
        Ok(value)
    }

    /// `Quoted-string`, returned with its quotes and escapes intact.
    ///
    /// # Errors
    ///
    /// `ClassNotFound` without an opening quote; `GrammarViolation` if the
    /// closing quote is missing.
    pub async fn quoted_string(&mut self) -> Result<String> {
        self.m.expect(Class::Dquote).await?;
        let mut value = String::from('"');
        while let Some(text) = self
            .m
            .expect_any(&[Class::Qtext, Class::Qpair])
            .await
            .optional()?
        {
            value.push_str(&text);
        }
        let pos = self.pos();
        self.m.expect(Class::Dquote).await.commit("quoted-string", pos)?;
        value.push('"');
        Ok(value)
    }

    /// `Local-part = Dot-string / Quoted-string`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if neither alternative starts here.
    pub async fn local_part(&mut self) -> Result<LocalPart> {
        if let Some(dot) = self.dot_string().await.optional()? {
            return Ok(LocalPart::DotString(dot));
        }
        self.quoted_string().await.map(LocalPart::Quoted)
    }

    /// `sub-domain = Let-dig [Ldh-str]`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` without a leading letter or digit; `GrammarViolation`
    /// if the label ends in a hyphen.
    pub async fn sub_domain(&mut self) -> Result<String> {
        let mut label = self.m.expect_any(&[Class::Alpha, Class::Digit]).await?;
        while let Some(ch) = self
            .m
            .expect_any(&[Class::Alpha, Class::Digit, Class::Hyphen])
            .await
            .optional()?
        {
            label.push_str(&ch);
        }
        if label.ends_with('-') {
            return Err(Error::GrammarViolation {
                production: "sub-domain",
                position: self.pos(),
            });
        }
        Ok(label)
    }

    /// `Domain = sub-domain *("." sub-domain)`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if the first label is missing; `GrammarViolation` on
    /// an empty label after a dot.
    pub async fn domain(&mut self) -> Result<Domain> {
        let mut name = self.sub_domain().await?;
        while self.m.expect(Class::Dot).await.optional()?.is_some() {
            let pos = self.pos();
            let label = self.sub_domain().await.commit("domain", pos)?;
            name.push('.');
            name.push_str(&label);
        }
        Ok(Domain::new(name))
    }

    /// `address-literal = "[" ( IPv4 / "IPv6:" IPv6 / tag ":" 1*dcontent ) "]"`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` without an opening bracket; `GrammarViolation` if the
    /// content is not a valid literal.
    pub async fn address_literal(&mut self) -> Result<AddressLiteral> {
        self.m.expect(Class::LeftBracket).await?;
        let start = self.pos();
        let content = self
            .m
            .expect_run(&[Class::Dcontent])
            .await
            .commit("address-literal", start)?;
        let pos = self.pos();
        self.m
            .expect(Class::RightBracket)
            .await
            .commit("address-literal", pos)?;
        interpret_literal(&content).ok_or(Error::GrammarViolation {
            production: "address-literal",
            position: start,
        })
    }

    /// `Domain / address-literal`, chosen on the first byte.
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if neither starts here.
    pub async fn host(&mut self) -> Result<Host> {
        if self.m.cursor_mut().peek_byte().await? == b'[' {
            self.address_literal().await.map(Host::Literal)
        } else {
            self.domain().await.map(Host::Domain)
        }
    }

    /// `Mailbox = Local-part "@" ( Domain / address-literal )`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if no local part starts here; `GrammarViolation` once
    /// the local part has been read.
    pub async fn mailbox(&mut self) -> Result<Mailbox> {
        let local_part = self.local_part().await?;
        let pos = self.pos();
        self.m.expect(Class::At).await.commit("mailbox", pos)?;
        let pos = self.pos();
        let host = self.host().await.commit("mailbox", pos)?;
        Ok(Mailbox::new(local_part, host))
    }

    /// `A-d-l ":"`. The route is read and thrown away.
    ///
    /// Both `@a,@b:` and the comma-less `@a@b:` are accepted.
    ///
    /// # Errors
    ///
    /// `GrammarViolation` on any deviation; the caller only enters this
    /// production after seeing `@`.
    pub async fn source_route(&mut self) -> Result<()> {
        loop {
            let pos = self.pos();
            self.m.expect(Class::At).await.commit("source-route", pos)?;
            let pos = self.pos();
            self.domain().await.commit("source-route", pos)?;
            let separator = self
                .m
                .expect_any(&[Class::Comma, Class::Colon])
                .await
                .optional()?;
            match separator.as_deref() {
                Some(",") => {}
                Some(_) => return Ok(()),
                None => {
                    if self.m.cursor_mut().peek_byte().await? != b'@' {
                        return Err(Error::GrammarViolation {
                            production: "source-route",
                            position: self.pos(),
                        });
                    }
                }
            }
        }
    }

    /// `Path = "<" [ A-d-l ":" ] Mailbox ">"`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if there is no `<` or no mailbox after it, with the
    /// cursor restored to where it started; `GrammarViolation` past the
    /// mailbox.
    pub async fn path(&mut self) -> Result<Path> {
        let mark = self.m.cursor_mut().mark();
        self.m.expect(Class::LeftAngle).await?;
        if self.m.cursor_mut().peek_byte().await? == b'@' {
            self.source_route().await?;
        }
        let mailbox = match self.mailbox().await {
            Ok(mailbox) => mailbox,
            Err(e) if e.is_class_not_found() => {
                self.m.cursor_mut().reset(mark)?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let pos = self.pos();
        self.m.expect(Class::RightAngle).await.commit("path", pos)?;
        Ok(Path::new(mailbox))
    }

    /// `Reverse-path = Path / "<>"`
    ///
    /// # Errors
    ///
    /// `ClassNotFound` if neither alternative matches; the cursor is restored
    /// to where it started in that case.
    pub async fn reverse_path(&mut self) -> Result<ReversePath> {
        if let Some(path) = self.path().await.optional()? {
            return Ok(ReversePath::Path(path));
        }
        let mark = self.m.cursor_mut().mark();
        self.m.expect(Class::LeftAngle).await?;
        if let Err(e) = self.m.expect(Class::RightAngle).await {
            self.m.cursor_mut().reset(mark)?;
            return Err(e);
        }
        Ok(ReversePath::Null)
    }

    /// EHLO/HELO argument: `SP ( Domain / address-literal )`
    ///
    /// # Errors
    ///
    /// `GrammarViolation` if the argument is missing or malformed.
    pub async fn ehlo_argument(&mut self) -> Result<Host> {
        let pos = self.pos();
        self.m.expect(Class::Space).await.commit("ehlo", pos)?;
        let pos = self.pos();
        self.host().await.commit("ehlo", pos)
    }

    /// MAIL argument: `SP "FROM" [":"] Reverse-path`
    ///
    /// Some clients omit the colon; it is accepted either way.
    ///
    /// # Errors
    ///
    /// `GrammarViolation` if the argument is missing or malformed.
    pub async fn mail_argument(&mut self) -> Result<ReversePath> {
        let pos = self.pos();
        self.m.expect(Class::Space).await.commit("mail", pos)?;
        let pos = self.pos();
        self.m.expect_keyword("FROM").await.commit("mail", pos)?;
        self.m.expect(Class::Colon).await.optional()?;
        let pos = self.pos();
        self.reverse_path().await.commit("mail", pos)
    }

    /// RCPT argument: `SP "TO:" Forward-path`
    ///
    /// # Errors
    ///
    /// `GrammarViolation` if the argument is missing or malformed.
    pub async fn rcpt_argument(&mut self) -> Result<Path> {
        let pos = self.pos();
        self.m.expect(Class::Space).await.commit("rcpt", pos)?;
        let pos = self.pos();
        self.m.expect_keyword("TO").await.commit("rcpt", pos)?;
        let pos = self.pos();
        self.m.expect(Class::Colon).await.commit("rcpt", pos)?;
        let pos = self.pos();
        self.path().await.commit("rcpt", pos)
    }

    /// `*( SP esmtp-keyword ["=" esmtp-value] )` after a MAIL path.
    ///
    /// # Errors
    ///
    /// `GrammarViolation` on a malformed parameter.
    pub async fn mail_parameters(&mut self) -> Result<Vec<(String, Option<String>)>> {
        let mut params = Vec::new();
        while self.m.expect(Class::Space).await.optional()?.is_some() {
            let pos = self.pos();
            let mut keyword = self
                .m
                .expect_any(&[Class::Alpha, Class::Digit])
                .await
                .commit("mail-parameters", pos)?;
            while let Some(ch) = self
                .m
                .expect_any(&[Class::Alpha, Class::Digit, Class::Hyphen])
                .await
                .optional()?
            {
                keyword.push_str(&ch);
            }
            let value = if self.m.expect_keyword("=").await.optional()?.is_some() {
                let pos = self.pos();
                Some(
                    self.m
                        .expect_run(&[Class::EsmtpValue])
                        .await
                        .commit("mail-parameters", pos)?,
                )
            } else {
                None
            };
            params.push((keyword.to_ascii_uppercase(), value));
        }
        Ok(params)
    }

    /// Reads one complete command line.
    ///
    /// # Errors
    ///
    /// `GrammarViolation` for unknown commands or malformed arguments;
    /// `StreamExhausted` if the peer closed the connection.
    pub async fn command(&mut self) -> Result<Command> {
        let start = self.pos();
        let keyword = self.command_keyword().await?;
        let command = match keyword.as_str() {
            "EHLO" => Command::Ehlo {
                host: self.ehlo_argument().await?,
            },
            "HELO" => Command::Helo {
                host: self.ehlo_argument().await?,
            },
            "MAIL" => {
                let from = self.mail_argument().await?;
                let mut body = None;
                let mut size = None;
                for (name, value) in self.mail_parameters().await? {
                    match name.as_str() {
                        "BODY" => body = value,
                        "SIZE" => size = value.and_then(|v| v.parse().ok()),
                        _ => {}
                    }
                }
                Command::MailFrom { from, body, size }
            }
            "RCPT" => Command::RcptTo {
                to: self.rcpt_argument().await?,
            },
            "DATA" => Command::Data,
            "QUIT" => Command::Quit,
            _ => {
                return Err(Error::GrammarViolation {
                    production: "command",
                    position: start,
                });
            }
        };
        let pos = self.pos();
        self.m.expect_crlf().await.commit("command", pos)?;
        self.m.cursor_mut().compact();
        Ok(command)
    }
}

/// Classifies the text between the brackets of an address literal.
fn interpret_literal(content: &str) -> Option<AddressLiteral> {
    if let Ok(ip) = content.parse::<Ipv4Addr>() {
        return Some(AddressLiteral::Ipv4(ip));
    }
    let (tag, rest) = content.split_once(':')?;
    let tag_ok = tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && tag.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
        && tag.bytes().last().is_some_and(|b| b.is_ascii_alphanumeric());
    if !tag_ok || rest.is_empty() {
        return None;
    }
    if tag.eq_ignore_ascii_case("IPv6") {
        return rest.parse::<Ipv6Addr>().ok().map(AddressLiteral::Ipv6);
    }
    Some(AddressLiteral::General {
        tag: tag.to_string(),
        content: rest.to_string(),
    })
}

/// Runs `$production` over `$input` as if it were one CRLF-terminated line
/// and requires the whole line to be consumed.
macro_rules! parse_line {
    ($input:expr, $production:ident, $name:literal) => {{
        let mut bytes = $input.as_bytes().to_vec();
        bytes.extend_from_slice(b"\r\n");
        let mut matcher = TokenMatcher::from_stream(bytes.as_slice());
        let value = GrammarParser::new(&mut matcher)
            .$production()
            .await
            .commit($name, 0)?;
        let pos = matcher.position();
        matcher.expect_crlf().await.commit($name, pos)?;
        match matcher.cursor_mut().peek_byte().await {
            Err(Error::StreamExhausted) => Ok(value),
            Ok(_) => Err(Error::GrammarViolation {
                production: $name,
                position: matcher.position(),
            }),
            Err(e) => Err(e),
        }
    }};
}

/// Parses a bare mailbox such as `user@example.com`.
///
/// # Errors
///
/// `GrammarViolation` if the text is not exactly one mailbox.
pub async fn parse_mailbox_str(input: &str) -> Result<Mailbox> {
    parse_line!(input, mailbox, "mailbox")
}

/// Parses a bracketed path such as `<user@example.com>`.
///
/// # Errors
///
/// `GrammarViolation` if the text is not exactly one path.
pub async fn parse_path_str(input: &str) -> Result<Path> {
    parse_line!(input, path, "path")
}

/// Parses a reverse path: a bracketed path or `<>`.
///
/// # Errors
///
/// `GrammarViolation` if the text is not exactly one reverse path.
pub async fn parse_reverse_path_str(input: &str) -> Result<ReversePath> {
    parse_line!(input, reverse_path, "reverse-path")
}

/// Parses a domain or address literal, as used for EHLO.
///
/// # Errors
///
/// `GrammarViolation` if the text is not exactly one host.
pub async fn parse_host_str(input: &str) -> Result<Host> {
    parse_line!(input, host, "host")
}

/// Parses a local part on its own.
///
/// # Errors
///
/// `GrammarViolation` if the text is not exactly one local part.
pub async fn parse_local_part_str(input: &str) -> Result<LocalPart> {
    parse_line!(input, local_part, "local-part")
}
