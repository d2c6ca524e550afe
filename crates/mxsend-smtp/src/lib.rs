//! # mxsend-smtp
//!
//! Outbound SMTP delivery engine (RFC 5321 client side).
//!
//! ## Features
//!
//! - **Backtracking command grammar**: recursive-descent productions for
//!   paths, mailboxes, domains and address literals over any `AsyncRead`
//! - **Typed replies**: multi-line reply parsing with greeting and EHLO
//!   shapes extracted on demand
//! - **Dialogue state machine**: greeting, EHLO (HELO fallback), MAIL, RCPT,
//!   DATA, message, QUIT with per-step timeouts
//! - **Exchanger failover**: MX lookup, stable preference ordering, one
//!   session per host until one accepts
//! - **Extensions**: SIZE, 8BITMIME
//!
//! ## Quick Start
//!
//! ```ignore
//! use mxsend_smtp::{Config, Dispatcher, DnsLookup, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("relay.example.com");
//!     let transport = TcpTransport::new(config.connect_timeout);
//!     let dispatcher = Dispatcher::new(config, DnsLookup::from_system_conf()?, transport).await?;
//!
//!     let delivery = dispatcher
//!         .send_mail(
//!             "sender@example.com",
//!             &["recipient@example.org".to_string()],
//!             Some("Subject: Test\r\n\r\nHello, World!\r\n".to_string()),
//!         )
//!         .await?;
//!     println!("accepted by {}", delivery.exchanger);
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! ```text
//! Dispatcher ── ExchangerLookup (DNS MX)
//!     │
//!     └── Session ── ReplyParser / Command
//!             │
//!             └── TokenMatcher ── ByteCursor ── Transport (TCP)
//! ```
//!
//! ## Modules
//!
//! - [`cursor`]: Buffered read cursor with look-ahead and mark/reset
//! - [`lexer`]: Lexical classes of the command grammar
//! - [`parser`]: Command grammar and reply parser
//! - [`command`]: SMTP command builders
//! - [`connection`]: Configuration, transport and dialogue session
//! - [`resolver`]: Exchanger lookup and ordering
//! - [`dispatcher`]: Delivery with failover
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod cursor;
pub mod dispatcher;
mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod types;

pub use connection::{
    Config, ConfigBuilder, Envelope, RouteBy, ServerInfo, Session, SessionState, TcpTransport,
    Transport,
};
pub use dispatcher::{Delivery, Dispatcher};
pub use error::{Backtrack, DeliveryError, Error, HostFailure, Result};
pub use resolver::{DnsLookup, ExchangeCandidate, ExchangerLookup, LookupError, order_candidates};
pub use types::{
    Extension, Host, Mailbox, Path, Reply, ReplyCode, ReplyShape, ReversePath, TypedReply,
};
