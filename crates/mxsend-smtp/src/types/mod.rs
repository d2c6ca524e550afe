//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::{AddressLiteral, Domain, Host, LocalPart, Mailbox, Path, ReversePath};
pub use extension::Extension;
pub use reply::{EhloReply, GreetingReply, Reply, ReplyCode, ReplyShape, TypedReply};
