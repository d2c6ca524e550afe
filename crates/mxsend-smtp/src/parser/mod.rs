//! SMTP command grammar and reply parsing.

mod grammar;
mod reply;

pub use grammar::{
    GrammarParser, parse_host_str, parse_local_part_str, parse_mailbox_str, parse_path_str,
    parse_reverse_path_str,
};
pub use reply::ReplyParser;
