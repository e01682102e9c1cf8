//! triomail: a multi-protocol mail server for one administrative domain.
//!
//! Three wire protocols run concurrently over a shared on-disk mailbox
//! store: SMTP (port 25) for inbound transfer and relaying, IMAP (143) for
//! interactive mailbox access, POP3 (110) for simple retrieval. Outbound
//! relaying resolves MX and A records itself with raw UDP DNS queries.

pub mod config;
pub mod dns;
pub mod error;
pub mod imap;
pub mod pop3;
pub mod server;
pub mod smtp;
pub mod storage;

pub use config::ServerConfig;
pub use error::{Error, Result};
