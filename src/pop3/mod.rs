//! POP3 engine (RFC 1939 subset) over the user's INBOX.

mod session;

pub use session::{Pop3Result, Pop3Session, Pop3State};
