//! IMAP engine: RFC 3501 subset with UID FETCH/STORE/COPY, folder
//! management and EXPUNGE over the shared mailbox store.

mod command;
mod envelope;
mod response;
mod session;

pub use command::{BodySection, FetchItems, ImapCommand, UidSet};
pub use session::{ImapResult, ImapSession, ImapState};
