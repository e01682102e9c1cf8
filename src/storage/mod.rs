//! The shared mailbox store: folder tree on disk, `<UID>.eml` message
//! files, per-folder metadata and the per-user lock manager every protocol
//! engine funnels through.

pub mod locks;
pub mod metadata;
pub mod store;

pub use locks::LockManager;
pub use metadata::FolderMetadata;
pub use store::{FolderInfo, MailStore, MessageEntry};

/// System flag names as they appear in metadata records and on the wire.
pub const SEEN: &str = "\\Seen";
pub const ANSWERED: &str = "\\Answered";
pub const FLAGGED: &str = "\\Flagged";
pub const DELETED: &str = "\\Deleted";
pub const DRAFT: &str = "\\Draft";
pub const RECENT: &str = "\\Recent";
