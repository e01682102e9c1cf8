use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Protocol engines report most of these back onto the wire (`BAD`, `NO`,
/// `-ERR`, `4xx`/`5xx`) and keep the session alive; only a dead socket
/// terminates a handler.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed client line.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Valid verb issued in the wrong session state.
    #[error("command not valid now: {0}")]
    BadState(&'static str),

    /// Bad credentials.
    #[error("authentication failed")]
    AuthFailed,

    /// Filesystem or metadata failure in the mailbox store.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// DNS returned no usable answer for a relay target.
    #[error("could not resolve {0}")]
    Resolve(String),

    /// The outbound SMTP dialog failed.
    #[error("relay to {host} failed: {reason}")]
    Relay { host: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
