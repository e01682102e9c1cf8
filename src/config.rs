use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// SMTP listening port.
pub const SMTP_PORT: u16 = 25;

/// IMAP listening port.
pub const IMAP_PORT: u16 = 143;

/// POP3 listening port.
pub const POP3_PORT: u16 = 110;

/// Per-folder metadata file name.
pub const METADATA_FILE: &str = ".metadata";

/// Where the recursive resolver address is read from.
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Idle timeout for SMTP sessions.
pub const SMTP_IDLE: Duration = Duration::from_secs(5 * 60);

/// Idle timeout for IMAP sessions.
pub const IMAP_IDLE: Duration = Duration::from_secs(30 * 60);

/// Idle timeout for POP3 sessions.
pub const POP3_IDLE: Duration = Duration::from_secs(10 * 60);

/// Server configuration, built once in `main` and shared (via `Arc`) with
/// every listener and session. There is no global state; anything a handler
/// needs arrives through this value.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The domain this server is authoritative for (e.g. "uliege.be").
    pub domain: String,
    /// Upper bound on concurrently served connections across all protocols.
    pub max_connections: usize,
    /// Root directory of the on-disk mailbox store.
    pub storage_root: PathBuf,
    /// Static credential table: bare username -> password.
    users: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(domain: impl Into<String>, max_connections: usize) -> Self {
        let storage_root = std::env::var("TRIOMAIL_STORAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("storage"));

        Self {
            domain: domain.into(),
            max_connections,
            storage_root,
            users: default_users(),
        }
    }

    /// Replace the credential table (used by tests).
    pub fn with_users(mut self, users: HashMap<String, String>) -> Self {
        self.users = users;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Check a `user@domain` login against the credential table.
    ///
    /// The login must carry this server's domain; on success the bare
    /// username (the part before `@`) is returned.
    pub fn authenticate(&self, login: &str, password: &str) -> Option<String> {
        let username = login.strip_suffix(&format!("@{}", self.domain))?;
        match self.users.get(username) {
            Some(stored) if stored == password => Some(username.to_string()),
            _ => None,
        }
    }

    /// Whether a bare username exists in the credential table.
    pub fn is_local_user(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Whether a mail domain is served locally by this instance.
    pub fn is_local_domain(&self, domain: &str) -> bool {
        domain.eq_ignore_ascii_case(&self.domain) || domain.eq_ignore_ascii_case("localhost")
    }
}

/// The compiled-in user table.
fn default_users() -> HashMap<String, String> {
    let mut users = HashMap::new();
    users.insert("dcd".to_string(), "password".to_string());
    users.insert("vj".to_string(), "password".to_string());
    users
}
