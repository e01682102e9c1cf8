use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::storage::{MailStore, MessageEntry, DELETED};

/// POP3 session states (RFC 1939).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pop3State {
    Authorization,
    Transaction,
    /// Entered by QUIT; marked messages are reaped and the session ends.
    Update,
}

/// Outcome of feeding one line to the session.
#[derive(Debug, Default)]
pub struct Pop3Result {
    pub response: Vec<u8>,
    pub should_close: bool,
}

impl Pop3Result {
    fn text(response: String) -> Self {
        Self {
            response: response.into_bytes(),
            should_close: false,
        }
    }
}

/// POP3 session over a user's INBOX.
///
/// Message numbers are 1-based positions in the current list of messages
/// not marked `\Deleted`; deletion marks live in the shared store and only
/// become file removals when QUIT enters the UPDATE state.
pub struct Pop3Session {
    pub state: Pop3State,
    config: Arc<ServerConfig>,
    store: Arc<MailStore>,
    /// Login name remembered between USER and PASS.
    pending_user: Option<String>,
    /// Authenticated bare username.
    username: Option<String>,
    messages: Vec<MessageEntry>,
}

const FOLDER: &str = "INBOX";

impl Pop3Session {
    pub fn new(config: Arc<ServerConfig>, store: Arc<MailStore>) -> Self {
        Self {
            state: Pop3State::Authorization,
            config,
            store,
            pending_user: None,
            username: None,
            messages: Vec::new(),
        }
    }

    pub fn greeting(&self) -> Vec<u8> {
        b"+OK POP3 server ready\r\n".to_vec()
    }

    /// Process one line (without its CRLF).
    pub fn process_line(&mut self, line: &str) -> Pop3Result {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_uppercase(), arg.trim()),
            None => (line.trim().to_uppercase(), ""),
        };
        debug!(verb = %verb, "pop3 command");

        match verb.as_str() {
            "USER" => self.cmd_user(arg),
            "PASS" => self.cmd_pass(arg),
            "STAT" => self.in_transaction(|s| s.cmd_stat()),
            "LIST" => self.in_transaction(|s| s.cmd_list(arg, false)),
            "UIDL" => self.in_transaction(|s| s.cmd_list(arg, true)),
            "RETR" => self.in_transaction(|s| s.cmd_retr(arg)),
            "DELE" => self.in_transaction(|s| s.cmd_dele(arg)),
            "RSET" => self.in_transaction(|s| s.cmd_rset()),
            "NOOP" => self.in_transaction(|_| ok("Noop")),
            "QUIT" => self.cmd_quit(),
            _ => err("Unknown command"),
        }
    }

    fn in_transaction(&mut self, f: impl FnOnce(&mut Self) -> Pop3Result) -> Pop3Result {
        if self.state != Pop3State::Transaction {
            return err("Authenticate first");
        }
        f(self)
    }

    fn cmd_user(&mut self, arg: &str) -> Pop3Result {
        if self.state != Pop3State::Authorization {
            return err("Already authenticated");
        }
        if arg.is_empty() {
            return err("User required");
        }
        self.pending_user = Some(arg.to_string());
        ok("User accepted")
    }

    fn cmd_pass(&mut self, arg: &str) -> Pop3Result {
        if self.state != Pop3State::Authorization {
            return err("Already authenticated");
        }
        if arg.is_empty() {
            return err("Password required");
        }
        let Some(login) = self.pending_user.clone() else {
            return err("Send USER first");
        };

        match self.config.authenticate(&login, arg) {
            Some(username) => {
                self.messages = self
                    .store
                    .list_messages(&username, FOLDER)
                    .unwrap_or_default();
                self.username = Some(username);
                self.state = Pop3State::Transaction;
                ok("Logged in")
            }
            None => {
                self.pending_user = None;
                err("Auth failed")
            }
        }
    }

    fn user(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    fn refresh(&mut self) {
        let user = self.user().to_string();
        match self.store.list_messages(&user, FOLDER) {
            Ok(messages) => self.messages = messages,
            Err(err) => warn!(%err, "could not refresh message list"),
        }
    }

    /// Messages not marked for deletion, in UID order.
    fn visible(&self) -> Vec<&MessageEntry> {
        self.messages
            .iter()
            .filter(|m| {
                !self
                    .store
                    .is_deleted(self.user(), FOLDER, m.uid)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn cmd_stat(&mut self) -> Pop3Result {
        self.refresh();
        let visible = self.visible();
        let total: u64 = visible.iter().map(|m| m.size).sum();
        ok(&format!("{} {}", visible.len(), total))
    }

    fn cmd_list(&mut self, arg: &str, uidl: bool) -> Pop3Result {
        self.refresh();
        let visible = self.visible();

        let render = |index: usize, entry: &MessageEntry| {
            if uidl {
                format!("{} {}", index + 1, entry.uid)
            } else {
                format!("{} {}", index + 1, entry.size)
            }
        };

        // Single-message form: one +OK line, no terminator.
        if !arg.is_empty() {
            let Ok(number) = arg.parse::<usize>() else {
                return err("Invalid message number");
            };
            return match number.checked_sub(1).and_then(|i| visible.get(i).map(|e| (i, *e))) {
                Some((index, entry)) => ok(&render(index, entry)),
                None => err("No such message"),
            };
        }

        let mut out = format!("+OK {} messages\r\n", visible.len());
        for (index, entry) in visible.iter().enumerate() {
            out.push_str(&render(index, entry));
            out.push_str("\r\n");
        }
        out.push_str(".\r\n");
        Pop3Result::text(out)
    }

    fn cmd_retr(&mut self, arg: &str) -> Pop3Result {
        self.refresh();
        let Ok(number) = arg.parse::<usize>() else {
            return err("Invalid message number");
        };
        let visible = self.visible();
        let Some(entry) = number.checked_sub(1).and_then(|i| visible.get(i).copied()) else {
            return err("Message not found or deleted");
        };

        let user = self.user().to_string();
        let content = match self.store.read_message(&user, &entry.path) {
            Ok(content) => content,
            Err(err_) => {
                warn!(err = %err_, uid = entry.uid, "RETR read failed");
                return err("Cannot read message");
            }
        };

        // Stream the message with dot-stuffing, terminated by a lone dot.
        let mut out = format!("+OK {} octets\r\n", entry.size).into_bytes();
        for line in String::from_utf8_lossy(&content).lines() {
            if line.starts_with('.') {
                out.push(b'.');
            }
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");

        Pop3Result {
            response: out,
            should_close: false,
        }
    }

    fn cmd_dele(&mut self, arg: &str) -> Pop3Result {
        let Ok(number) = arg.parse::<usize>() else {
            return err("Invalid message number");
        };
        let visible = self.visible();
        let Some(entry) = number.checked_sub(1).and_then(|i| visible.get(i).copied()) else {
            return err("Message not found or deleted");
        };

        let user = self.user().to_string();
        let uid = entry.uid;
        if self.store.is_deleted(&user, FOLDER, uid).unwrap_or(false) {
            return err("Message already deleted or invalid");
        }
        match self.store.update_flag(&user, FOLDER, uid, DELETED, true) {
            Ok(()) => ok("Message marked for deletion"),
            Err(err_) => {
                warn!(err = %err_, uid, "DELE failed");
                err("Could not mark message")
            }
        }
    }

    fn cmd_rset(&mut self) -> Pop3Result {
        let user = self.user().to_string();
        for entry in &self.messages {
            if self.store.is_deleted(&user, FOLDER, entry.uid).unwrap_or(false) {
                if let Err(err_) = self
                    .store
                    .update_flag(&user, FOLDER, entry.uid, DELETED, false)
                {
                    warn!(err = %err_, uid = entry.uid, "RSET failed for message");
                }
            }
        }
        ok(&format!("maildrop has {} messages", self.messages.len()))
    }

    /// QUIT is legal in any state; with an authenticated user it enters
    /// UPDATE and reaps every message marked `\Deleted`.
    fn cmd_quit(&mut self) -> Pop3Result {
        self.state = Pop3State::Update;

        if self.username.is_some() {
            let user = self.user().to_string();
            for entry in std::mem::take(&mut self.messages) {
                if self.store.is_deleted(&user, FOLDER, entry.uid).unwrap_or(false) {
                    if let Err(err_) = self.store.delete_message(&user, FOLDER, entry.uid) {
                        warn!(err = %err_, uid = entry.uid, "could not reap message");
                    }
                }
            }
        }

        Pop3Result {
            response: b"+OK Bye\r\n".to_vec(),
            should_close: true,
        }
    }
}

fn ok(message: &str) -> Pop3Result {
    Pop3Result::text(format!("+OK {message}\r\n"))
}

fn err(message: &str) -> Pop3Result {
    Pop3Result::text(format!("-ERR {message}\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Pop3Session, Arc<MailStore>) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ServerConfig::new("uliege.be", 4));
        let store = Arc::new(MailStore::new(dir.path()));
        let session = Pop3Session::new(config, store.clone());
        (dir, session, store)
    }

    fn text(result: Pop3Result) -> String {
        String::from_utf8_lossy(&result.response).to_string()
    }

    fn login(session: &mut Pop3Session) {
        assert!(text(session.process_line("USER dcd@uliege.be")).starts_with("+OK"));
        assert!(text(session.process_line("PASS password")).starts_with("+OK"));
        assert_eq!(session.state, Pop3State::Transaction);
    }

    #[test]
    fn greeting_is_ok_banner() {
        let (_dir, session, _store) = setup();
        assert_eq!(session.greeting(), b"+OK POP3 server ready\r\n");
    }

    #[test]
    fn bad_password_stays_in_authorization() {
        let (_dir, mut session, _store) = setup();
        session.process_line("USER dcd@uliege.be");
        let reply = text(session.process_line("PASS wrong"));
        assert!(reply.starts_with("-ERR"));
        assert_eq!(session.state, Pop3State::Authorization);

        // The pending user was cleared; PASS alone cannot succeed now.
        assert!(text(session.process_line("PASS password")).starts_with("-ERR"));
    }

    #[test]
    fn transaction_commands_require_authentication() {
        let (_dir, mut session, _store) = setup();
        assert!(text(session.process_line("STAT")).starts_with("-ERR"));
        assert!(text(session.process_line("RETR 1")).starts_with("-ERR"));
    }

    #[test]
    fn stat_counts_visible_messages_and_octets() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"12345").unwrap();
        store.save_email("dcd", "INBOX", b"1234567").unwrap();
        login(&mut session);

        assert_eq!(text(session.process_line("STAT")), "+OK 2 12\r\n");
    }

    #[test]
    fn list_and_uidl_are_dot_terminated() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"abc").unwrap();
        store.save_email("dcd", "INBOX", b"defgh").unwrap();
        login(&mut session);

        let listing = text(session.process_line("LIST"));
        assert!(listing.contains("1 3\r\n"));
        assert!(listing.contains("2 5\r\n"));
        assert!(listing.ends_with(".\r\n"));

        let uidl = text(session.process_line("UIDL"));
        assert!(uidl.contains("1 1\r\n"));
        assert!(uidl.contains("2 2\r\n"));
    }

    #[test]
    fn single_message_list_form() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"abc").unwrap();
        login(&mut session);

        assert_eq!(text(session.process_line("LIST 1")), "+OK 1 3\r\n");
        assert!(text(session.process_line("LIST 2")).starts_with("-ERR"));
        assert_eq!(text(session.process_line("UIDL 1")), "+OK 1 1\r\n");
    }

    #[test]
    fn retr_dot_stuffs_the_body() {
        let (_dir, mut session, store) = setup();
        store
            .save_email("dcd", "INBOX", b"Subject: hi\r\n\r\n.foo\r\nbar\r\n")
            .unwrap();
        login(&mut session);

        let reply = text(session.process_line("RETR 1"));
        assert!(reply.starts_with("+OK"));
        assert!(reply.contains("\r\n..foo\r\n"));
        assert!(reply.contains("\r\nbar\r\n"));
        assert!(reply.ends_with("\r\n.\r\n"));
    }

    #[test]
    fn dele_marks_and_hides_messages() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"one").unwrap();
        store.save_email("dcd", "INBOX", b"two").unwrap();
        login(&mut session);

        assert!(text(session.process_line("DELE 1")).starts_with("+OK"));
        assert!(store.is_deleted("dcd", "INBOX", 1).unwrap());

        // Indices renumber over the visible list; message 1 is now UID 2.
        assert_eq!(text(session.process_line("STAT")), "+OK 1 3\r\n");
        assert_eq!(text(session.process_line("UIDL 1")), "+OK 1 2\r\n");

        // Double deletion through the stale index answers -ERR.
        assert!(text(session.process_line("DELE 2")).starts_with("-ERR"));
    }

    #[test]
    fn rset_clears_every_mark() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"one").unwrap();
        store.save_email("dcd", "INBOX", b"two").unwrap();
        login(&mut session);
        session.process_line("DELE 1");
        session.process_line("DELE 1");

        assert!(text(session.process_line("RSET")).starts_with("+OK maildrop has 2"));
        assert!(!store.is_deleted("dcd", "INBOX", 1).unwrap());
        assert!(!store.is_deleted("dcd", "INBOX", 2).unwrap());
        assert_eq!(text(session.process_line("STAT")), "+OK 2 6\r\n");
    }

    #[test]
    fn quit_reaps_marked_messages() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"one").unwrap();
        store.save_email("dcd", "INBOX", b"two").unwrap();
        login(&mut session);
        session.process_line("DELE 1");

        let result = session.process_line("QUIT");
        assert!(result.should_close);
        assert_eq!(session.state, Pop3State::Update);

        let remaining = store.list_messages("dcd", "INBOX").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].uid, 2);
    }

    #[test]
    fn quit_before_login_just_closes() {
        let (_dir, mut session, _store) = setup();
        let result = session.process_line("QUIT");
        assert!(result.should_close);
        assert!(text(result).starts_with("+OK Bye"));
    }

    #[test]
    fn disconnect_without_quit_leaves_marks_in_place() {
        let (_dir, mut session, store) = setup();
        store.save_email("dcd", "INBOX", b"one").unwrap();
        login(&mut session);
        session.process_line("DELE 1");
        drop(session);

        // No UPDATE pass ran: the file survives with its mark.
        assert_eq!(store.list_messages("dcd", "INBOX").unwrap().len(), 1);
        assert!(store.is_deleted("dcd", "INBOX", 1).unwrap());
    }
}
