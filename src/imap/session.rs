use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::command::{FetchItems, ImapCommand, UidSet};
use super::envelope::envelope;
use super::response::{self, CAPABILITIES};
use crate::config::ServerConfig;
use crate::storage::{MailStore, MessageEntry, DELETED, SEEN};

/// IMAP session states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImapState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

/// Outcome of feeding one line to the session.
#[derive(Debug, Default)]
pub struct ImapResult {
    pub response: Vec<u8>,
    pub should_close: bool,
}

impl ImapResult {
    fn text(response: String) -> Self {
        Self {
            response: response.into_bytes(),
            should_close: false,
        }
    }
}

/// IMAP session state machine for one connection.
///
/// Sans-IO like the other engines: the handler feeds complete lines and
/// writes back the returned bytes, which may mix text replies with raw
/// message literals. Mailbox access goes through the shared store, whose
/// per-user locks serialize against concurrent SMTP and POP3 activity; the
/// selected-folder message cache is connection-local and keeps the
/// MSN-to-UID mapping stable between refresh points.
pub struct ImapSession {
    pub state: ImapState,
    config: Arc<ServerConfig>,
    store: Arc<MailStore>,
    username: Option<String>,
    selected: Option<String>,
    messages: Vec<MessageEntry>,
}

impl ImapSession {
    pub fn new(config: Arc<ServerConfig>, store: Arc<MailStore>) -> Self {
        Self {
            state: ImapState::NotAuthenticated,
            config,
            store,
            username: None,
            selected: None,
            messages: Vec::new(),
        }
    }

    pub fn greeting(&self) -> Vec<u8> {
        response::greeting(&self.config.domain).into_bytes()
    }

    /// Process one line (without its CRLF).
    pub fn process_line(&mut self, line: &str) -> ImapResult {
        let Some(cmd) = ImapCommand::parse(line) else {
            if line.trim().is_empty() {
                return ImapResult::default();
            }
            return ImapResult::text(response::untagged("BAD Invalid command"));
        };

        debug!(tag = %cmd.tag, verb = %cmd.name, "imap command");
        match cmd.name.as_str() {
            "CAPABILITY" => self.cmd_capability(&cmd),
            "NOOP" => self.cmd_noop(&cmd),
            "LOGIN" => self.cmd_login(&cmd),
            "LOGOUT" => self.cmd_logout(&cmd),
            "LIST" => self.cmd_list(&cmd, false),
            "LSUB" => self.cmd_list(&cmd, true),
            "CREATE" => self.cmd_create(&cmd),
            "DELETE" => self.cmd_delete(&cmd),
            "RENAME" => self.cmd_rename(&cmd),
            "SUBSCRIBE" => self.cmd_subscribe(&cmd, true),
            "UNSUBSCRIBE" => self.cmd_subscribe(&cmd, false),
            "SELECT" => self.cmd_select(&cmd),
            "UID" => self.cmd_uid(&cmd),
            "EXPUNGE" => self.cmd_expunge(&cmd),
            "CLOSE" => self.cmd_close(&cmd),
            _ => ImapResult::text(response::bad(&cmd.tag, "Command not supported")),
        }
    }

    /// The authenticated bare username; only call past the auth check.
    fn user(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    fn require_auth(&self, tag: &str) -> Option<ImapResult> {
        if self.username.is_none() {
            return Some(ImapResult::text(response::no(tag, "Login first")));
        }
        None
    }

    fn require_selected(&self, tag: &str) -> Option<ImapResult> {
        if self.state != ImapState::Selected {
            return Some(ImapResult::text(response::no(tag, "Select mailbox first")));
        }
        None
    }

    // ---- Any-state commands -------------------------------------------------

    fn cmd_capability(&self, cmd: &ImapCommand) -> ImapResult {
        let mut out = response::untagged(&format!("CAPABILITY {CAPABILITIES}"));
        out.push_str(&response::ok(&cmd.tag, "CAPABILITY completed"));
        ImapResult::text(out)
    }

    fn cmd_noop(&mut self, cmd: &ImapCommand) -> ImapResult {
        let mut out = String::new();

        if self.state == ImapState::Selected {
            let folder = self.selected.clone().unwrap_or_default();
            match self.store.list_messages(self.user(), &folder) {
                Ok(fresh) if fresh.len() > self.messages.len() => {
                    let recent = fresh.len() - self.messages.len();
                    out.push_str(&response::untagged(&format!("{} EXISTS", fresh.len())));
                    out.push_str(&response::untagged(&format!("{recent} RECENT")));
                    self.messages = fresh;
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "NOOP refresh failed"),
            }
        }

        out.push_str(&response::ok(&cmd.tag, "NOOP completed"));
        ImapResult::text(out)
    }

    fn cmd_login(&mut self, cmd: &ImapCommand) -> ImapResult {
        if self.state != ImapState::NotAuthenticated {
            return ImapResult::text(response::bad(&cmd.tag, "Already authenticated"));
        }
        if cmd.args.len() < 2 {
            return ImapResult::text(response::bad(&cmd.tag, "Missing username or password"));
        }

        match self.config.authenticate(&cmd.args[0], &cmd.args[1]) {
            Some(username) => {
                self.username = Some(username);
                self.state = ImapState::Authenticated;
                ImapResult::text(response::ok(&cmd.tag, "LOGIN completed"))
            }
            None => {
                self.username = None;
                ImapResult::text(response::no(
                    &cmd.tag,
                    "[AUTHENTICATIONFAILED] Invalid credentials",
                ))
            }
        }
    }

    fn cmd_logout(&mut self, cmd: &ImapCommand) -> ImapResult {
        self.state = ImapState::Logout;
        let mut out = response::bye("Server logging out");
        out.push_str(&response::ok(&cmd.tag, "LOGOUT completed"));
        ImapResult {
            response: out.into_bytes(),
            should_close: true,
        }
    }

    // ---- Authenticated-state commands ---------------------------------------

    fn cmd_list(&mut self, cmd: &ImapCommand, subscribed_only: bool) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }

        let reference = cmd.args.first().map(String::as_str).unwrap_or("");
        let pattern = cmd.args.get(1).map(String::as_str).unwrap_or("");
        let verb = if subscribed_only { "LSUB" } else { "LIST" };

        // The canonical hierarchy-delimiter probe.
        if reference.is_empty() && pattern.is_empty() {
            let mut out = response::untagged("LIST (\\Noselect) \"/\" \"\"");
            out.push_str(&response::ok(&cmd.tag, &format!("{verb} completed")));
            return ImapResult::text(out);
        }

        let folders = match self.store.list_folders(self.user()) {
            Ok(folders) => folders,
            Err(err) => {
                warn!(%err, "LIST walk failed");
                return ImapResult::text(response::no(&cmd.tag, "Cannot list folders"));
            }
        };

        let mut out = String::new();
        for folder in folders {
            if !matches_pattern(pattern.as_bytes(), folder.name.as_bytes()) {
                continue;
            }
            if subscribed_only
                && !self
                    .store
                    .is_subscribed(self.user(), &folder.name)
                    .unwrap_or(false)
            {
                continue;
            }
            out.push_str(&response::list_line(verb, folder.has_children, &folder.name));
        }
        out.push_str(&response::ok(&cmd.tag, &format!("{verb} completed")));
        ImapResult::text(out)
    }

    fn cmd_create(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }
        let Some(folder) = cmd.args.first() else {
            return ImapResult::text(response::bad(&cmd.tag, "Missing folder name"));
        };
        match self.store.create_folder(self.user(), folder) {
            Ok(()) => ImapResult::text(response::ok(&cmd.tag, "CREATE completed")),
            Err(err) => {
                debug!(%err, %folder, "CREATE refused");
                ImapResult::text(response::no(&cmd.tag, "Create failed"))
            }
        }
    }

    fn cmd_delete(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }
        let Some(folder) = cmd.args.first() else {
            return ImapResult::text(response::bad(&cmd.tag, "Missing folder name"));
        };
        if folder.eq_ignore_ascii_case("INBOX") {
            return ImapResult::text(response::no(&cmd.tag, "Cannot delete INBOX"));
        }
        match self.store.delete_folder(self.user(), folder) {
            Ok(()) => ImapResult::text(response::ok(&cmd.tag, "DELETE completed")),
            Err(err) => {
                debug!(%err, %folder, "DELETE refused");
                ImapResult::text(response::no(&cmd.tag, "Delete failed"))
            }
        }
    }

    fn cmd_rename(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }
        if cmd.args.len() < 2 {
            return ImapResult::text(response::bad(&cmd.tag, "Missing folder names"));
        }
        match self
            .store
            .rename_folder(self.user(), &cmd.args[0], &cmd.args[1])
        {
            Ok(()) => ImapResult::text(response::ok(&cmd.tag, "RENAME completed")),
            Err(err) => {
                debug!(%err, "RENAME refused");
                ImapResult::text(response::no(&cmd.tag, "Rename failed"))
            }
        }
    }

    fn cmd_subscribe(&mut self, cmd: &ImapCommand, subscribed: bool) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }
        let Some(folder) = cmd.args.first() else {
            return ImapResult::text(response::bad(&cmd.tag, "Missing folder name"));
        };
        let verb = if subscribed { "SUBSCRIBE" } else { "UNSUBSCRIBE" };
        match self.store.set_subscribed(self.user(), folder, subscribed) {
            Ok(()) => ImapResult::text(response::ok(&cmd.tag, &format!("{verb} completed"))),
            Err(err) => {
                debug!(%err, %folder, "subscription change refused");
                ImapResult::text(response::no(&cmd.tag, &format!("{verb} failed")))
            }
        }
    }

    fn cmd_select(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_auth(&cmd.tag) {
            return denied;
        }
        let Some(mailbox) = cmd.args.first() else {
            return ImapResult::text(response::bad(&cmd.tag, "Missing mailbox name"));
        };

        let name = if mailbox.eq_ignore_ascii_case("INBOX") {
            "INBOX".to_string()
        } else {
            match self.store.folder_exists(self.user(), mailbox) {
                Ok(true) => mailbox.clone(),
                _ => {
                    return ImapResult::text(response::no(&cmd.tag, "Mailbox does not exist"));
                }
            }
        };

        let messages = match self.store.list_messages(self.user(), &name) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(%err, mailbox = %name, "SELECT failed");
                return ImapResult::text(response::no(&cmd.tag, "Cannot open mailbox"));
            }
        };

        let uidnext = match messages.last() {
            Some(last) => last.uid + 1,
            None => self.store.last_uid(self.user(), &name).map(|u| u + 1).unwrap_or(1),
        };

        let mut out = response::select_block(messages.len(), uidnext);
        out.push_str(&response::ok(&cmd.tag, "[READ-WRITE] SELECT completed"));

        self.messages = messages;
        self.selected = Some(name);
        self.state = ImapState::Selected;
        ImapResult::text(out)
    }

    // ---- Selected-state commands --------------------------------------------

    fn cmd_uid(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_selected(&cmd.tag) {
            return denied;
        }
        let Some(sub) = cmd.args.first() else {
            return ImapResult::text(response::bad(&cmd.tag, "Missing UID subcommand"));
        };

        match sub.to_uppercase().as_str() {
            "FETCH" if cmd.args.len() >= 3 => {
                let set = cmd.args[1].clone();
                let items = cmd.args[2..].join(" ");
                self.uid_fetch(&cmd.tag, &set, &items)
            }
            "STORE" if cmd.args.len() >= 4 => {
                let set = cmd.args[1].clone();
                let mode = cmd.args[2].clone();
                let flags = cmd.args[3..].join(" ");
                self.uid_store(&cmd.tag, &set, &mode, &flags)
            }
            "COPY" if cmd.args.len() >= 3 => {
                let set = cmd.args[1].clone();
                let dest = cmd.args[2].clone();
                self.uid_copy(&cmd.tag, &set, &dest)
            }
            "FETCH" | "STORE" | "COPY" => {
                ImapResult::text(response::bad(&cmd.tag, "Missing arguments"))
            }
            _ => ImapResult::text(response::bad(&cmd.tag, "Unknown UID command")),
        }
    }

    fn max_uid(&self) -> u32 {
        self.messages.last().map(|m| m.uid).unwrap_or(0)
    }

    fn uid_fetch(&mut self, tag: &str, set: &str, items: &str) -> ImapResult {
        let Some(set) = UidSet::parse(set) else {
            return ImapResult::text(response::bad(tag, "Invalid UID set"));
        };
        let items = FetchItems::parse(items);
        let folder = self.selected.clone().unwrap_or_default();
        let user = self.user().to_string();
        let max = self.max_uid();

        let mut out: Vec<u8> = Vec::new();
        let mut failures = 0usize;

        for (index, entry) in self.messages.iter().enumerate() {
            let msn = index + 1;
            if !set.contains(entry.uid, max) {
                continue;
            }

            match self.fetch_parts(&user, &folder, entry, &items) {
                Ok(parts) => {
                    out.extend_from_slice(format!("* {msn} FETCH (UID {}", entry.uid).as_bytes());
                    for part in parts {
                        out.push(b' ');
                        out.extend_from_slice(&part);
                    }
                    out.extend_from_slice(b")\r\n");
                }
                Err(err) => {
                    warn!(%err, uid = entry.uid, "FETCH failed for message");
                    failures += 1;
                }
            }
        }

        let tagged = if failures == 0 {
            response::ok(tag, "UID FETCH completed")
        } else {
            response::no(tag, "UID FETCH completed with errors")
        };
        out.extend_from_slice(tagged.as_bytes());
        ImapResult {
            response: out,
            should_close: false,
        }
    }

    /// Render the requested data items of one message. Byte-valued because
    /// BODY sections carry raw literals.
    fn fetch_parts(
        &self,
        user: &str,
        folder: &str,
        entry: &MessageEntry,
        items: &FetchItems,
    ) -> crate::error::Result<Vec<Vec<u8>>> {
        let mut parts: Vec<Vec<u8>> = Vec::new();

        if items.flags {
            let flags = self.store.get_flags(user, folder, entry.uid)?;
            let rendered = response::flag_list(flags.iter().map(String::as_str));
            parts.push(format!("FLAGS {rendered}").into_bytes());
        }
        if items.rfc822_size {
            parts.push(format!("RFC822.SIZE {}", entry.size).into_bytes());
        }
        if items.internal_date {
            let date = self.store.message_date(user, &entry.path)?;
            let formatted = date.format("%d-%b-%Y %H:%M:%S +0000");
            parts.push(format!("INTERNALDATE \"{formatted}\"").into_bytes());
        }

        let needs_content =
            items.envelope || items.body_structure || !items.body_sections.is_empty();
        if !needs_content {
            return Ok(parts);
        }

        let content = self.store.read_message(user, &entry.path)?;

        if items.envelope {
            let headers = header_block(&content);
            let env = envelope(&String::from_utf8_lossy(headers));
            parts.push(format!("ENVELOPE {env}").into_bytes());
        }
        if items.body_structure {
            let body = text_block(&content);
            let lines = body.iter().filter(|&&b| b == b'\n').count();
            parts.push(
                format!(
                    "BODYSTRUCTURE {}",
                    response::body_structure(entry.size, lines)
                )
                .into_bytes(),
            );
        }

        for section in &items.body_sections {
            let data = body_section(&content, &section.section);
            let mut rendered =
                format!("BODY[{}] {{{}}}\r\n", section.section, data.len()).into_bytes();
            rendered.extend_from_slice(&data);
            parts.push(rendered);

            if !section.peek {
                let flags = self.store.get_flags(user, folder, entry.uid)?;
                if !flags.contains(SEEN) {
                    self.store.update_flag(user, folder, entry.uid, SEEN, true)?;
                }
            }
        }

        Ok(parts)
    }

    fn uid_store(&mut self, tag: &str, set: &str, mode: &str, flags: &str) -> ImapResult {
        let Some(set) = UidSet::parse(set) else {
            return ImapResult::text(response::bad(tag, "Invalid UID set"));
        };

        let mode_upper = mode.to_uppercase();
        let silent = mode_upper.ends_with(".SILENT");
        let base = mode_upper.trim_end_matches(".SILENT");
        let requested: Vec<String> = flags
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let apply = match base {
            "+FLAGS" => FlagMode::Add,
            "-FLAGS" => FlagMode::Remove,
            "FLAGS" => FlagMode::Replace,
            _ => return ImapResult::text(response::bad(tag, "Invalid STORE mode")),
        };

        let folder = self.selected.clone().unwrap_or_default();
        let user = self.user().to_string();
        let max = self.max_uid();

        let mut out = String::new();
        let mut failures = 0usize;

        for (index, entry) in self.messages.iter().enumerate() {
            if !set.contains(entry.uid, max) {
                continue;
            }

            let result = self
                .store
                .get_flags(&user, &folder, entry.uid)
                .and_then(|mut current| {
                    match apply {
                        FlagMode::Add => current.extend(requested.iter().cloned()),
                        FlagMode::Remove => {
                            for flag in &requested {
                                current.remove(flag);
                            }
                        }
                        FlagMode::Replace => {
                            current = requested.iter().cloned().collect::<BTreeSet<_>>();
                        }
                    }
                    self.store
                        .set_flags(&user, &folder, entry.uid, current.clone())?;
                    Ok(current)
                });

            match result {
                Ok(current) if !silent => {
                    let rendered = response::flag_list(current.iter().map(String::as_str));
                    out.push_str(&response::fetch_line(
                        index + 1,
                        &format!("UID {} FLAGS {rendered}", entry.uid),
                    ));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, uid = entry.uid, "STORE failed for message");
                    failures += 1;
                }
            }
        }

        let tagged = if failures == 0 {
            response::ok(tag, "UID STORE completed")
        } else {
            response::no(tag, "UID STORE completed with errors")
        };
        out.push_str(&tagged);
        ImapResult::text(out)
    }

    fn uid_copy(&mut self, tag: &str, set: &str, dest: &str) -> ImapResult {
        let Some(set) = UidSet::parse(set) else {
            return ImapResult::text(response::bad(tag, "Invalid UID set"));
        };

        let user = self.user().to_string();
        if !dest.eq_ignore_ascii_case("INBOX")
            && !self.store.folder_exists(&user, dest).unwrap_or(false)
        {
            return ImapResult::text(response::no(tag, "Mailbox does not exist"));
        }

        let max = self.max_uid();
        let mut src_uids = Vec::new();
        let mut dest_uids = Vec::new();

        for entry in self.messages.iter().filter(|e| set.contains(e.uid, max)) {
            let copied = self.store.next_uid(&user, dest).and_then(|dest_uid| {
                self.store
                    .copy_message(&user, &entry.path, dest, dest_uid)?;
                Ok(dest_uid)
            });
            match copied {
                Ok(dest_uid) => {
                    src_uids.push(entry.uid);
                    dest_uids.push(dest_uid);
                }
                Err(err) => {
                    warn!(%err, uid = entry.uid, "COPY failed for message");
                    return ImapResult::text(response::no(tag, "Copy failed"));
                }
            }
        }

        if src_uids.is_empty() {
            return ImapResult::text(response::ok(tag, "COPY completed"));
        }
        ImapResult::text(response::ok(
            tag,
            &format!(
                "[COPYUID 1 {} {}] COPY completed",
                uid_list(&src_uids),
                uid_list(&dest_uids)
            ),
        ))
    }

    fn cmd_expunge(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_selected(&cmd.tag) {
            return denied;
        }

        let (out, failures) = self.expunge_deleted(true);
        let tagged = if failures == 0 {
            response::ok(&cmd.tag, "EXPUNGE completed")
        } else {
            response::no(&cmd.tag, "EXPUNGE completed with errors")
        };
        ImapResult::text(out + &tagged)
    }

    fn cmd_close(&mut self, cmd: &ImapCommand) -> ImapResult {
        if let Some(denied) = self.require_selected(&cmd.tag) {
            return denied;
        }

        let (_, failures) = self.expunge_deleted(false);
        if failures > 0 {
            warn!(failures, "CLOSE left messages behind");
        }
        self.selected = None;
        self.messages.clear();
        self.state = ImapState::Authenticated;

        ImapResult {
            response: response::ok(&cmd.tag, "CLOSE completed").into_bytes(),
            should_close: true,
        }
    }

    /// Remove every `\Deleted` message from the selected folder.
    ///
    /// The counter tracks the live message-sequence number over the
    /// shrinking list: surviving messages advance it, removed ones are
    /// announced at the position they vacated.
    fn expunge_deleted(&mut self, emit: bool) -> (String, usize) {
        let folder = self.selected.clone().unwrap_or_default();
        let user = self.user().to_string();

        let mut out = String::new();
        let mut failures = 0usize;
        let mut counter = 1usize;
        let mut kept = Vec::new();

        for entry in std::mem::take(&mut self.messages) {
            let deleted = self
                .store
                .get_flags(&user, &folder, entry.uid)
                .map(|flags| flags.contains(DELETED))
                .unwrap_or(false);

            if !deleted {
                kept.push(entry);
                counter += 1;
                continue;
            }

            match self.store.delete_message(&user, &folder, entry.uid) {
                Ok(()) => {
                    if emit {
                        out.push_str(&response::expunge_line(counter));
                    }
                }
                Err(err) => {
                    warn!(%err, uid = entry.uid, "expunge failed for message");
                    failures += 1;
                    kept.push(entry);
                    counter += 1;
                }
            }
        }

        self.messages = kept;
        (out, failures)
    }
}

enum FlagMode {
    Add,
    Remove,
    Replace,
}

fn uid_list(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// The header block of a message: everything before the first blank line.
fn header_block(content: &[u8]) -> &[u8] {
    find_blank_line(content)
        .map(|pos| &content[..pos])
        .unwrap_or(content)
}

/// The body block: everything after the first blank line.
fn text_block(content: &[u8]) -> &[u8] {
    find_blank_line(content)
        .map(|pos| {
            let skip = if content[pos..].starts_with(b"\r\n\r\n") { 4 } else { 2 };
            &content[pos + skip..]
        })
        .unwrap_or(b"")
}

/// Extract one BODY section.
pub fn body_section(content: &[u8], section: &str) -> Vec<u8> {
    match section.to_uppercase().as_str() {
        "" => content.to_vec(),
        "HEADER" => {
            // The delimiting blank line belongs to the header block.
            match find_blank_line(content) {
                Some(pos) => {
                    let skip = if content[pos..].starts_with(b"\r\n\r\n") { 4 } else { 2 };
                    content[..pos + skip].to_vec()
                }
                None => content.to_vec(),
            }
        }
        "TEXT" => text_block(content).to_vec(),
        _ => content.to_vec(),
    }
}

fn find_blank_line(content: &[u8]) -> Option<usize> {
    content
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .or_else(|| content.windows(2).position(|w| w == b"\n\n"))
}

/// IMAP mailbox wildcard matching: `*` spans anything, `%` stops at the
/// hierarchy separator.
fn matches_pattern(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((b'*', rest)) => (0..=name.len()).any(|i| matches_pattern(rest, &name[i..])),
        Some((b'%', rest)) => {
            let limit = name
                .iter()
                .position(|&c| c == b'/')
                .unwrap_or(name.len());
            (0..=limit).any(|i| matches_pattern(rest, &name[i..]))
        }
        Some((&c, rest)) => name.first() == Some(&c) && matches_pattern(rest, &name[1..]),
    }
}
