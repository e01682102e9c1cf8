use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::locks::{self, LockManager};
use crate::storage::metadata::FolderMetadata;
use crate::storage::{DELETED, RECENT, SEEN};

/// One message in a folder listing: its UID, file path and size in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    pub uid: u32,
    pub path: PathBuf,
    pub size: u64,
}

/// A folder visible to IMAP LIST.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderInfo {
    /// Path-like name with `/` as the hierarchy separator.
    pub name: String,
    pub has_children: bool,
}

/// The shared on-disk mailbox store.
///
/// Layout: `<root>/<user>/<folder>/<UID>.eml` with one `.metadata` record
/// per folder. All operations serialize through the per-user lock manager:
/// reads take the shared lock, mutations the exclusive one. Different users
/// never contend.
#[derive(Debug)]
pub struct MailStore {
    root: PathBuf,
    locks: LockManager,
}

impl MailStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: LockManager::new(),
        }
    }

    /// Root directory of one user's mail, created on first touch.
    pub fn user_dir(&self, username: &str) -> Result<PathBuf> {
        let dir = self.root.join(username);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Resolve and validate a folder name into its on-disk directory.
    ///
    /// `INBOX` matches case-insensitively; every other name is exact. Names
    /// nest with `/`; empty or dot components are refused.
    fn folder_dir(&self, username: &str, folder: &str) -> Result<PathBuf> {
        Ok(self.root.join(username).join(normalize_folder(folder)?))
    }

    // ---- Message operations -------------------------------------------------

    /// Deliver a message into a folder, allocating its UID.
    ///
    /// Creates the folder (and its metadata) if missing, writes `<UID>.eml`
    /// and records `\Recent`. Returns the allocated UID.
    pub fn save_email(&self, username: &str, folder: &str, content: &[u8]) -> Result<u32> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        let mut meta = FolderMetadata::open(&dir)?;
        let uid = meta.allocate_uid()?;

        fs::write(dir.join(format!("{uid}.eml")), content)?;
        meta.update_flag(uid, RECENT, true)?;

        debug!(user = username, folder, uid, size = content.len(), "message stored");
        Ok(uid)
    }

    /// List a folder's messages sorted ascending by UID.
    pub fn list_messages(&self, username: &str, folder: &str) -> Result<Vec<MessageEntry>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let dir = self.folder_dir(username, folder)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "eml") {
                continue;
            }
            let Some(uid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            entries.push(MessageEntry {
                uid,
                size: entry.metadata()?.len(),
                path,
            });
        }

        entries.sort_by_key(|e| e.uid);
        Ok(entries)
    }

    /// Path of one message file, if present.
    pub fn message_file(&self, username: &str, folder: &str, uid: u32) -> Result<Option<PathBuf>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let path = self.folder_dir(username, folder)?.join(format!("{uid}.eml"));
        Ok(path.is_file().then_some(path))
    }

    /// Read a message's raw bytes under the user's read lock.
    pub fn read_message(&self, username: &str, path: &Path) -> Result<Vec<u8>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);
        Ok(fs::read(path)?)
    }

    /// The stored timestamp of a message file, used as IMAP INTERNALDATE.
    pub fn message_date(&self, username: &str, path: &Path) -> Result<DateTime<Utc>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);
        let modified = fs::metadata(path)?.modified()?;
        Ok(modified.into())
    }

    /// Copy a message file into a destination folder under a caller-chosen
    /// UID (freshly allocated via [`MailStore::next_uid`]). The copy is
    /// marked `\Seen`.
    pub fn copy_message(
        &self,
        username: &str,
        src: &Path,
        dest_folder: &str,
        dest_uid: u32,
    ) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, dest_folder)?;
        fs::create_dir_all(&dir)?;
        fs::copy(src, dir.join(format!("{dest_uid}.eml")))?;

        let mut meta = FolderMetadata::open(&dir)?;
        meta.update_flag(dest_uid, SEEN, true)?;
        Ok(())
    }

    /// Delete a message file and drop its metadata entry.
    pub fn delete_message(&self, username: &str, folder: &str, uid: u32) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        let path = dir.join(format!("{uid}.eml"));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(mut meta) = FolderMetadata::load(&dir)? {
            meta.remove_uid(uid)?;
        }
        Ok(())
    }

    // ---- Folder operations --------------------------------------------------

    pub fn folder_exists(&self, username: &str, folder: &str) -> Result<bool> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);
        Ok(self.folder_dir(username, folder)?.is_dir())
    }

    /// Create a folder with fresh metadata. Fails if it already exists.
    pub fn create_folder(&self, username: &str, folder: &str) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        if dir.exists() {
            return Err(Error::Storage(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("folder {folder} already exists"),
            )));
        }
        fs::create_dir_all(&dir)?;
        FolderMetadata::open(&dir)?;
        Ok(())
    }

    /// Delete a folder and everything beneath it. INBOX is refused.
    pub fn delete_folder(&self, username: &str, folder: &str) -> Result<()> {
        if folder.eq_ignore_ascii_case("INBOX") {
            return Err(Error::BadState("INBOX cannot be deleted"));
        }
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        if !dir.is_dir() {
            return Err(Error::Storage(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such folder {folder}"),
            )));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Atomically rename a folder. INBOX cannot be renamed and the target
    /// must not already exist.
    pub fn rename_folder(&self, username: &str, old: &str, new: &str) -> Result<()> {
        if old.eq_ignore_ascii_case("INBOX") {
            return Err(Error::BadState("INBOX cannot be renamed"));
        }
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let old_dir = self.folder_dir(username, old)?;
        let new_dir = self.folder_dir(username, new)?;
        if !old_dir.is_dir() || new_dir.exists() {
            return Err(Error::Storage(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot rename {old} to {new}"),
            )));
        }
        if let Some(parent) = new_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&old_dir, &new_dir)?;
        Ok(())
    }

    /// All folders of a user, sorted alphabetically, INBOX always present.
    pub fn list_folders(&self, username: &str) -> Result<Vec<FolderInfo>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let root = self.root.join(username);
        let mut folders = Vec::new();
        if root.is_dir() {
            collect_folders(&root, "", &mut folders)?;
        }
        if !folders.iter().any(|f| f.name == "INBOX") {
            folders.push(FolderInfo {
                name: "INBOX".to_string(),
                has_children: false,
            });
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    // ---- Metadata operations ------------------------------------------------

    /// The flag set of a message, empty when unknown.
    pub fn get_flags(&self, username: &str, folder: &str, uid: u32) -> Result<BTreeSet<String>> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let dir = self.folder_dir(username, folder)?;
        Ok(FolderMetadata::load(&dir)?
            .map(|meta| meta.flags(uid))
            .unwrap_or_default())
    }

    /// Replace the whole flag set of a message.
    pub fn set_flags(
        &self,
        username: &str,
        folder: &str,
        uid: u32,
        flags: BTreeSet<String>,
    ) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        FolderMetadata::open(&dir)?.set_flags(uid, flags)?;
        Ok(())
    }

    /// Add or remove one flag on a message.
    pub fn update_flag(
        &self,
        username: &str,
        folder: &str,
        uid: u32,
        flag: &str,
        add: bool,
    ) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        FolderMetadata::open(&dir)?.update_flag(uid, flag, add)?;
        Ok(())
    }

    /// Whether a message carries `\Deleted`.
    pub fn is_deleted(&self, username: &str, folder: &str, uid: u32) -> Result<bool> {
        Ok(self.get_flags(username, folder, uid)?.contains(DELETED))
    }

    /// Allocate the next UID of a folder, creating it if needed.
    pub fn next_uid(&self, username: &str, folder: &str) -> Result<u32> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        Ok(FolderMetadata::open(&dir)?.allocate_uid()?)
    }

    /// The folder's persistent UID high-water mark.
    pub fn last_uid(&self, username: &str, folder: &str) -> Result<u32> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let dir = self.folder_dir(username, folder)?;
        Ok(FolderMetadata::load(&dir)?
            .map(|meta| meta.last_uid())
            .unwrap_or(0))
    }

    /// The folder's stable opaque identity, creating metadata if needed.
    pub fn folder_uid(&self, username: &str, folder: &str) -> Result<String> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        Ok(FolderMetadata::open(&dir)?.folder_uid().to_string())
    }

    pub fn is_subscribed(&self, username: &str, folder: &str) -> Result<bool> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::read(&lock);

        let dir = self.folder_dir(username, folder)?;
        Ok(FolderMetadata::load(&dir)?
            .map(|meta| meta.is_subscribed())
            .unwrap_or(true))
    }

    pub fn set_subscribed(&self, username: &str, folder: &str, subscribed: bool) -> Result<()> {
        let lock = self.locks.user_lock(username);
        let _guard = locks::write(&lock);

        let dir = self.folder_dir(username, folder)?;
        FolderMetadata::open(&dir)?.set_subscribed(subscribed)?;
        Ok(())
    }
}

/// Validate a folder name and normalize the reserved INBOX spelling.
fn normalize_folder(folder: &str) -> Result<PathBuf> {
    if folder.eq_ignore_ascii_case("INBOX") {
        return Ok(PathBuf::from("INBOX"));
    }
    if folder.is_empty() {
        return Err(Error::Syntax("empty folder name".to_string()));
    }
    let mut path = PathBuf::new();
    for part in folder.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return Err(Error::Syntax(format!("invalid folder name {folder}")));
        }
        path.push(part);
    }
    Ok(path)
}

fn collect_folders(dir: &Path, prefix: &str, out: &mut Vec<FolderInfo>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let full = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        let sub_start = out.len();
        collect_folders(&entry.path(), &full, out)?;
        let has_children = out.len() > sub_start;
        out.push(FolderInfo {
            name: full,
            has_children,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MailStore) {
        let dir = TempDir::new().unwrap();
        let store = MailStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_allocates_sequential_uids() {
        let (_dir, store) = store();
        let first = store.save_email("dcd", "INBOX", b"Subject: a\r\n\r\none\r\n").unwrap();
        let second = store.save_email("dcd", "INBOX", b"Subject: b\r\n\r\ntwo\r\n").unwrap();
        assert_eq!((first, second), (1, 2));

        let listed = store.list_messages("dcd", "INBOX").unwrap();
        assert_eq!(listed.iter().map(|m| m.uid).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn saved_message_is_marked_recent() {
        let (_dir, store) = store();
        let uid = store.save_email("dcd", "INBOX", b"x").unwrap();
        assert!(store.get_flags("dcd", "INBOX", uid).unwrap().contains(RECENT));
    }

    #[test]
    fn inbox_is_case_insensitive() {
        let (_dir, store) = store();
        store.save_email("dcd", "INBOX", b"x").unwrap();
        assert_eq!(store.list_messages("dcd", "inbox").unwrap().len(), 1);
        assert!(store.folder_exists("dcd", "Inbox").unwrap());
    }

    #[test]
    fn uids_are_not_reused_after_deletion() {
        let (_dir, store) = store();
        let uid = store.save_email("dcd", "INBOX", b"x").unwrap();
        store.delete_message("dcd", "INBOX", uid).unwrap();
        let next = store.save_email("dcd", "INBOX", b"y").unwrap();
        assert!(next > uid);
    }

    #[test]
    fn delete_folder_refuses_inbox() {
        let (_dir, store) = store();
        store.save_email("dcd", "INBOX", b"x").unwrap();
        assert!(store.delete_folder("dcd", "inbox").is_err());
        assert!(store.folder_exists("dcd", "INBOX").unwrap());
    }

    #[test]
    fn create_then_delete_folder() {
        let (_dir, store) = store();
        store.create_folder("dcd", "Archive/2026").unwrap();
        assert!(store.folder_exists("dcd", "Archive/2026").unwrap());
        assert!(store.create_folder("dcd", "Archive/2026").is_err());

        store.delete_folder("dcd", "Archive/2026").unwrap();
        assert!(!store.folder_exists("dcd", "Archive/2026").unwrap());
    }

    #[test]
    fn rename_refuses_existing_target() {
        let (_dir, store) = store();
        store.create_folder("dcd", "Old").unwrap();
        store.create_folder("dcd", "New").unwrap();
        assert!(store.rename_folder("dcd", "Old", "New").is_err());

        store.delete_folder("dcd", "New").unwrap();
        store.rename_folder("dcd", "Old", "New").unwrap();
        assert!(store.folder_exists("dcd", "New").unwrap());
        assert!(!store.folder_exists("dcd", "Old").unwrap());
    }

    #[test]
    fn folder_names_cannot_escape_the_user_root() {
        let (_dir, store) = store();
        assert!(store.create_folder("dcd", "../evil").is_err());
        assert!(store.create_folder("dcd", "a//b").is_err());
    }

    #[test]
    fn copy_assigns_new_identity_and_seen_flag() {
        let (_dir, store) = store();
        let uid = store.save_email("dcd", "INBOX", b"hello").unwrap();
        let src = store.message_file("dcd", "INBOX", uid).unwrap().unwrap();

        let dest_uid = store.next_uid("dcd", "Trash").unwrap();
        store.copy_message("dcd", &src, "Trash", dest_uid).unwrap();

        let copies = store.list_messages("dcd", "Trash").unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].uid, dest_uid);
        assert!(store.get_flags("dcd", "Trash", dest_uid).unwrap().contains(SEEN));
        // Source untouched.
        assert_eq!(store.list_messages("dcd", "INBOX").unwrap().len(), 1);
    }

    #[test]
    fn list_folders_reports_hierarchy_attributes() {
        let (_dir, store) = store();
        store.save_email("dcd", "INBOX", b"x").unwrap();
        store.create_folder("dcd", "Archive").unwrap();
        store.create_folder("dcd", "Archive/2026").unwrap();

        let folders = store.list_folders("dcd").unwrap();
        let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Archive", "Archive/2026", "INBOX"]);

        let archive = folders.iter().find(|f| f.name == "Archive").unwrap();
        assert!(archive.has_children);
        let leaf = folders.iter().find(|f| f.name == "Archive/2026").unwrap();
        assert!(!leaf.has_children);
    }

    #[test]
    fn list_folders_always_includes_inbox() {
        let (_dir, store) = store();
        store.user_dir("dcd").unwrap();
        let folders = store.list_folders("dcd").unwrap();
        assert!(folders.iter().any(|f| f.name == "INBOX"));
    }

    #[test]
    fn subscription_defaults_on_and_round_trips() {
        let (_dir, store) = store();
        store.create_folder("dcd", "Lists").unwrap();
        assert!(store.is_subscribed("dcd", "Lists").unwrap());
        store.set_subscribed("dcd", "Lists", false).unwrap();
        assert!(!store.is_subscribed("dcd", "Lists").unwrap());
    }
}
