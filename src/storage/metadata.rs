use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::config::METADATA_FILE;

/// Persistent per-folder metadata: the UID high-water mark, a stable folder
/// identity, the subscription bit, and the per-message flag sets.
///
/// On-disk format (UTF-8, LF-separated):
///
/// ```text
/// LAST_UID=<int>
/// FOLDER_UID=<opaque string>
/// [SUBSCRIBED]
/// <uid>=<flag>|<flag>|...
/// ```
///
/// Every mutation rewrites the whole file through a temp file + rename so a
/// crash mid-write cannot lose `LAST_UID`. Callers hold the owning user's
/// write lock across any mutating call.
#[derive(Debug)]
pub struct FolderMetadata {
    path: PathBuf,
    last_uid: u32,
    folder_uid: String,
    subscribed: bool,
    flags: BTreeMap<u32, BTreeSet<String>>,
}

impl FolderMetadata {
    /// Load an existing metadata record without creating one.
    ///
    /// Returns `Ok(None)` when the file is absent or malformed; a malformed
    /// record is logged and treated as missing, so the folder restarts from
    /// `LAST_UID=0` with an empty flag map.
    pub fn load(folder_dir: &Path) -> io::Result<Option<Self>> {
        let path = folder_dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        match Self::parse(&text) {
            Some(mut meta) => {
                meta.path = path;
                Ok(Some(meta))
            }
            None => {
                warn!(path = %path.display(), "unreadable folder metadata, starting over");
                Ok(None)
            }
        }
    }

    /// Load the metadata record of a folder, creating it if absent.
    pub fn open(folder_dir: &Path) -> io::Result<Self> {
        if let Some(meta) = Self::load(folder_dir)? {
            return Ok(meta);
        }

        fs::create_dir_all(folder_dir)?;
        let meta = Self {
            path: folder_dir.join(METADATA_FILE),
            last_uid: 0,
            folder_uid: fresh_folder_uid(),
            subscribed: true,
            flags: BTreeMap::new(),
        };
        meta.persist()?;
        Ok(meta)
    }

    /// Parse the textual record. `None` means the record is malformed and
    /// the caller should start from scratch.
    fn parse(text: &str) -> Option<Self> {
        let mut last_uid = None;
        let mut folder_uid = None;
        let mut subscribed = false;
        let mut flags = BTreeMap::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some(value) = line.strip_prefix("LAST_UID=") {
                last_uid = Some(value.parse().ok()?);
            } else if let Some(value) = line.strip_prefix("FOLDER_UID=") {
                folder_uid = Some(value.to_string());
            } else if line == "[SUBSCRIBED]" {
                subscribed = true;
            } else {
                let (uid, list) = line.split_once('=')?;
                let uid: u32 = uid.parse().ok()?;
                let set: BTreeSet<String> = list
                    .split('|')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
                flags.insert(uid, set);
            }
        }

        Some(Self {
            path: PathBuf::new(),
            last_uid: last_uid?,
            folder_uid: folder_uid?,
            subscribed,
            flags,
        })
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("LAST_UID={}\n", self.last_uid));
        out.push_str(&format!("FOLDER_UID={}\n", self.folder_uid));
        if self.subscribed {
            out.push_str("[SUBSCRIBED]\n");
        }
        for (uid, set) in &self.flags {
            let list: Vec<&str> = set.iter().map(String::as_str).collect();
            out.push_str(&format!("{}={}\n", uid, list.join("|")));
        }
        out
    }

    /// Rewrite the record atomically.
    fn persist(&self) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, self.render())?;
        fs::rename(&tmp, &self.path)
    }

    /// Highest UID ever allocated in this folder. Never decreases.
    pub fn last_uid(&self) -> u32 {
        self.last_uid
    }

    /// Stable opaque identity of this folder, generated once at creation.
    pub fn folder_uid(&self) -> &str {
        &self.folder_uid
    }

    /// Allocate the next UID and persist the new high-water mark.
    pub fn allocate_uid(&mut self) -> io::Result<u32> {
        self.last_uid += 1;
        self.persist()?;
        Ok(self.last_uid)
    }

    /// The flag set recorded for a message, empty if none.
    pub fn flags(&self, uid: u32) -> BTreeSet<String> {
        self.flags.get(&uid).cloned().unwrap_or_default()
    }

    /// Replace the whole flag set of a message.
    pub fn set_flags(&mut self, uid: u32, flags: BTreeSet<String>) -> io::Result<()> {
        self.flags.insert(uid, flags);
        self.persist()
    }

    /// Add or remove a single flag.
    pub fn update_flag(&mut self, uid: u32, flag: &str, add: bool) -> io::Result<()> {
        let set = self.flags.entry(uid).or_default();
        if add {
            set.insert(flag.to_string());
        } else {
            set.remove(flag);
        }
        self.persist()
    }

    /// Drop a message's entry entirely (after its file is deleted).
    pub fn remove_uid(&mut self, uid: u32) -> io::Result<()> {
        self.flags.remove(&uid);
        self.persist()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn set_subscribed(&mut self, subscribed: bool) -> io::Result<()> {
        self.subscribed = subscribed;
        self.persist()
    }
}

fn fresh_folder_uid() -> String {
    Uuid::new_v4().simple().to_string()
}
