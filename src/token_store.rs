//! Credential persistence: the access/refresh token pair.
//!
//! DESIGN
//! ======
//! A plain key/value pass-through under two fixed keys. Contents are never
//! validated here. `FileTokenStore` mirrors the slots in memory and writes
//! the whole map to disk on every change so a session survives a restart.
//! The file is owner-only and replaced atomically. Disk failures are logged
//! and never surface to callers, matching the browser-storage semantics the
//! pipeline expects.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Storage key for this slot.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Access => "accessToken",
            Self::Refresh => "refreshToken",
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;
    fn set(&self, kind: TokenKind, value: &str);
    fn clear(&self);
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slots: Mutex<BTreeMap<TokenKind, String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with both tokens.
    #[must_use]
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let store = Self::new();
        store.set(TokenKind::Access, access);
        store.set(TokenKind::Refresh, refresh);
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn set(&self, kind: TokenKind, value: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, value.to_owned());
    }

    fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON file of `{ "accessToken": ..., "refreshToken": ... }`.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading any previously persisted tokens.
    /// A missing or unreadable file starts an empty session.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slots = load(&path);
        Self { path, slots: Mutex::new(slots) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, slots: &BTreeMap<String, String>) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, path = %parent.display(), "token store directory create failed");
                return;
            }
        }
        let json = match serde_json::to_string_pretty(slots) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "token store encode failed");
                return;
            }
        };
        if let Err(e) = write_private(&self.path, json.as_bytes()) {
            warn!(error = %e, path = %self.path.display(), "token store write failed");
        }
    }
}

/// Write `contents` to a sibling temp file readable only by the owner, then
/// rename it over `path` so readers never observe a partial file.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    // Mode only applies on create; drop any leftover from an earlier crash.
    match std::fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}

fn load(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "token store read failed; starting empty");
            return BTreeMap::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, path = %path.display(), "token store file malformed; starting empty");
        BTreeMap::new()
    })
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind.key())
            .cloned()
    }

    fn set(&self, kind: TokenKind, value: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(kind.key().to_owned(), value.to_owned());
        self.persist(&slots);
    }

    fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "token store remove failed"),
        }
    }
}

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;
