// src/registry/mod.rs

//! Durable, shared record store.
//!
//! The registry is the only state shared between warden processes (daemon,
//! reconciler, short-lived control invocations). Each public method takes the
//! whole-store lock for its full duration, reads the JSON document, and
//! writes it back only when the operation succeeded, so readers never observe
//! a partial write and writers never interleave.
//!
//! Concurrent writers to the same id serialize on the lock with
//! last-write-wins semantics at whole-record granularity.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::{ConfigFile, RegistrySettings, StorePaths};
use crate::errors::{Result, WardenError};
use crate::record::{Record, RecordDefaults, RecordSpec};
use crate::types::{Key, Selector, Target};

pub mod lock;
pub mod store;

pub use lock::{LockGuard, StoreLock};
pub use store::Document;

/// How a target was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Id,
    Name,
    Selector(Selector),
}

/// Result of [`Registry::resolve`]. An empty `records` is "not found".
#[derive(Debug, Clone)]
pub struct Resolution {
    pub kind: MatchKind,
    pub target: Target,
    pub records: Vec<Record>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Selector matches are reported per record plus a summary.
    pub fn is_batch(&self) -> bool {
        matches!(self.kind, MatchKind::Selector(_))
    }
}

impl Selector {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Selector::All => !record.is_hidden(),
            Selector::Everything => true,
            Selector::HiddenOnly => record.is_hidden(),
            Selector::AutorunOnly => !record.is_hidden() && record.autorun,
            Selector::AutorunEnabled => !record.is_hidden() && record.autorun_enabled(),
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    store_path: PathBuf,
    lock: StoreLock,
}

impl Registry {
    pub fn open(paths: &StorePaths, settings: &RegistrySettings) -> Result<Self> {
        for path in [&paths.store, &paths.lock] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            store_path: paths.store.clone(),
            lock: StoreLock::new(&paths.lock, settings),
        })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::open(&cfg.paths, &cfg.registry)
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> Result<T> {
        let _guard = self.lock.acquire()?;
        let doc = Document::load(&self.store_path)?;
        Ok(f(&doc))
    }

    /// Run `f` on the document and persist it if `f` succeeded.
    fn write<T>(&self, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        let _guard = self.lock.acquire()?;
        let mut doc = Document::load(&self.store_path)?;
        let out = f(&mut doc)?;
        doc.save(&self.store_path)?;
        Ok(out)
    }

    /// `max(id) + 1`, or `1` when empty.
    ///
    /// The lock is released on return. Use [`Registry::insert`] to allocate
    /// and insert atomically.
    pub fn next_id(&self) -> Result<u32> {
        self.read(Document::next_id)
    }

    pub fn exists(&self, key: &Key) -> Result<bool> {
        self.read(|doc| doc.id_of(key).is_some())
    }

    pub fn get(&self, key: &Key) -> Result<Option<Record>> {
        self.read(|doc| doc.get(key).cloned())
    }

    /// Every record, hidden included, ordered by id.
    pub fn all(&self) -> Result<Vec<Record>> {
        self.read(|doc| doc.records.values().cloned().collect())
    }

    /// Delete a record; returns what was removed.
    pub fn remove(&self, key: &Key) -> Result<Option<Record>> {
        self.write(|doc| {
            let removed = doc.id_of(key).and_then(|id| doc.records.remove(&id));
            if let Some(record) = &removed {
                info!(id = record.id, name = %record.name, "record removed");
            }
            Ok(removed)
        })
    }

    /// Replace the stored record with the same id. `false` if there is none.
    pub fn update(&self, record: &Record) -> Result<bool> {
        self.write(|doc| match doc.records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                debug!(id = record.id, name = %record.name, pid = ?record.pid, "record updated");
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Create a record from `spec`.
    ///
    /// - A missing id gets `max(id) + 1`, allocated under the same lock as
    ///   the insert.
    /// - `overwrite` with an existing id deletes that record first.
    /// - A name already taken by another record is suffixed with `_<id>`.
    /// - Remaining collisions are `IdExists` / `NameExists`.
    pub fn insert(
        &self,
        spec: RecordSpec,
        defaults: &RecordDefaults,
        overwrite: bool,
    ) -> Result<Record> {
        self.write(|doc| {
            let id = spec.requested_id().unwrap_or_else(|| doc.next_id());

            if overwrite {
                if let Some(old) = doc.records.remove(&id) {
                    debug!(id, name = %old.name, "overwriting record");
                }
            }

            let mut record = Record::normalize(spec.clone(), id, defaults)?;
            if doc.id_of_name(&record.name).is_some() {
                let suffixed = format!("{}_{}", record.name, id);
                debug!(id, from = %record.name, to = %suffixed, "name taken; suffixing with id");
                let mut spec = spec;
                spec.name = Some(suffixed);
                record = Record::normalize(spec, id, defaults)?;
            }

            if doc.records.contains_key(&id) {
                return Err(WardenError::IdExists(id));
            }
            if doc.id_of_name(&record.name).is_some() {
                return Err(WardenError::NameExists(record.name));
            }

            doc.records.insert(id, record.clone());
            info!(id, name = %record.name, cmd = %record.command, "record created");
            Ok(record)
        })
    }

    /// Rename a record, keeping names unique.
    pub fn rename(&self, key: &Key, new_name: &str) -> Result<Record> {
        self.write(|doc| {
            let id = doc
                .id_of(key)
                .ok_or_else(|| WardenError::NotFound(key.to_string()))?;
            let Some(mut record) = doc.records.get(&id).cloned() else {
                return Err(WardenError::NotFound(key.to_string()));
            };

            record.rename(new_name)?;
            if doc.id_of_name(&record.name).is_some_and(|other| other != id) {
                return Err(WardenError::NameExists(record.name));
            }

            doc.records.insert(id, record.clone());
            Ok(record)
        })
    }

    /// Resolve an id, a name or a selector to the matching records.
    pub fn resolve(&self, target: &Target) -> Result<Resolution> {
        self.read(|doc| {
            let (kind, records): (MatchKind, Vec<Record>) = match target {
                Target::Key(key) => {
                    let kind = match key {
                        Key::Id(_) => MatchKind::Id,
                        Key::Name(_) => MatchKind::Name,
                    };
                    (kind, doc.get(key).cloned().into_iter().collect())
                }
                Target::Selector(selector) => (
                    MatchKind::Selector(*selector),
                    doc.records
                        .values()
                        .filter(|r| selector.matches(r))
                        .cloned()
                        .collect(),
                ),
            };

            Resolution {
                kind,
                target: target.clone(),
                records,
            }
        })
    }

    /// [`Registry::resolve`] for a raw target string.
    pub fn resolve_str(&self, target: &str) -> Result<Resolution> {
        let target = Target::from_str(target).map_err(WardenError::Validation)?;
        self.resolve(&target)
    }
}
