// src/registry/store.rs

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::record::Record;
use crate::types::Key;

const FORMAT_VERSION: u32 = 1;

/// On-disk document: the record table keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "format_version")]
    pub version: u32,
    #[serde(default)]
    pub records: BTreeMap<u32, Record>,
}

fn format_version() -> u32 {
    FORMAT_VERSION
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            records: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Read the store; a missing or empty file is an empty table.
    pub fn load(path: &Path) -> Result<Document> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Document::default());
        }
        let doc: Document = serde_json::from_str(&contents)?;
        Ok(doc)
    }

    /// Replace the store file atomically (write sibling, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);

        let bytes = serde_json::to_vec_pretty(self)?;
        {
            let mut file = File::create(tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, path)?;

        debug!(path = ?path, records = self.records.len(), "store written");
        Ok(())
    }

    /// `max(id) + 1`, or `1` for an empty table.
    pub fn next_id(&self) -> u32 {
        self.records
            .keys()
            .next_back()
            .map_or(1, |max| max.saturating_add(1))
    }

    pub fn id_of_name(&self, name: &str) -> Option<u32> {
        self.records
            .values()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn id_of(&self, key: &Key) -> Option<u32> {
        match key {
            Key::Id(id) => self.records.contains_key(id).then_some(*id),
            Key::Name(name) => self.id_of_name(name),
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.id_of(key).and_then(|id| self.records.get(&id))
    }
}
