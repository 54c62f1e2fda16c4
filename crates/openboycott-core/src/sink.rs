use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::record::CompanyRecord;

/// Output document: one JSON object keyed by canonical company name.
///
/// Entries already present are kept unless a record with the same key replaces them. Entries
/// are stored as raw JSON so records written by older versions survive untouched.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; a missing file is an empty document.
    pub fn load_existing(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        let document: Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
        match document {
            Value::Object(entries) => Ok(entries),
            _ => bail!("{} does not contain a JSON object", self.path.display()),
        }
    }

    /// Insert or replace one record.
    pub fn upsert(&self, key: &str, record: &CompanyRecord) -> Result<()> {
        let mut document = self.load_existing()?;
        document.insert(key.to_string(), serde_json::to_value(record)?);
        self.write(&document)
    }

    /// Insert or replace every record of a batch in one write.
    pub fn merge(&self, batch: &BTreeMap<String, CompanyRecord>) -> Result<()> {
        let mut document = self.load_existing()?;
        for (key, record) in batch {
            document.insert(key.clone(), serde_json::to_value(record)?);
        }
        self.write(&document)
    }

    fn write(&self, document: &Map<String, Value>) -> Result<()> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        let body = serde_json::to_string_pretty(document)?;
        fs::write(&staging, body)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = document.len(), "output written");
        Ok(())
    }
}
