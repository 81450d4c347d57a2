// Store schema descriptor: one keyed table plus its secondary indexes, tagged with a version.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub key_path: String,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn index_position(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|index| index.name == name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub version: u32,
    pub table: TableSchema,
}

impl StoreSchema {
    pub fn new(version: u32, table: TableSchema) -> Self {
        Self { version, table }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.version == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("schema version must be positive"));
        }
        if self.table.name.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("table name is empty"));
        }
        if self.table.key_path.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("table key path is empty"));
        }
        let mut names = BTreeSet::new();
        for index in &self.table.indexes {
            if index.name.is_empty() || index.key_path.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("index name and key path must be non-empty"));
            }
            if !names.insert(index.name.as_str()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("duplicate index name: {}", index.name)));
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode schema")
                .with_source(err)
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("invalid schema descriptor")
                .with_source(err)
        })
    }
}
