//! Purpose: Contact-shaped facade over the generic store: fixed schema, typed records.
//! Exports: `ContactStore`, `ContactCursor`, `contact_schema`, schema name constants.
//! Role: The only place that knows the contact table layout and index names.
//! Invariants: Records are keyed by `id`; `scan_ordered` walks `orderString` ascending.
//! Invariants: Opening with an older stored schema recreates the table empty.
use std::path::Path;

use serde_json::Value;

use crate::contact::ContactRecord;
use crate::core::cursor::{Cursor, Direction};
use crate::core::error::{Error, ErrorKind};
use crate::core::key::{IndexKey, KeyRange};
use crate::core::schema::{IndexSchema, StoreSchema, TableSchema};
use crate::core::store::{Store, StoreInfo, StoreOptions};

pub const SCHEMA_VERSION: u32 = 2;
pub const TABLE_NAME: &str = "list";
pub const ORDER_INDEX: &str = "orderString";
pub const GIVEN_NAME_INDEX: &str = "displayNameGiven";
pub const FAMILY_NAME_INDEX: &str = "displayNameFamily";
pub const ORG_INDEX: &str = "org";

pub fn contact_schema() -> StoreSchema {
    StoreSchema::new(
        SCHEMA_VERSION,
        TableSchema::new(TABLE_NAME, "id")
            .with_index(IndexSchema::new(ORDER_INDEX, "sortKey"))
            .with_index(IndexSchema::new(GIVEN_NAME_INDEX, "displayName.givenName"))
            .with_index(IndexSchema::new(FAMILY_NAME_INDEX, "displayName.familyName"))
            .with_index(IndexSchema::new(ORG_INDEX, "org")),
    )
}

#[derive(Clone)]
pub struct ContactStore {
    store: Store,
}

impl ContactStore {
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, Error> {
        let store = Store::open(path, contact_schema(), options).await?;
        Ok(Self { store })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Adds a new contact. A record with the same id fails with `DuplicateKey`.
    pub async fn insert(&self, record: &ContactRecord) -> Result<(), Error> {
        self.store.add(encode(record)?).await.map(|_| ())
    }

    /// Adds or replaces the contact with the same id.
    pub async fn put(&self, record: &ContactRecord) -> Result<(), Error> {
        self.store.put(encode(record)?).await.map(|_| ())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ContactRecord>, Error> {
        match self.store.get(&IndexKey::from(id)).await {
            Some(value) => decode(value).map(Some),
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> u64 {
        self.store.count().await
    }

    /// Removes every contact; returns how many were removed.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.store.clear().await
    }

    /// Walks every contact in ascending sort-key order, ties broken by id.
    pub async fn scan_ordered(&self) -> Result<ContactCursor, Error> {
        let cursor = self
            .store
            .open_cursor(Some(ORDER_INDEX), KeyRange::lower_bound(0.0, false), Direction::Next)
            .await?;
        Ok(ContactCursor { inner: cursor })
    }

    pub async fn info(&self) -> StoreInfo {
        self.store.info().await
    }
}

/// Ordered traversal yielding typed contacts. Holds the store's read lock until dropped.
pub struct ContactCursor {
    inner: Cursor,
}

impl ContactCursor {
    pub async fn next(&mut self) -> Result<Option<ContactRecord>, Error> {
        match self.inner.next().await? {
            Some(entry) => decode(entry.value).map(Some),
            None => Ok(None),
        }
    }
}

fn encode(record: &ContactRecord) -> Result<Value, Error> {
    serde_json::to_value(record).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode contact")
            .with_key(record.id.clone())
            .with_source(err)
    })
}

fn decode(value: Value) -> Result<ContactRecord, Error> {
    serde_json::from_value(value).map_err(|err| {
        Error::new(ErrorKind::StoreIo)
            .with_message("stored record is not a contact")
            .with_source(err)
    })
}
