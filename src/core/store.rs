// Store file creation/opening with schema upgrade, log replay, exclusive locking, and keyed writes.
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use libc::{EACCES, EPERM};
use memmap2::Mmap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::cursor::{Cursor, CursorSource, Direction};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, FRAME_HEADER_LEN, FrameHeader};
use crate::core::key::{IndexKey, KeyRange, extract_key};
use crate::core::schema::{IndexSchema, StoreSchema, TableSchema};

const MAGIC: [u8; 4] = *b"CTDB";
const FORMAT_VERSION: u32 = 1;
const ENDIANNESS_LE: u8 = 1;
pub const HEADER_SIZE: usize = 4096;
const SCHEMA_OFFSET: usize = 64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreHeader {
    pub schema: StoreSchema,
}

impl StoreHeader {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let schema = self.schema.encode()?;
        if SCHEMA_OFFSET + schema.len() > HEADER_SIZE {
            return Err(Error::new(ErrorKind::Usage).with_message("schema descriptor too large"));
        }
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8] = ENDIANNESS_LE;
        buf[12..16].copy_from_slice(&self.schema.version.to_le_bytes());
        buf[16..20].copy_from_slice(&(schema.len() as u32).to_le_bytes());
        buf[SCHEMA_OFFSET..SCHEMA_OFFSET + schema.len()].copy_from_slice(&schema);
        Ok(buf)
    }

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("header too small"));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::new(ErrorKind::Corrupt).with_message("bad magic"));
        }
        if read_u32(buf, 4) != FORMAT_VERSION {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unsupported format version"));
        }
        if buf[8] != ENDIANNESS_LE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unsupported endianness"));
        }
        let schema_version = read_u32(buf, 12);
        let schema_len = read_u32(buf, 16) as usize;
        if SCHEMA_OFFSET + schema_len > HEADER_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("schema length out of bounds"));
        }
        let schema = StoreSchema::decode(&buf[SCHEMA_OFFSET..SCHEMA_OFFSET + schema_len])?;
        if schema.version != schema_version {
            return Err(Error::new(ErrorKind::Corrupt).with_message("schema version mismatch"));
        }
        Ok(Self { schema })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Durability {
    #[default]
    Fast,
    Flush,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StoreOptions {
    pub durability: Durability,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

#[derive(Clone, Debug)]
pub struct StoreInfo {
    pub path: PathBuf,
    pub schema_version: u32,
    pub table: String,
    pub indexes: Vec<String>,
    pub record_count: u64,
    pub log_bytes: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WriteMode {
    Add,
    Put,
}

pub(crate) struct Index {
    schema: IndexSchema,
    pub(crate) entries: BTreeMap<IndexKey, BTreeSet<IndexKey>>,
}

impl Index {
    fn new(schema: IndexSchema) -> Self {
        Self {
            schema,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: IndexKey, primary_key: IndexKey) {
        self.entries.entry(key).or_default().insert(primary_key);
    }

    fn remove(&mut self, key: &IndexKey, primary_key: &IndexKey) {
        if let Some(keys) = self.entries.get_mut(key) {
            keys.remove(primary_key);
            if keys.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn conflicts(&self, key: &IndexKey, primary_key: &IndexKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|keys| keys.iter().any(|existing| existing != primary_key))
    }
}

pub(crate) struct Table {
    schema: TableSchema,
    pub(crate) records: BTreeMap<IndexKey, Value>,
    pub(crate) indexes: Vec<Index>,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        let indexes = schema.indexes.iter().cloned().map(Index::new).collect();
        Self {
            schema,
            records: BTreeMap::new(),
            indexes,
        }
    }

    fn primary_key(&self, value: &Value) -> Result<IndexKey, Error> {
        extract_key(value, &self.schema.key_path).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!(
                "record has no valid key at `{}`",
                self.schema.key_path
            ))
        })
    }

    fn check_write(&self, primary_key: &IndexKey, value: &Value, mode: WriteMode) -> Result<(), Error> {
        if mode == WriteMode::Add && self.records.contains_key(primary_key) {
            return Err(Error::new(ErrorKind::DuplicateKey)
                .with_message("record already exists")
                .with_key(primary_key.to_string()));
        }
        for index in self.indexes.iter().filter(|index| index.schema.unique) {
            let Some(key) = extract_key(value, &index.schema.key_path) else {
                continue;
            };
            if index.conflicts(&key, primary_key) {
                return Err(Error::new(ErrorKind::DuplicateKey)
                    .with_message(format!("unique index `{}` already holds key", index.schema.name))
                    .with_key(key.to_string()));
            }
        }
        Ok(())
    }

    fn apply_put(&mut self, primary_key: IndexKey, value: Value) {
        if let Some(previous) = self.records.remove(&primary_key) {
            for index in &mut self.indexes {
                if let Some(key) = extract_key(&previous, &index.schema.key_path) {
                    index.remove(&key, &primary_key);
                }
            }
        }
        for index in &mut self.indexes {
            if let Some(key) = extract_key(&value, &index.schema.key_path) {
                index.insert(key, primary_key.clone());
            }
        }
        self.records.insert(primary_key, value);
    }

    fn clear(&mut self) {
        self.records.clear();
        for index in &mut self.indexes {
            index.entries.clear();
        }
    }
}

pub(crate) struct StoreState {
    path: PathBuf,
    file: File,
    durability: Durability,
    log_end: u64,
    pub(crate) table: Table,
}

impl StoreState {
    fn open(path: &Path, schema: &StoreSchema, options: StoreOptions) -> Result<Self, Error> {
        schema.validate()?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| io_error(ErrorKind::StoreIo, parent, "failed to create store directory", err))?;
        }

        // The placeholder stays locked until the replacement is renamed over it, so a
        // concurrent opener sees a held lock on either inode.
        let (placeholder, header) = open_existing(path)?;
        let mut file = match header {
            None => {
                let file = create_fresh(path, schema)?;
                drop(placeholder);
                info!(path = %path.display(), version = schema.version, "created store");
                file
            }
            Some(header) => {
                let stored = header.schema.version;
                if stored < schema.version {
                    let file = create_fresh(path, schema)?;
                    drop(placeholder);
                    info!(
                        path = %path.display(),
                        from = stored,
                        to = schema.version,
                        "upgraded store schema; previous records were not carried over"
                    );
                    file
                } else if stored > schema.version {
                    return Err(Error::new(ErrorKind::StoreOpen)
                        .with_message(format!(
                            "store schema version {stored} is newer than requested version {}",
                            schema.version
                        ))
                        .with_path(path));
                } else if header.schema != *schema {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message("stored schema does not match the requested schema")
                        .with_path(path));
                } else {
                    placeholder
                }
            }
        };

        let mut table = Table::new(schema.table.clone());
        let log_end = replay(&mut file, path, &mut table)?;
        debug!(path = %path.display(), records = table.records.len(), "replayed store log");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            durability: options.durability,
            log_end,
            table,
        })
    }

    fn write(&mut self, value: Value, mode: WriteMode) -> Result<IndexKey, Error> {
        let primary_key = self.table.primary_key(&value)?;
        self.table.check_write(&primary_key, &value, mode)?;
        let payload = serde_json::to_vec(&value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode record")
                .with_source(err)
        })?;
        let frame = frame::encode_frame(&payload)?;
        self.append(&frame)?;
        self.table.apply_put(primary_key.clone(), value);
        Ok(primary_key)
    }

    fn append(&mut self, frame: &[u8]) -> Result<(), Error> {
        if let Err(err) = write_at(&mut self.file, self.log_end, frame, self.durability) {
            let _ = self.file.set_len(self.log_end);
            return Err(io_error(ErrorKind::StoreIo, &self.path, "failed to append record", err));
        }
        self.log_end += frame.len() as u64;
        Ok(())
    }

    fn clear(&mut self) -> Result<u64, Error> {
        let removed = self.table.records.len() as u64;
        let result = self.file.set_len(HEADER_SIZE as u64).and_then(|()| match self.durability {
            Durability::Flush => self.file.sync_data(),
            Durability::Fast => Ok(()),
        });
        result.map_err(|err| io_error(ErrorKind::StoreIo, &self.path, "failed to clear store", err))?;
        self.log_end = HEADER_SIZE as u64;
        self.table.clear();
        Ok(removed)
    }

    fn info(&self, schema: &StoreSchema) -> StoreInfo {
        StoreInfo {
            path: self.path.clone(),
            schema_version: schema.version,
            table: schema.table.name.clone(),
            indexes: schema.table.indexes.iter().map(|index| index.name.clone()).collect(),
            record_count: self.table.records.len() as u64,
            log_bytes: self.log_end.saturating_sub(HEADER_SIZE as u64),
        }
    }
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8], durability: Durability) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    match durability {
        Durability::Flush => file.sync_data(),
        Durability::Fast => Ok(()),
    }
}

/// A handle to an open store. Clones share the same file, lock, and in-memory indexes.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    schema: Arc<StoreSchema>,
    state: Arc<RwLock<StoreState>>,
}

impl Store {
    /// Opens the store at `path`, creating it on first use and recreating it when the
    /// stored schema version is older than `schema.version`.
    pub async fn open(
        path: impl AsRef<Path>,
        schema: StoreSchema,
        options: StoreOptions,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let open_schema = schema.clone();
        let state = run_blocking(move || StoreState::open(&open_path, &open_schema, options))
            .await
            .map_err(|err| open_error(&path, err))?;
        Ok(Self {
            path,
            schema: Arc::new(schema),
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    /// Inserts a new record; fails with `DuplicateKey` if its key is already present.
    pub async fn add(&self, value: Value) -> Result<IndexKey, Error> {
        let mut state = self.state.clone().write_owned().await;
        run_blocking(move || state.write(value, WriteMode::Add)).await
    }

    /// Inserts or replaces the record with the same key.
    pub async fn put(&self, value: Value) -> Result<IndexKey, Error> {
        let mut state = self.state.clone().write_owned().await;
        run_blocking(move || state.write(value, WriteMode::Put)).await
    }

    pub async fn get(&self, key: &IndexKey) -> Option<Value> {
        self.state.read().await.table.records.get(key).cloned()
    }

    pub async fn count(&self) -> u64 {
        self.state.read().await.table.records.len() as u64
    }

    /// Removes every record and returns how many were removed. Clearing an empty store succeeds.
    pub async fn clear(&self) -> Result<u64, Error> {
        let mut state = self.state.clone().write_owned().await;
        run_blocking(move || state.clear()).await
    }

    pub async fn info(&self) -> StoreInfo {
        self.state.read().await.info(&self.schema)
    }

    /// Opens a cursor over `index` (or the primary key when `None`). The cursor holds a
    /// read lock until dropped, so writes wait for it to finish.
    pub async fn open_cursor(
        &self,
        index: Option<&str>,
        range: KeyRange,
        direction: Direction,
    ) -> Result<Cursor, Error> {
        let source = match index {
            Some(name) => {
                let position = self.schema.table.index_position(name).ok_or_else(|| {
                    Error::new(ErrorKind::NotFound)
                        .with_message(format!("no index named `{name}`"))
                        .with_path(&self.path)
                })?;
                CursorSource::Index(position)
            }
            None => CursorSource::Primary,
        };
        let state = self.state.clone().read_owned().await;
        Ok(Cursor::new(state, source, range, direction))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("store task failed")
            .with_source(err)
    })?
}

fn open_error(path: &Path, err: Error) -> Error {
    if err.kind() == ErrorKind::StoreOpen {
        return err;
    }
    let hint = match err.kind() {
        ErrorKind::Busy => Some("Another process holds the store open. Retry once it exits."),
        ErrorKind::Permission => Some("Check permissions on the store directory."),
        ErrorKind::Corrupt => Some("The store file is damaged; clear it or point --store elsewhere."),
        _ => None,
    };
    let wrapped = Error::new(ErrorKind::StoreOpen)
        .with_message(format!("failed to open store: {}", err.message().unwrap_or("unknown cause")))
        .with_path(path);
    let wrapped = match hint {
        Some(hint) => wrapped.with_hint(hint),
        None => wrapped,
    };
    wrapped.with_source(err)
}

/// Opens (creating if absent) and locks the file at `path`. The header is `None` when the
/// file is empty.
fn open_existing(path: &Path) -> Result<(File, Option<StoreHeader>), Error> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| io_error(io_error_kind(&err), path, "failed to open store file", err))?;
    lock_file(&file, path)?;
    let meta = file
        .metadata()
        .map_err(|err| io_error(ErrorKind::StoreIo, path, "failed to stat store file", err))?;
    let current = std::fs::metadata(path)
        .map_err(|err| io_error(io_error_kind(&err), path, "failed to stat store file", err))?;
    if !same_file(&meta, &current) {
        return Err(Error::new(ErrorKind::Busy)
            .with_message("store file was replaced while opening")
            .with_path(path));
    }
    if meta.len() == 0 {
        return Ok((file, None));
    }
    let header = read_header(&mut file, path)?;
    Ok((file, Some(header)))
}

/// Writes a brand-new store beside `path` and renames it into place, so a failure leaves
/// either the previous file or nothing. The returned handle is locked before the rename.
fn create_fresh(path: &Path, schema: &StoreSchema) -> Result<File, Error> {
    let header = StoreHeader {
        schema: schema.clone(),
    }
    .encode()?;
    let tmp_path = temp_path_for(path);
    // Leftover from a crashed creator with the same pid; the store lock is held here.
    let _ = std::fs::remove_file(&tmp_path);
    let mut tmp = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|err| io_error(io_error_kind(&err), path, "failed to create store file", err))?;
    let result = lock_file(&tmp, &tmp_path).and_then(|()| {
        tmp.write_all(&header)
            .and_then(|()| tmp.sync_all())
            .and_then(|()| std::fs::rename(&tmp_path, path))
            .map_err(|err| io_error(io_error_kind(&err), path, "failed to create store file", err))
    });
    if let Err(err) = result {
        drop(tmp);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(tmp)
}

#[cfg(unix)]
fn same_file(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &std::fs::Metadata, _b: &std::fs::Metadata) -> bool {
    true
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

fn lock_file(file: &File, path: &Path) -> Result<(), Error> {
    FileExt::try_lock_exclusive(file).map_err(|err| {
        Error::new(lock_error_kind(&err))
            .with_message("store file is locked")
            .with_path(path)
            .with_source(err)
    })
}

fn read_header(file: &mut File, path: &Path) -> Result<StoreHeader, Error> {
    let mut buf = vec![0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))
        .map_err(|err| io_error(ErrorKind::StoreIo, path, "failed to read store header", err))?;
    file.read_exact(&mut buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::new(ErrorKind::Corrupt)
                .with_message("store file is shorter than its header")
                .with_path(path)
        } else {
            io_error(ErrorKind::StoreIo, path, "failed to read store header", err)
        }
    })?;
    StoreHeader::decode(&buf).map_err(|err| err.with_path(path))
}

/// Rebuilds `table` from the log and returns the offset where the next frame goes.
/// A torn final frame is cut off; damage anywhere earlier is reported as corruption.
fn replay(file: &mut File, path: &Path, table: &mut Table) -> Result<u64, Error> {
    let len = file
        .metadata()
        .map(|meta| meta.len())
        .map_err(|err| io_error(ErrorKind::StoreIo, path, "failed to stat store file", err))?;
    if len <= HEADER_SIZE as u64 {
        return Ok(HEADER_SIZE as u64);
    }

    let mmap = unsafe {
        Mmap::map(&*file).map_err(|err| io_error(ErrorKind::StoreIo, path, "failed to map store file", err))?
    };
    let end = mmap.len();
    let mut offset = HEADER_SIZE;
    let mut torn = false;

    while offset < end {
        if end - offset < FRAME_HEADER_LEN {
            torn = true;
            break;
        }
        let header = FrameHeader::decode(&mmap[offset..offset + FRAME_HEADER_LEN])
            .and_then(|header| header.validate().map(|()| header))
            .map_err(|err| corrupt_at(path, offset, err))?;
        let total = header.total_len();
        if offset + total > end {
            torn = true;
            break;
        }
        let payload_start = offset + FRAME_HEADER_LEN;
        let payload = &mmap[payload_start..payload_start + header.payload_len as usize];
        if !header.matches(payload) {
            if offset + total == end {
                torn = true;
                break;
            }
            return Err(corrupt_at(
                path,
                offset,
                Error::new(ErrorKind::Corrupt).with_message("checksum mismatch"),
            ));
        }
        let value: Value = serde_json::from_slice(payload).map_err(|err| {
            corrupt_at(
                path,
                offset,
                Error::new(ErrorKind::Corrupt)
                    .with_message("record is not valid json")
                    .with_source(err),
            )
        })?;
        let primary_key = table
            .primary_key(&value)
            .map_err(|err| corrupt_at(path, offset, err))?;
        table.apply_put(primary_key, value);
        offset += total;
    }
    drop(mmap);

    if torn {
        warn!(path = %path.display(), offset, "discarding torn record at end of store log");
        file.set_len(offset as u64)
            .map_err(|err| io_error(ErrorKind::StoreIo, path, "failed to truncate torn record", err))?;
    }
    Ok(offset as u64)
}

fn corrupt_at(path: &Path, offset: usize, cause: Error) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(format!("damaged log frame at offset {offset}"))
        .with_path(path)
        .with_source(cause)
}

fn io_error(kind: ErrorKind, path: &Path, message: &str, err: io::Error) -> Error {
    Error::new(kind)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::StoreIo,
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::StoreIo,
    }
}

#[cfg(test)]
mod tests {
    use super::{Durability, HEADER_SIZE, Store, StoreOptions};
    use crate::core::cursor::Direction;
    use crate::core::error::ErrorKind;
    use crate::core::key::{IndexKey, KeyRange};
    use crate::core::schema::{IndexSchema, StoreSchema, TableSchema};
    use serde_json::{Value, json};
    use std::error::Error as StdError;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    fn schema(version: u32) -> StoreSchema {
        StoreSchema::new(
            version,
            TableSchema::new("items", "id")
                .with_index(IndexSchema::new("byName", "name"))
                .with_index(IndexSchema::new("byCode", "code").unique(true)),
        )
    }

    async fn names(store: &Store, index: Option<&str>, direction: Direction) -> Vec<String> {
        let mut cursor = store
            .open_cursor(index, KeyRange::all(), direction)
            .await
            .expect("cursor");
        let mut out = Vec::new();
        while let Some(entry) = cursor.next().await.expect("next") {
            out.push(entry.value["name"].as_str().unwrap_or_default().to_string());
        }
        out
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.store");
        {
            let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("open");
            store.add(json!({"id": "a", "name": "Bravo"})).await.expect("add a");
            store.add(json!({"id": "b", "name": "Alpha"})).await.expect("add b");
        }
        let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("reopen");
        assert_eq!(store.count().await, 2);
        assert_eq!(names(&store, Some("byName"), Direction::Next).await, ["Alpha", "Bravo"]);
    }

    #[tokio::test]
    async fn add_refuses_duplicate_keys_and_keeps_original() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        store.add(json!({"id": "a", "name": "first"})).await.expect("add");
        let err = store
            .add(json!({"id": "a", "name": "second"}))
            .await
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.key(), Some("a"));
        let kept = store.get(&IndexKey::from("a")).await.expect("record");
        assert_eq!(kept["name"], "first");
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn put_replaces_index_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("open");
        store.put(json!({"id": "a", "name": "Zulu"})).await.expect("put");
        store.put(json!({"id": "b", "name": "Mike"})).await.expect("put");
        store.put(json!({"id": "a", "name": "Alpha"})).await.expect("replace");
        assert_eq!(store.count().await, 2);
        assert_eq!(names(&store, Some("byName"), Direction::Next).await, ["Alpha", "Mike"]);
        drop(store);

        let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("reopen");
        assert_eq!(names(&store, Some("byName"), Direction::Next).await, ["Alpha", "Mike"]);
    }

    #[tokio::test]
    async fn unique_index_rejects_second_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        store.add(json!({"id": "a", "code": "X1"})).await.expect("add");
        let err = store
            .add(json!({"id": "b", "code": "X1"}))
            .await
            .expect_err("unique");
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        store.put(json!({"id": "a", "code": "X1", "name": "same owner"})).await.expect("same owner");
    }

    #[tokio::test]
    async fn records_without_index_values_are_skipped_by_that_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        store.add(json!({"id": "a", "name": null})).await.expect("add");
        store.add(json!({"id": "b", "name": "Bee"})).await.expect("add");
        assert_eq!(names(&store, Some("byName"), Direction::Next).await, ["Bee"]);
        assert_eq!(names(&store, None, Direction::Next).await.len(), 2);
    }

    #[tokio::test]
    async fn record_without_primary_key_is_a_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        let err = store.add(json!({"name": "nobody"})).await.expect_err("no key");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_persistent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        let options = StoreOptions::new().with_durability(Durability::Flush);
        let store = Store::open(&path, schema(1), options).await.expect("open");
        store.add(json!({"id": "a"})).await.expect("add");
        assert_eq!(store.clear().await.expect("clear"), 1);
        assert_eq!(store.clear().await.expect("clear again"), 0);
        assert_eq!(store.count().await, 0);
        store.add(json!({"id": "a"})).await.expect("re-add after clear");
        drop(store);

        let store = Store::open(&path, schema(1), options).await.expect("reopen");
        assert_eq!(store.count().await, 1);
        assert!(std::fs::metadata(&path).expect("meta").len() > HEADER_SIZE as u64);
    }

    #[tokio::test]
    async fn older_schema_is_recreated_and_newer_schema_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        {
            let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("v1");
            store.add(json!({"id": "old"})).await.expect("add");
        }
        {
            let store = Store::open(&path, schema(2), StoreOptions::new()).await.expect("v2");
            assert_eq!(store.count().await, 0);
            assert_eq!(store.info().await.schema_version, 2);
        }
        let err = match Store::open(&path, schema(1), StoreOptions::new()).await {
            Ok(_) => panic!("expected newer schema to be refused"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::StoreOpen);
    }

    #[tokio::test]
    async fn second_handle_is_refused_while_locked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        let _store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("open");
        let err = match Store::open(&path, schema(1), StoreOptions::new()).await {
            Ok(_) => panic!("expected lock conflict"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::StoreOpen);
        let cause = err
            .source()
            .and_then(|source| source.downcast_ref::<crate::core::error::Error>())
            .expect("cause");
        assert_eq!(cause.kind(), ErrorKind::Busy);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creators_leave_one_locked_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        let opens: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                tokio::spawn(async move { Store::open(&path, schema(1), StoreOptions::new()).await })
            })
            .collect();
        let mut winners = Vec::new();
        for open in opens {
            match open.await.expect("join") {
                Ok(store) => winners.push(store),
                Err(err) => assert_eq!(err.kind(), ErrorKind::StoreOpen),
            }
        }
        assert_eq!(winners.len(), 1);
        winners[0].add(json!({"id": "kept"})).await.expect("add");
        drop(winners);

        let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("reopen");
        assert_eq!(store.count().await, 1);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_header_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(&path)
            .expect("create");
        file.set_len(HEADER_SIZE as u64).expect("len");
        file.write_all(b"NOPE").expect("write");
        file.flush().expect("flush");
        drop(file);

        let err = match Store::open(&path, schema(1), StoreOptions::new()).await {
            Ok(_) => panic!("expected corrupt header error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::StoreOpen);
    }

    #[tokio::test]
    async fn torn_tail_is_discarded_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        {
            let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("open");
            store.add(json!({"id": "a", "name": "kept"})).await.expect("add a");
            store.add(json!({"id": "b", "name": "torn"})).await.expect("add b");
        }
        let len = std::fs::metadata(&path).expect("meta").len();
        let file = OpenOptions::new().write(true).open(&path).expect("open file");
        file.set_len(len - 5).expect("truncate");
        drop(file);

        let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("reopen");
        assert_eq!(store.count().await, 1);
        assert!(store.get(&IndexKey::from("a")).await.is_some());
        store.add(json!({"id": "b", "name": "again"})).await.expect("append after repair");
    }

    #[tokio::test]
    async fn damaged_frame_before_tail_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.store");
        {
            let store = Store::open(&path, schema(1), StoreOptions::new()).await.expect("open");
            store.add(json!({"id": "a", "name": "one"})).await.expect("add a");
            store.add(json!({"id": "b", "name": "two"})).await.expect("add b");
        }
        let mut file = OpenOptions::new().write(true).open(&path).expect("open file");
        file.seek(SeekFrom::Start(HEADER_SIZE as u64 + 40)).expect("seek");
        file.write_all(b"#").expect("flip payload byte");
        drop(file);

        let err = match Store::open(&path, schema(1), StoreOptions::new()).await {
            Ok(_) => panic!("expected corruption"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::StoreOpen);
    }

    #[tokio::test]
    async fn cursor_walks_both_directions_with_stable_ties() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        for (id, name) in [("c", "Same"), ("a", "Same"), ("b", "Other")] {
            store.add(json!({"id": id, "name": name})).await.expect("add");
        }
        let mut cursor = store
            .open_cursor(Some("byName"), KeyRange::all(), Direction::Next)
            .await
            .expect("cursor");
        let mut ids = Vec::new();
        while let Some(entry) = cursor.next().await.expect("next") {
            ids.push(entry.primary_key.to_string());
        }
        assert_eq!(ids, ["b", "a", "c"]);
        drop(cursor);

        let reversed: Vec<Value> = {
            let mut cursor = store
                .open_cursor(Some("byName"), KeyRange::all(), Direction::Prev)
                .await
                .expect("cursor");
            let mut out = Vec::new();
            while let Some(entry) = cursor.next().await.expect("next") {
                out.push(entry.value["id"].clone());
            }
            out
        };
        assert_eq!(reversed, [json!("c"), json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn unknown_index_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("s.store"), schema(1), StoreOptions::new())
            .await
            .expect("open");
        let err = match store.open_cursor(Some("nope"), KeyRange::all(), Direction::Next).await {
            Ok(_) => panic!("expected missing index"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
