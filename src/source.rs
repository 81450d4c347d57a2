//! Purpose: Enumerate contacts from a directory as an async, pull-based stream.
//! Exports: `SortField`, `SortOrder`, `SortHint`, `ContactSource`, `ContactDirectory`,
//! `MemoryDirectory`, `MemorySource`, `JsonFileDirectory`, `JsonFileSource`.
//! Role: Input side of the migration; isolates file parsing and ordering hints from the store.
//! Invariants: Each contact is yielded at most once per enumeration.
//! Invariants: The first error ends the stream; later calls return `Ok(None)`.
//! Invariants: File parsing runs off the async workers behind a bounded channel.
use std::fs::File;
use std::future::Future;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::contact::RawContact;
use crate::core::error::{Error, ErrorKind};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const MAX_SNIPPET_BYTES: usize = 80;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SortField {
    #[default]
    GivenName,
    FamilyName,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Ordering requested from the directory. Advisory: the store re-sorts by sort key anyway.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SortHint {
    pub by: Option<SortField>,
    pub order: SortOrder,
}

impl Default for SortHint {
    fn default() -> Self {
        Self {
            by: Some(SortField::GivenName),
            order: SortOrder::Ascending,
        }
    }
}

/// One enumeration in progress. `Ok(None)` means the directory is exhausted.
pub trait ContactSource: Send {
    fn next_contact(&mut self) -> impl Future<Output = Result<Option<RawContact>, Error>> + Send;
}

pub trait ContactDirectory: Send + Sync {
    type Source: ContactSource;

    /// Starts a fresh enumeration. Must be called from within a tokio runtime.
    fn enumerate(&self, hint: SortHint) -> Result<Self::Source, Error>;
}

/// In-memory directory; honors the sort hint. Optionally fails after a fixed number of
/// contacts, which is how enumeration failures are simulated.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    contacts: Vec<RawContact>,
    fail_after: Option<usize>,
}

impl MemoryDirectory {
    pub fn new(contacts: Vec<RawContact>) -> Self {
        Self {
            contacts,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, delivered: usize) -> Self {
        self.fail_after = Some(delivered);
        self
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

impl ContactDirectory for MemoryDirectory {
    type Source = MemorySource;

    fn enumerate(&self, hint: SortHint) -> Result<MemorySource, Error> {
        let mut contacts = self.contacts.clone();
        if let Some(field) = hint.by {
            contacts.sort_by(|a, b| hint_value(a, field).cmp(hint_value(b, field)));
            if hint.order == SortOrder::Descending {
                contacts.reverse();
            }
        }
        Ok(MemorySource {
            contacts: contacts.into_iter(),
            delivered: 0,
            fail_after: self.fail_after,
            done: false,
        })
    }
}

fn hint_value(contact: &RawContact, field: SortField) -> &str {
    let list = match field {
        SortField::GivenName => contact.given_name.as_ref(),
        SortField::FamilyName => contact.family_name.as_ref(),
    };
    list.and_then(|values| values.first())
        .map(String::as_str)
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct MemorySource {
    contacts: std::vec::IntoIter<RawContact>,
    delivered: usize,
    fail_after: Option<usize>,
    done: bool,
}

impl ContactSource for MemorySource {
    async fn next_contact(&mut self) -> Result<Option<RawContact>, Error> {
        if self.done {
            return Ok(None);
        }
        if self.fail_after == Some(self.delivered) {
            self.done = true;
            return Err(Error::new(ErrorKind::SourceEnumeration)
                .with_message("contact directory stopped responding")
                .with_count(self.delivered as u64));
        }
        match self.contacts.next() {
            Some(contact) => {
                self.delivered += 1;
                Ok(Some(contact))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

/// Contacts stored in a file, either as one JSON array or as JSON lines. The format is
/// picked from the first non-whitespace byte. File order is kept; the hint is ignored.
#[derive(Clone, Debug)]
pub struct JsonFileDirectory {
    path: PathBuf,
    channel_capacity: usize,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContactDirectory for JsonFileDirectory {
    type Source = JsonFileSource;

    fn enumerate(&self, _hint: SortHint) -> Result<JsonFileSource, Error> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let path = self.path.clone();
        let reader = tokio::task::spawn_blocking(move || read_contacts(&path, &tx));
        Ok(JsonFileSource {
            stream: ReceiverStream::new(rx),
            reader: Some(reader),
            done: false,
        })
    }
}

pub struct JsonFileSource {
    stream: ReceiverStream<Result<RawContact, Error>>,
    reader: Option<JoinHandle<()>>,
    done: bool,
}

impl ContactSource for JsonFileSource {
    async fn next_contact(&mut self) -> Result<Option<RawContact>, Error> {
        if self.done {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(Ok(contact)) => Ok(Some(contact)),
            Some(Err(err)) => {
                self.done = true;
                Err(err)
            }
            None => {
                self.done = true;
                if let Some(reader) = self.reader.take() {
                    reader.await.map_err(|err| {
                        Error::new(ErrorKind::SourceEnumeration)
                            .with_message("contact reader stopped unexpectedly")
                            .with_source(err)
                    })?;
                }
                Ok(None)
            }
        }
    }
}

type Sender = mpsc::Sender<Result<RawContact, Error>>;

fn read_contacts(path: &Path, tx: &Sender) {
    if let Err(err) = parse_file(path, tx) {
        let _ = tx.blocking_send(Err(err.with_path(path)));
    }
}

fn parse_file(path: &Path, tx: &Sender) -> Result<(), Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::SourceEnumeration)
            .with_message("failed to open contact file")
            .with_source(err)
    })?;
    let mut reader = BufReader::new(file);
    // Newlines consumed while looking for the first token; line numbers are offset by these.
    let mut skipped_lines = 0u64;
    let starts_with_array = loop {
        let available = reader.fill_buf().map_err(read_error)?;
        let Some(&first) = available.first() else {
            return Ok(());
        };
        if first.is_ascii_whitespace() {
            if first == b'\n' {
                skipped_lines += 1;
            }
            reader.consume(1);
            continue;
        }
        break first == b'[';
    };
    if starts_with_array {
        parse_array(reader, skipped_lines, tx)
    } else {
        parse_lines(reader, skipped_lines, tx)
    }
}

fn parse_array<R: Read>(mut reader: R, skipped_lines: u64, tx: &Sender) -> Result<(), Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(read_error)?;
    let items: Vec<Value> = serde_json::from_slice(&buf).map_err(|err| {
        let line_no = err.line() as u64 + skipped_lines;
        Error::new(ErrorKind::SourceEnumeration)
            .with_message(format!("invalid contact array at line {line_no}"))
            .with_hint(format!("near: {}", snippet(&buf, err.line())))
            .with_source(err)
    })?;
    debug!(contacts = items.len(), "parsed contact array");
    for (position, item) in items.into_iter().enumerate() {
        let contact = serde_json::from_value::<RawContact>(item).map_err(|err| {
            Error::new(ErrorKind::SourceEnumeration)
                .with_message(format!("array entry {position} is not a contact"))
                .with_source(err)
        })?;
        if tx.blocking_send(Ok(contact)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn parse_lines<R: BufRead>(mut reader: R, skipped_lines: u64, tx: &Sender) -> Result<(), Error> {
    let mut line = Vec::new();
    let mut line_no = skipped_lines;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(read_error)?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;
        let record = line.trim();
        if record.is_empty() {
            continue;
        }
        let contact = serde_json::from_slice::<RawContact>(record).map_err(|err| {
            Error::new(ErrorKind::SourceEnumeration)
                .with_message(format!("invalid contact on line {line_no}"))
                .with_hint(format!("near: {}", truncate_snippet(&record.to_str_lossy())))
                .with_source(err)
        })?;
        if tx.blocking_send(Ok(contact)).is_err() {
            return Ok(());
        }
    }
}

fn read_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::SourceEnumeration)
        .with_message("failed to read contact file")
        .with_source(err)
}

fn snippet(buf: &[u8], line: usize) -> String {
    let text = ByteSlice::lines(buf)
        .nth(line.saturating_sub(1))
        .map(|line| line.trim().to_str_lossy().into_owned())
        .unwrap_or_default();
    truncate_snippet(&text)
}

fn truncate_snippet(input: &str) -> String {
    if input.len() <= MAX_SNIPPET_BYTES {
        return input.to_string();
    }
    let mut end = MAX_SNIPPET_BYTES - 3;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &input[..end])
}

#[cfg(test)]
mod tests {
    use super::{
        ContactDirectory, ContactSource, JsonFileDirectory, MemoryDirectory, SortField, SortHint,
        SortOrder, truncate_snippet,
    };
    use crate::contact::RawContact;
    use crate::core::error::ErrorKind;
    use std::io::Write;

    async fn collect<S: ContactSource>(mut source: S) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(contact) = source.next_contact().await.expect("next") {
            ids.push(contact.id);
        }
        ids
    }

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[tokio::test]
    async fn memory_directory_honors_hint() {
        let directory = MemoryDirectory::new(vec![
            RawContact::new("1").with_given_name("Cy"),
            RawContact::new("2").with_given_name("Al"),
            RawContact::new("3").with_given_name("Bo"),
        ]);
        let ascending = directory.enumerate(SortHint::default()).expect("enumerate");
        assert_eq!(collect(ascending).await, ["2", "3", "1"]);

        let hint = SortHint {
            by: Some(SortField::GivenName),
            order: SortOrder::Descending,
        };
        assert_eq!(
            collect(directory.enumerate(hint).expect("enumerate")).await,
            ["1", "3", "2"]
        );

        let unsorted = SortHint {
            by: None,
            order: SortOrder::Ascending,
        };
        assert_eq!(
            collect(directory.enumerate(unsorted).expect("enumerate")).await,
            ["1", "2", "3"]
        );
    }

    #[tokio::test]
    async fn memory_directory_can_fail_midway() {
        let directory = MemoryDirectory::new(vec![RawContact::new("1"), RawContact::new("2")])
            .failing_after(1);
        let mut source = directory
            .enumerate(SortHint {
                by: None,
                order: SortOrder::Ascending,
            })
            .expect("enumerate");
        assert!(source.next_contact().await.expect("first").is_some());
        let err = source.next_contact().await.expect_err("fails");
        assert_eq!(err.kind(), ErrorKind::SourceEnumeration);
        assert!(source.next_contact().await.expect("after error").is_none());
    }

    #[tokio::test]
    async fn json_lines_are_streamed_in_file_order() {
        let file = write_file(
            "{\"id\":\"b\",\"givenName\":[\"Bo\"]}\n\n{\"id\":\"a\",\"org\":[\"Acme\"]}\r\n",
        );
        let directory = JsonFileDirectory::new(file.path()).with_channel_capacity(1);
        let source = directory.enumerate(SortHint::default()).expect("enumerate");
        assert_eq!(collect(source).await, ["b", "a"]);
    }

    #[tokio::test]
    async fn json_array_is_accepted() {
        let file = write_file("  [{\"id\":\"1\"},{\"id\":\"2\",\"tel\":[\"555\"]}]");
        let source = JsonFileDirectory::new(file.path())
            .enumerate(SortHint::default())
            .expect("enumerate");
        assert_eq!(collect(source).await, ["1", "2"]);
    }

    #[tokio::test]
    async fn empty_file_has_no_contacts() {
        let file = write_file("  \n");
        let source = JsonFileDirectory::new(file.path())
            .enumerate(SortHint::default())
            .expect("enumerate");
        assert!(collect(source).await.is_empty());
    }

    #[tokio::test]
    async fn bad_line_reports_line_number() {
        let file = write_file("{\"id\":\"1\"}\nnot-json\n{\"id\":\"3\"}\n");
        let mut source = JsonFileDirectory::new(file.path())
            .enumerate(SortHint::default())
            .expect("enumerate");
        assert!(source.next_contact().await.expect("first").is_some());
        let err = source.next_contact().await.expect_err("second");
        assert_eq!(err.kind(), ErrorKind::SourceEnumeration);
        assert!(err.message().unwrap_or_default().contains("line 2"));
        assert_eq!(err.path(), Some(file.path()));
        assert!(source.next_contact().await.expect("after").is_none());
    }

    #[tokio::test]
    async fn line_numbers_count_leading_blank_lines() {
        let file = write_file("\n\n{\"id\":\"1\"}\nnot-json\n");
        let mut source = JsonFileDirectory::new(file.path())
            .enumerate(SortHint::default())
            .expect("enumerate");
        assert!(source.next_contact().await.expect("first").is_some());
        let err = source.next_contact().await.expect_err("second");
        assert!(err.message().unwrap_or_default().contains("line 4"));

        let file = write_file("\n\n[\n{\"id\":\"1\"},\n{\"id\" 2}\n]\n");
        let mut source = JsonFileDirectory::new(file.path())
            .enumerate(SortHint::default())
            .expect("enumerate");
        let err = source.next_contact().await.expect_err("array");
        assert_eq!(err.kind(), ErrorKind::SourceEnumeration);
        assert!(err.message().unwrap_or_default().contains("line 5"));
        assert!(err.hint().unwrap_or_default().contains("{\"id\" 2}"));
    }

    #[tokio::test]
    async fn missing_file_is_an_enumeration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = JsonFileDirectory::new(dir.path().join("absent.json"))
            .enumerate(SortHint::default())
            .expect("enumerate");
        let err = source.next_contact().await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::SourceEnumeration);
    }

    #[test]
    fn snippets_are_truncated_on_char_boundaries() {
        let long = "é".repeat(100);
        let snippet = truncate_snippet(&long);
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() <= 80);
    }
}
