// Ordered cursor over the primary key or a secondary index, pinned to one read snapshot.
use std::collections::BTreeMap;
use std::ops::Bound;

use serde_json::Value;
use tokio::sync::OwnedRwLockReadGuard;

use crate::core::error::{Error, ErrorKind};
use crate::core::key::{IndexKey, KeyRange};
use crate::core::store::StoreState;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CursorSource {
    Primary,
    Index(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CursorEntry {
    pub key: IndexKey,
    pub primary_key: IndexKey,
    pub value: Value,
}

/// Lazy, forward-only traversal. The read guard lives as long as the cursor, which is
/// what keeps writers out for the length of a scan.
pub struct Cursor {
    state: OwnedRwLockReadGuard<StoreState>,
    source: CursorSource,
    range: KeyRange,
    direction: Direction,
    position: Option<(IndexKey, IndexKey)>,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(
        state: OwnedRwLockReadGuard<StoreState>,
        source: CursorSource,
        range: KeyRange,
        direction: Direction,
    ) -> Self {
        let done = range.is_empty();
        Self {
            state,
            source,
            range,
            direction,
            position: None,
            done,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Advances to the next entry, or returns `Ok(None)` once the range is exhausted.
    pub async fn next(&mut self) -> Result<Option<CursorEntry>, Error> {
        if self.done {
            return Ok(None);
        }
        let table = &self.state.table;
        let found = match self.source {
            CursorSource::Primary => seek_primary(
                &table.records,
                &self.range,
                self.direction,
                self.position.as_ref().map(|(_, primary_key)| primary_key),
            ),
            CursorSource::Index(position) => seek_index(
                &table.indexes[position].entries,
                &self.range,
                self.direction,
                self.position.as_ref(),
            ),
        };

        let Some((key, primary_key)) = found else {
            self.done = true;
            return Ok(None);
        };
        let value = table.records.get(&primary_key).cloned().ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message("index entry points at a missing record")
                .with_key(primary_key.to_string())
        })?;
        self.position = Some((key.clone(), primary_key.clone()));
        Ok(Some(CursorEntry {
            key,
            primary_key,
            value,
        }))
    }
}

fn seek_primary(
    records: &BTreeMap<IndexKey, Value>,
    range: &KeyRange,
    direction: Direction,
    after: Option<&IndexKey>,
) -> Option<(IndexKey, IndexKey)> {
    let found = match (direction, after) {
        (Direction::Next, None) => records.range((range.lower.clone(), range.upper.clone())).next(),
        (Direction::Next, Some(last)) => records
            .range((Bound::Excluded(last.clone()), range.upper.clone()))
            .next(),
        (Direction::Prev, None) => records
            .range((range.lower.clone(), range.upper.clone()))
            .next_back(),
        (Direction::Prev, Some(last)) => records
            .range((range.lower.clone(), Bound::Excluded(last.clone())))
            .next_back(),
    };
    found.map(|(key, _)| (key.clone(), key.clone()))
}

fn seek_index(
    entries: &BTreeMap<IndexKey, std::collections::BTreeSet<IndexKey>>,
    range: &KeyRange,
    direction: Direction,
    after: Option<&(IndexKey, IndexKey)>,
) -> Option<(IndexKey, IndexKey)> {
    match direction {
        Direction::Next => {
            if let Some((key, primary_key)) = after {
                let same_key = entries.get(key).and_then(|keys| {
                    keys.range((Bound::Excluded(primary_key), Bound::Unbounded))
                        .next()
                });
                if let Some(next) = same_key {
                    return Some((key.clone(), next.clone()));
                }
                return entries
                    .range((Bound::Excluded(key.clone()), range.upper.clone()))
                    .find_map(|(key, keys)| keys.first().map(|pk| (key.clone(), pk.clone())));
            }
            entries
                .range((range.lower.clone(), range.upper.clone()))
                .find_map(|(key, keys)| keys.first().map(|pk| (key.clone(), pk.clone())))
        }
        Direction::Prev => {
            if let Some((key, primary_key)) = after {
                let same_key = entries.get(key).and_then(|keys| {
                    keys.range((Bound::Unbounded, Bound::Excluded(primary_key)))
                        .next_back()
                });
                if let Some(prev) = same_key {
                    return Some((key.clone(), prev.clone()));
                }
                return entries
                    .range((range.lower.clone(), Bound::Excluded(key.clone())))
                    .rev()
                    .find_map(|(key, keys)| keys.last().map(|pk| (key.clone(), pk.clone())));
            }
            entries
                .range((range.lower.clone(), range.upper.clone()))
                .rev()
                .find_map(|(key, keys)| keys.last().map(|pk| (key.clone(), pk.clone())))
        }
    }
}
