//! Purpose: Store-directory and store-name path resolution for the CLI.
//! Exports: `default_store_dir` and `resolve_named_store_path`.
//! Role: Keep every command resolving `--store` the same way.
//! Invariants: Default store directory remains `~/.contactbench/stores`.
//! Invariants: Store names must not contain path separators.

use std::path::{Path, PathBuf};

pub(crate) const STORE_EXTENSION: &str = ".store";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum StoreNameResolveError {
    Empty,
    ContainsPathSeparator,
}

pub(crate) fn default_store_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".contactbench").join("stores")
}

pub(crate) fn resolve_named_store_path(
    name: &str,
    store_dir: &Path,
) -> Result<PathBuf, StoreNameResolveError> {
    if name.is_empty() {
        return Err(StoreNameResolveError::Empty);
    }
    if name.contains('/') {
        return Err(StoreNameResolveError::ContainsPathSeparator);
    }
    if name.ends_with(STORE_EXTENSION) {
        return Ok(store_dir.join(name));
    }
    Ok(store_dir.join(format!("{name}{STORE_EXTENSION}")))
}
