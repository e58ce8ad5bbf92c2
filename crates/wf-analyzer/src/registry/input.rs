//! Input discovery and the file registry.
//!
//! Grounded on zizmor's `InputKey`/`InputRegistry` (`registry/input.rs`):
//! same `BTreeMap`-for-determinism discipline, same prefix-stripping
//! presentation path. The remote (`owner/repo@ref`) key variant isn't
//! carried over — this analyzer is file-scoped (§5, §9 "Checker
//! coupling"), so there's no second kind of key to distinguish.

use std::collections::{BTreeMap, btree_map};

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum InputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input: no filename component")]
    MissingName,
}

/// A unique key for a source file in a given analysis run: a path, plus
/// the nondeterministic prefix (the argument the user actually passed)
/// to strip when presenting a relative path.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Serialize, PartialOrd, Ord)]
pub(crate) struct InputKey {
    prefix: Option<Utf8PathBuf>,
    pub(crate) given_path: Utf8PathBuf,
}

impl std::fmt::Display for InputKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{path}", path = self.given_path)
    }
}

impl InputKey {
    pub(crate) fn new(path: &Utf8Path, prefix: Option<&Utf8Path>) -> Result<Self, InputError> {
        if path.file_name().is_none() {
            return Err(InputError::MissingName);
        }

        Ok(Self {
            prefix: prefix.map(Utf8Path::to_path_buf),
            given_path: path.to_path_buf(),
        })
    }

    /// A path suitable for presentation: the prefix the user passed on
    /// the command line is stripped, if one is present.
    pub(crate) fn presentation_path(&self) -> &str {
        self.prefix
            .as_ref()
            .and_then(|pfx| self.given_path.strip_prefix(pfx).ok())
            .unwrap_or(&self.given_path)
            .as_str()
    }

    pub(crate) fn filename(&self) -> &str {
        self.given_path
            .file_name()
            .expect("construction invariant: every InputKey has a filename")
    }
}

/// The discovered set of TypeScript source files for one analysis run.
pub(crate) struct InputRegistry {
    // BTreeMap, not HashMap: iteration order must be deterministic so
    // multi-file runs produce stable output ordering.
    pub(crate) inputs: BTreeMap<InputKey, String>,
}

impl InputRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inputs: Default::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inputs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Walks `root` (a file or directory) collecting `.ts`/`.tsx` files,
    /// honoring `.gitignore` the way zizmor's workflow discovery does.
    pub(crate) fn discover(&mut self, root: &Utf8Path) -> anyhow::Result<()> {
        let prefix = if root.is_dir() { Some(root) } else { root.parent() };

        for entry in WalkBuilder::new(root).build() {
            let entry = entry?;
            let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
                continue;
            };

            if !path.is_file() {
                continue;
            }
            if !matches!(path.extension(), Some("ts") | Some("tsx")) {
                continue;
            }
            if path
                .file_name()
                .is_some_and(|n| n.ends_with(".d.ts"))
            {
                continue;
            }

            let key = InputKey::new(&path, prefix)?;
            let contents = std::fs::read_to_string(&path)?;
            self.inputs.insert(key, contents);
        }

        Ok(())
    }

    pub(crate) fn iter_inputs(&self) -> btree_map::Iter<'_, InputKey, String> {
        self.inputs.iter()
    }
}

impl Default for InputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_key_strips_prefix_for_presentation() {
        let key = InputKey::new(
            Utf8Path::new("/repo/src/workflows/checkout.ts"),
            Some(Utf8Path::new("/repo")),
        )
        .unwrap();
        assert_eq!(key.presentation_path(), "src/workflows/checkout.ts");
        assert_eq!(key.filename(), "checkout.ts");
    }

    #[test]
    fn input_key_rejects_paths_without_a_filename() {
        assert!(InputKey::new(Utf8Path::new("/"), None).is_err());
    }
}
