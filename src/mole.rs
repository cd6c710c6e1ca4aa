//! A [`Mole`] is a configured watch root with an associated provider kind.
//!
//! The [`MoleRegistry`] enforces the no-nested-roots invariant at insertion
//! time where possible, and resolves the longest matching prefix on lookup
//! so that a path under two overlapping roots (should one ever slip through)
//! resolves deterministically rather than ambiguously.

use std::path::{Path, PathBuf};

use crate::path_normalizer;

/// The storage backend a mole is rooted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoleKind {
    Local,
    Remote { provider_name: String },
    Cloud { provider_name: String },
}

/// A watched root.
#[derive(Debug, Clone)]
pub struct Mole {
    /// Canonical path of the watched root.
    pub path: PathBuf,
    pub kind: MoleKind,
}

impl Mole {
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self {
            path: path_normalizer::canonicalize(path.as_ref()),
            kind: MoleKind::Local,
        }
    }

    pub fn provider_name(&self) -> Option<&str> {
        match &self.kind {
            MoleKind::Local => None,
            MoleKind::Remote { provider_name } | MoleKind::Cloud { provider_name } => Some(provider_name),
        }
    }
}

/// Tracks the set of active moles and resolves which one owns a given path.
#[derive(Debug, Default)]
pub struct MoleRegistry {
    moles: Vec<Mole>,
}

impl MoleRegistry {
    pub fn new() -> Self {
        Self { moles: Vec::new() }
    }

    /// Register a mole. If its canonical path is a proper prefix of an
    /// existing mole's path (or vice versa), both remain registered per the
    /// data-model invariant — `resolve` below is what arbitrates which one
    /// "wins" for a given path (the longest matching prefix).
    pub fn add(&mut self, mole: Mole) {
        self.moles.retain(|m| m.path != mole.path);
        self.moles.push(mole);
    }

    pub fn remove(&mut self, path: &Path) {
        let canon = path_normalizer::canonicalize(path);
        self.moles.retain(|m| m.path != canon);
    }

    /// Resolve the mole that owns `path`: the mole whose root is an
    /// ancestor of (or equal to) `path` with the longest canonical path.
    /// Ties cannot occur since two moles never share a canonical path.
    pub fn resolve(&self, path: &Path) -> Option<&Mole> {
        let canon = path_normalizer::canonicalize(path);
        self.moles
            .iter()
            .filter(|m| m.path == canon || path_normalizer::is_sub_path(&m.path, &canon))
            .max_by_key(|m| m.path.as_os_str().len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mole> {
        self.moles.iter()
    }

    pub fn len(&self) -> usize {
        self.moles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_picks_longest_matching_prefix() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("inner");
        std::fs::create_dir_all(&inner).unwrap();

        let mut registry = MoleRegistry::new();
        registry.add(Mole::local(outer.path()));
        registry.add(Mole::local(&inner));

        let target = inner.join("file.txt");
        std::fs::write(&target, b"x").unwrap();

        let resolved = registry.resolve(&target).unwrap();
        assert_eq!(resolved.path, path_normalizer::canonicalize(&inner));
    }

    #[test]
    fn resolve_none_outside_any_mole() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let mut registry = MoleRegistry::new();
        registry.add(Mole::local(dir.path()));
        assert!(registry.resolve(outside.path()).is_none());
    }

    #[test]
    fn add_replaces_existing_mole_with_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = MoleRegistry::new();
        registry.add(Mole::local(dir.path()));
        registry.add(Mole::local(dir.path()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_drops_the_mole() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = MoleRegistry::new();
        registry.add(Mole::local(dir.path()));
        registry.remove(dir.path());
        assert!(registry.is_empty());
    }
}
