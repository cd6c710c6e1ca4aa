//! Layered gitignore-style ignore evaluation.
//!
//! One ignore file per directory, compiled into a glob matcher anchored at
//! that directory, evaluated last-match-wins across every rule whose
//! `base_dir` is an ancestor of (or equal to) the candidate path. Hidden
//! paths (any segment starting with `.`) are rejected unconditionally
//! before rule evaluation runs, matching the design's "never negated"
//! carve-out.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::path_normalizer;

#[derive(Debug)]
pub enum IgnoreEngineError {
    Io(std::io::Error),
}

impl std::fmt::Display for IgnoreEngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "ignore engine I/O error: {e}"),
        }
    }
}

impl std::error::Error for IgnoreEngineError {}

impl From<std::io::Error> for IgnoreEngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// One compiled ignore file: its directory anchor plus the matcher built
/// from its patterns.
struct CompiledRuleSet {
    base_dir: PathBuf,
    matcher: Gitignore,
}

/// Built-in patterns applied at the root regardless of user configuration
/// (temp/build artifacts and the library's own database files).
const DEFAULT_PATTERNS: &[&str] = &[
    "*.tmp", "*.temp", "*.bak", "*.swp", "*~", "*.log", "logs/", "node_modules/", "build/", "dist/", "bin/", "obj/",
    "packages/", "*.db", "*.sqlite", "*.sqlite3", "*.mdf", "*.ldf",
];

/// Evaluates `should_ignore` across every ignore file discovered under a
/// root, rebuilding its rule set whenever those files change.
pub struct IgnoreEngine {
    file_name: String,
    rule_sets: RwLock<Vec<CompiledRuleSet>>,
    last_reload: RwLock<Instant>,
    reload_debounce: Duration,
    /// Set around the engine's own writes (e.g. the tracking manager adding
    /// an include rule) so the self-watch does not treat them as external
    /// edits requiring a reload.
    suppress_self_watch: std::sync::atomic::AtomicBool,
}

impl IgnoreEngine {
    /// Walk `root` once, compiling one [`Gitignore`] per directory that
    /// contains a file named `file_name`, plus a synthetic root rule set
    /// seeded with [`DEFAULT_PATTERNS`].
    pub fn build(root: &Path, file_name: impl Into<String>, reload_debounce: Duration) -> Result<Self, IgnoreEngineError> {
        let file_name = file_name.into();
        let root = path_normalizer::canonicalize(root);
        let mut rule_sets = vec![compile_default_rule_set(&root)?];
        rule_sets.extend(discover_rule_sets(&root, &file_name)?);

        Ok(Self {
            file_name,
            rule_sets: RwLock::new(rule_sets),
            last_reload: RwLock::new(Instant::now()),
            reload_debounce,
            suppress_self_watch: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// True iff `path` is ignored: a hidden path segment unconditionally
    /// ignores, otherwise the last matching rule (across all applicable
    /// rule sets, in discovery order) wins.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if has_hidden_segment(path) {
            return true;
        }

        let rule_sets = self.rule_sets.read().expect("ignore engine lock poisoned");
        let is_dir = path.is_dir();

        let mut decision = false;
        for rule_set in rule_sets.iter() {
            if !path_normalizer::is_sub_path(&rule_set.base_dir, path) && rule_set.base_dir != path {
                continue;
            }
            match rule_set.matcher.matched(path, is_dir) {
                ignore::Match::None => {}
                ignore::Match::Ignore(_) => decision = true,
                ignore::Match::Whitelist(_) => decision = false,
            }
        }
        decision
    }

    /// Recompile every rule set from disk. Call this from the file-watch
    /// callback for the ignore files; guarded by `reload_debounce` so bursts
    /// of partial writes only trigger one reload.
    pub fn reload(&self, root: &Path) -> Result<(), IgnoreEngineError> {
        if self.suppress_self_watch.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut last = self.last_reload.write().expect("ignore engine lock poisoned");
            if last.elapsed() < self.reload_debounce {
                return Ok(());
            }
            *last = Instant::now();
        }

        let root = path_normalizer::canonicalize(root);
        let mut rule_sets = vec![compile_default_rule_set(&root)?];
        rule_sets.extend(discover_rule_sets(&root, &self.file_name)?);
        *self.rule_sets.write().expect("ignore engine lock poisoned") = rule_sets;
        Ok(())
    }

    /// Wrap a write to one of the engine's own ignore files so the
    /// subsequent file-watch notification is swallowed instead of
    /// triggering a reload.
    pub fn perform_self_write<F, T>(&self, write: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.suppress_self_watch.store(true, std::sync::atomic::Ordering::SeqCst);
        let result = write();
        self.suppress_self_watch.store(false, std::sync::atomic::Ordering::SeqCst);
        result
    }
}

fn has_hidden_segment(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('.') && s != "." && s != "..")
            .unwrap_or(false)
    })
}

fn compile_default_rule_set(root: &Path) -> Result<CompiledRuleSet, IgnoreEngineError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in DEFAULT_PATTERNS {
        builder
            .add_line(None, pattern)
            .map_err(|e| IgnoreEngineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?;
    }
    let matcher = builder
        .build()
        .map_err(|e| IgnoreEngineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?;
    Ok(CompiledRuleSet {
        base_dir: root.to_path_buf(),
        matcher,
    })
}

/// Walk `root` looking for every directory containing `file_name`. Walking
/// is sequential (directory counts here are small compared to a full scan)
/// but compiling each discovered ignore file into a matcher is independent
/// work, so it fans out across rayon's global pool.
fn discover_rule_sets(root: &Path, file_name: &str) -> Result<Vec<CompiledRuleSet>, IgnoreEngineError> {
    use rayon::prelude::*;

    let candidates: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.path().to_path_buf())
        .filter(|dir| dir.join(file_name).is_file())
        .collect();

    let rule_sets = candidates
        .into_par_iter()
        .filter_map(|dir| compile_rule_set(&dir, file_name))
        .collect();
    Ok(rule_sets)
}

fn compile_rule_set(dir: &Path, file_name: &str) -> Option<CompiledRuleSet> {
    let candidate = dir.join(file_name);
    let mut builder = GitignoreBuilder::new(dir);
    let (_, parse_error) = builder.add(&candidate);
    if let Some(err) = parse_error {
        log::warn!("ignore file {} has invalid patterns: {err}", candidate.display());
    }
    match builder.build() {
        Ok(matcher) => Some(CompiledRuleSet {
            base_dir: dir.to_path_buf(),
            matcher,
        }),
        Err(err) => {
            log::warn!("failed to compile ignore file {}: {err}", candidate.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn build_engine(root: &Path) -> IgnoreEngine {
        IgnoreEngine::build(root, "filemole.ignore", Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn default_patterns_ignore_tmp_and_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert!(engine.should_ignore(&dir.path().join("scratch.tmp")));
        assert!(engine.should_ignore(&dir.path().join("app.log")));
        assert!(!engine.should_ignore(&dir.path().join("main.rs")));
    }

    #[test]
    fn hidden_segments_are_always_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert!(engine.should_ignore(&dir.path().join(".git").join("HEAD")));
    }

    #[test]
    fn custom_ignore_file_rule_applies_under_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("filemole.ignore"), "build/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();

        let engine = build_engine(dir.path());
        assert!(engine.should_ignore(&dir.path().join("build").join("x.bin")));
    }

    #[test]
    fn negation_rule_overrides_earlier_ignore_in_same_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("filemole.ignore"), "*.log\n!keep.log\n").unwrap();

        let engine = build_engine(dir.path());
        assert!(engine.should_ignore(&dir.path().join("drop.log")));
        assert!(!engine.should_ignore(&dir.path().join("keep.log")));
    }

    #[test]
    fn reload_picks_up_rule_changes_after_debounce_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let engine = IgnoreEngine::build(dir.path(), "filemole.ignore", Duration::from_millis(0)).unwrap();
        assert!(!engine.should_ignore(&dir.path().join("secret.env")));

        std::fs::write(dir.path().join("filemole.ignore"), "*.env\n").unwrap();
        engine.reload(dir.path()).unwrap();
        assert!(engine.should_ignore(&dir.path().join("secret.env")));
    }

    #[test]
    fn removing_a_rule_and_reloading_unignores_future_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("filemole.ignore"), "build/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        let engine = IgnoreEngine::build(dir.path(), "filemole.ignore", Duration::from_millis(0)).unwrap();
        assert!(engine.should_ignore(&dir.path().join("build").join("x.bin")));

        std::fs::write(dir.path().join("filemole.ignore"), "").unwrap();
        engine.reload(dir.path()).unwrap();
        assert!(!engine.should_ignore(&dir.path().join("build").join("x.bin")));
    }
}
