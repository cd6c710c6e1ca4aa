//! OS filesystem notifications, normalized into pipeline [`Event`]s.
//!
//! Wraps `notify` behind `notify-debouncer-full` so raw OS bursts are
//! already coalesced by the time they reach this layer; the raw notify
//! callback thread only filters and enqueues, it never performs I/O. Actual
//! classification (a metadata stat plus an index read) runs off that thread
//! through [`crate::debounce::Debouncer`], which also applies the pipeline's
//! own per-path coalescing (the design's "skip if a newer change for this
//! path is already pending" rule) on top of whatever notify-debouncer-full
//! already merged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher as _};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer as NotifyDebouncer, FileIdMap};

use crate::classifier::Classifier;
use crate::debounce::Debouncer;
use crate::ignore_engine::IgnoreEngine;

#[derive(Debug)]
pub enum WatcherError {
    Notify(notify::Error),
}

impl std::fmt::Display for WatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notify(e) => write!(f, "watcher error: {e}"),
        }
    }
}

impl std::error::Error for WatcherError {}

impl From<notify::Error> for WatcherError {
    fn from(err: notify::Error) -> Self {
        Self::Notify(err)
    }
}

/// Watches one or more recursive roots and routes normalized events into
/// the [`Classifier`].
pub struct Watcher {
    inner: NotifyDebouncer<notify::RecommendedWatcher, FileIdMap>,
    watched_roots: Arc<Mutex<Vec<PathBuf>>>,
}

impl Watcher {
    /// Must be called from within a tokio runtime context: the per-path
    /// action debounce spawns its delayed classify tasks onto a captured
    /// [`tokio::runtime::Handle`] so it can be driven from the raw notify
    /// callback thread, which does not itself run inside the executor.
    pub fn new(
        classifier: Arc<Classifier>,
        ignore_engine: Arc<IgnoreEngine>,
        debounce_window: Duration,
        action_debounce_window: Duration,
    ) -> Result<Self, WatcherError> {
        let action_debounce = Arc::new(Debouncer::<PathBuf>::new(action_debounce_window));

        let handler = move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    handle_raw_event(&event.event, &classifier, &ignore_engine, &action_debounce);
                }
            }
            Err(errors) => {
                for error in errors {
                    log::error!("watcher notification error: {error}");
                }
            }
        };

        let inner = new_debouncer(debounce_window, None, handler)?;

        Ok(Self {
            inner,
            watched_roots: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Idempotent: a second call with the same canonical path is a no-op.
    pub fn watch(&mut self, root: &Path) -> Result<(), WatcherError> {
        let canonical = crate::path_normalizer::canonicalize(root);
        let mut roots = self.watched_roots.lock().expect("watcher lock poisoned");
        if roots.contains(&canonical) {
            return Ok(());
        }
        self.inner.watcher().watch(&canonical, RecursiveMode::Recursive)?;
        self.inner.cache().add_root(&canonical, RecursiveMode::Recursive);
        roots.push(canonical);
        Ok(())
    }

    /// Disposes the native handle for `root`; safe to call while events for
    /// that root are in flight (the debouncer drains its own queue).
    pub fn unwatch(&mut self, root: &Path) -> Result<(), WatcherError> {
        let canonical = crate::path_normalizer::canonicalize(root);
        let mut roots = self.watched_roots.lock().expect("watcher lock poisoned");
        if !roots.contains(&canonical) {
            return Ok(());
        }
        self.inner.watcher().unwatch(&canonical)?;
        roots.retain(|r| r != &canonical);
        Ok(())
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        let canonical = crate::path_normalizer::canonicalize(root);
        self.watched_roots.lock().expect("watcher lock poisoned").contains(&canonical)
    }
}

/// Runs on the raw notify callback thread: filters ignored paths and hands
/// every remaining path off to the action debouncer. No stat or index I/O
/// happens here.
fn handle_raw_event(event: &notify::Event, classifier: &Arc<Classifier>, ignore_engine: &Arc<IgnoreEngine>, action_debounce: &Arc<Debouncer<PathBuf>>) {
    use notify::EventKind as NotifyKind;

    match &event.kind {
        NotifyKind::Create(_) => {
            for path in &event.paths {
                if ignore_engine.should_ignore(path) {
                    continue;
                }
                schedule(action_debounce, path.clone(), Arc::clone(classifier), |classifier, path| {
                    let is_directory = path.is_dir();
                    classifier.on_created(path, is_directory);
                });
            }
        }
        NotifyKind::Modify(ModifyKind::Name(rename_mode)) => {
            handle_rename(*rename_mode, event, classifier, ignore_engine, action_debounce);
        }
        NotifyKind::Modify(_) => {
            for path in &event.paths {
                if ignore_engine.should_ignore(path) {
                    continue;
                }
                schedule(action_debounce, path.clone(), Arc::clone(classifier), |classifier, path| {
                    let is_directory = path.is_dir();
                    if let Err(err) = classifier.on_changed(path, is_directory) {
                        log::error!("classify failed: {err}");
                    }
                });
            }
        }
        NotifyKind::Remove(_) => {
            for path in &event.paths {
                if ignore_engine.should_ignore(path) {
                    continue;
                }
                schedule(action_debounce, path.clone(), Arc::clone(classifier), |classifier, path| {
                    // The path no longer exists; treat unknown type as a
                    // file per the design's delete-time fallback.
                    classifier.on_deleted(path, false);
                });
            }
        }
        NotifyKind::Other | NotifyKind::Any | NotifyKind::Access(_) => {}
    }
}

/// A combined rename (`RenameMode::Both`) carries exactly two paths, old
/// then new, and is routed to `on_renamed`. An unpaired half (`From`/`To`,
/// the other side having been dropped by the OS or coalesced away) degrades
/// to a plain delete/create on whichever single path is present.
fn handle_rename(
    mode: RenameMode,
    event: &notify::Event,
    classifier: &Arc<Classifier>,
    ignore_engine: &Arc<IgnoreEngine>,
    action_debounce: &Arc<Debouncer<PathBuf>>,
) {
    match mode {
        RenameMode::Both if event.paths.len() >= 2 => {
            let old_path = event.paths[0].clone();
            let new_path = event.paths[1].clone();
            if ignore_engine.should_ignore(&old_path) && ignore_engine.should_ignore(&new_path) {
                return;
            }
            let key = new_path.clone();
            let classifier = Arc::clone(classifier);
            action_debounce.debounce(key, async move {
                let result = tokio::task::spawn_blocking(move || {
                    let is_directory = new_path.is_dir();
                    classifier.on_renamed(old_path, new_path, is_directory);
                })
                .await;
                if let Err(join_err) = result {
                    log::error!("rename classify task panicked: {join_err}");
                }
            });
        }
        RenameMode::From => {
            if let Some(path) = event.paths.first() {
                if ignore_engine.should_ignore(path) {
                    return;
                }
                schedule(action_debounce, path.clone(), Arc::clone(classifier), |classifier, path| {
                    classifier.on_deleted(path, false);
                });
            }
        }
        RenameMode::To | RenameMode::Both | RenameMode::Any | RenameMode::Other => {
            if let Some(path) = event.paths.first() {
                if ignore_engine.should_ignore(path) {
                    return;
                }
                schedule(action_debounce, path.clone(), Arc::clone(classifier), |classifier, path| {
                    let is_directory = path.is_dir();
                    classifier.on_created(path, is_directory);
                });
            }
        }
    }
}

/// Debounce `path`, then run `action` on a blocking task so the metadata
/// stat and index read it performs never occur on the callback thread.
fn schedule<F>(action_debounce: &Arc<Debouncer<PathBuf>>, path: PathBuf, classifier: Arc<Classifier>, action: F)
where
    F: FnOnce(Arc<Classifier>, PathBuf) + Send + 'static,
{
    let key = path.clone();
    action_debounce.debounce(key, async move {
        let result = tokio::task::spawn_blocking(move || action(classifier, path)).await;
        if let Err(join_err) = result {
            log::error!("classify task panicked: {join_err}");
        }
    });
}
