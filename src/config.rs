//! Library-wide configuration, threaded through construction.
//!
//! Mirrors the "global data directory" redesign note: there is no ambient
//! process-wide state. A single [`FileMoleConfig`] value is built once (by
//! the embedding application) and passed to the components that need it.
//! Loading this from a file or environment is the embedding application's
//! job (out of scope here); only the struct and its sane defaults live in
//! this crate.

use std::path::PathBuf;
use std::time::Duration;

/// Construction-time configuration for a FileMole instance.
#[derive(Debug, Clone)]
pub struct FileMoleConfig {
    /// Root directory for the index DB and the root ignore file.
    /// Default: `<user-local-appdata>/FileMole`.
    pub data_path: PathBuf,
    /// Name of the hidden per-mole sidecar directory that holds ignore
    /// override files and backup blobs. Default: `.hill`.
    pub sidecar_name: String,
    /// Name of the root-level monitoring-ignore file under `data_path`.
    /// Default: `filemole.ignore`.
    pub root_ignore_file_name: String,
    /// Name of the nested tracking-ignore override file. Default:
    /// `.tracking-ignore`.
    pub tracking_ignore_file_name: String,
    /// Name of the nested tracking-include override file. Default:
    /// `.tracking-include`.
    pub tracking_include_file_name: String,
    /// Debounce window for raw watcher events.
    pub watch_debounce: Duration,
    /// Debounce window for the content-change batch debouncer.
    pub content_batch_window: Duration,
    /// Debounce window guarding the ignore engine's own self-watch against
    /// partial writes.
    pub ignore_file_debounce: Duration,
    /// Batch size used by the initial scanner when flushing entries to the
    /// index writer.
    pub scan_batch_size: usize,
}

impl Default for FileMoleConfig {
    fn default() -> Self {
        let data_path = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("FileMole");

        Self {
            data_path,
            sidecar_name: ".hill".to_string(),
            root_ignore_file_name: "filemole.ignore".to_string(),
            tracking_ignore_file_name: ".tracking-ignore".to_string(),
            tracking_include_file_name: ".tracking-include".to_string(),
            watch_debounce: Duration::from_millis(350),
            content_batch_window: Duration::from_secs(60),
            ignore_file_debounce: Duration::from_millis(500),
            scan_batch_size: 2000,
        }
    }
}

impl FileMoleConfig {
    /// Path to the default index database file under `data_path`.
    pub fn default_db_path(&self) -> PathBuf {
        self.data_path.join("filemole.db")
    }

    /// Path to the root monitoring-ignore file under `data_path`.
    pub fn root_ignore_path(&self) -> PathBuf {
        self.data_path.join(&self.root_ignore_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_filemole_subdir() {
        let cfg = FileMoleConfig::default();
        assert!(cfg.data_path.ends_with("FileMole"));
        assert_eq!(cfg.sidecar_name, ".hill");
        assert_eq!(cfg.watch_debounce, Duration::from_millis(350));
        assert_eq!(cfg.content_batch_window, Duration::from_secs(60));
    }

    #[test]
    fn default_db_path_is_under_data_path() {
        let cfg = FileMoleConfig::default();
        assert_eq!(cfg.default_db_path(), cfg.data_path.join("filemole.db"));
    }

    #[test]
    fn root_ignore_path_uses_configured_name() {
        let mut cfg = FileMoleConfig::default();
        cfg.root_ignore_file_name = "custom.ignore".to_string();
        assert_eq!(cfg.root_ignore_path(), cfg.data_path.join("custom.ignore"));
    }
}
