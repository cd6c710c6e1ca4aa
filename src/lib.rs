//! FileMole — a reactive indexing core over one or more watched directory
//! roots ("moles").
//!
//! This crate owns the hard engineering: native filesystem notifications,
//! debounce/coalesce, a persistent SQLite index over file metadata, a
//! layered gitignore-style ignore engine, and an opt-in per-file
//! backup+diff pipeline. Everything above this layer (the public facade,
//! remote/cloud storage backends, configuration loading, logging
//! installation) is a named collaborator consumed through traits, not
//! implemented here.
//!
//! Use [`log`]'s macros to observe the pipeline; this crate never installs
//! a logger itself.

#![warn(unused_crate_dependencies)]
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod backup;
pub mod classifier;
pub mod config;
pub mod debounce;
pub mod diff;
pub mod error;
pub mod event;
pub mod hash;
pub mod ignore_engine;
pub mod index;
pub mod mole;
pub mod path_normalizer;
pub mod provider;
pub mod scanner;
pub mod tracking;
pub mod watcher;

pub use config::FileMoleConfig;
pub use error::FileMoleError;
pub use event::{Event, EventKind};
pub use mole::{Mole, MoleKind};
