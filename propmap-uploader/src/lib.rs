//! propmap-uploader library
//!
//! Watches log directories and submits new or changed files to a propmap
//! server. Which files were already delivered is kept in a small JSON state
//! file, so a restart never re-sends acknowledged files.

pub mod error;
pub mod scanner;
pub mod state;
pub mod submitter;
pub mod watcher;

pub use error::{Result, UploaderError};
pub use watcher::{CycleReport, Watcher};
