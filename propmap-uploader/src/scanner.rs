//! Log directory scanner
//!
//! Lists candidate log files in the watched directories and computes their
//! content signatures. Watched files are only ever read.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{Result, UploaderError};

/// A watched file read for submission
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    /// Exactly the bytes the signature was computed over
    pub body: Vec<u8>,
    /// Hex SHA-256 of `body`
    pub signature: String,
}

pub struct LogScanner {
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
    recursive: bool,
}

impl LogScanner {
    pub fn new(dirs: Vec<PathBuf>, extensions: Vec<String>, recursive: bool) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            dirs,
            extensions,
            recursive,
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Matching files across all watched directories, sorted by path
    ///
    /// A missing or unreadable directory is logged and skipped; it may
    /// appear later.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                warn!("Watch directory not available: {}", dir.display());
                continue;
            }

            let walker = WalkDir::new(dir)
                .follow_links(false)
                .min_depth(1)
                .max_depth(if self.recursive { usize::MAX } else { 1 });

            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && self.matches(entry.path()) => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Error accessing entry: {}", e),
                }
            }
        }

        files.sort();
        files.dedup();
        debug!("Scan found {} candidate files", files.len());
        files
    }

    fn matches(&self, path: &Path) -> bool {
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('.'));
        if is_hidden {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| {
                self.extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }
}

/// Read a file and compute its signature
pub async fn read_candidate(path: &Path) -> Result<Candidate> {
    let body = tokio::fs::read(path).await.map_err(|e| UploaderError::Scan {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let signature = signature(&body);

    Ok(Candidate {
        path: path.to_path_buf(),
        body,
        signature,
    })
}

/// Hex SHA-256 of file content
pub fn signature(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}
