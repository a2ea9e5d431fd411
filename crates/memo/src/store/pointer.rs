//! Pointer files and their materialization
//!
//! A repository that stores large files remotely may leave a small
//! placeholder ("pointer file") in the working tree. Reading a memo through a
//! pointer file would deserialize the placeholder, so the real content is
//! fetched first by an external tool.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::Command;
use tracing::info;

/// First-line prefix that marks a pointer file
pub const POINTER_MAGIC: &[u8] = b"# xet version 0";

/// External command that replaces a pointer file with its content
///
/// Invoked as `<program> <args...> <path>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Materializer {
    /// Program to run
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the file path
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for Materializer {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

impl Materializer {
    /// Whether the first line of `path` starts with [`POINTER_MAGIC`]
    ///
    /// Unreadable files are not pointer files.
    #[must_use]
    pub fn is_pointer_file(path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let mut first_line = Vec::new();
        // Only the prefix matters; cap the read for large memo files
        let limit = (POINTER_MAGIC.len() + 1) as u64;
        match BufReader::new(file)
            .take(limit)
            .read_until(b'\n', &mut first_line)
        {
            Ok(_) => first_line.starts_with(POINTER_MAGIC),
            Err(_) => false,
        }
    }

    /// Run the materialization command for `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialization`] if the command cannot be started or
    /// exits unsuccessfully.
    pub fn materialize(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), program = %self.program, "Materializing pointer file");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .map_err(|e| {
                Error::materialization(path, format!("failed to run {}: {e}", self.program))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::materialization(
                path,
                format!("{} exited with {status}", self.program),
            ))
        }
    }
}

fn default_program() -> String {
    "git-xet".to_string()
}

fn default_args() -> Vec<String> {
    vec!["materialize".to_string()]
}
