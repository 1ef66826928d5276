//! Dump loading: text sources turned into ordered rules.
//!
//! A dump that fails to parse contributes no rules. Other dumps are
//! unaffected.

mod parser;

pub use parser::parse_dump;

use crate::rule::Rule;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
    #[error("line {line}: invalid wildcard pattern: {source}")]
    Pattern {
        line: usize,
        #[source]
        source: regex::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Dump text captured from a file.
#[derive(Debug, Clone)]
pub struct DumpSource {
    pub path: PathBuf,
    pub text: String,
}

impl DumpSource {
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, DumpError> {
        let path = path.as_ref().to_path_buf();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Self { path, text }),
            Err(source) => Err(DumpError::Io { path, source }),
        }
    }

    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// Parse this source, reporting failures to the caller.
    pub fn parse(&self) -> Result<Vec<Rule>, DumpError> {
        parse_dump(&Arc::from(self.name()), &self.text)
    }
}

/// Turn one dump into rules. A malformed dump is logged and yields nothing.
pub fn load(source: &str, text: &str) -> Vec<Rule> {
    match parse_dump(&Arc::from(source), text) {
        Ok(rules) => {
            debug!(source, rules = rules.len(), "Loaded dump");
            rules
        }
        Err(e) => {
            warn!(source, error = %e, "Failed to parse dump, skipping it");
            Vec::new()
        }
    }
}
