//! Configuration types for Mimic.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! command-line flags.

mod cli;

pub use cli::Cli;

use crate::hooks::HookPoolConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("hook_pool.queue_size must be greater than 0")]
    EmptyQueue,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dump files, in match order.
    #[serde(default)]
    pub dumps: Vec<PathBuf>,
    /// Hook scripts, in execution order.
    #[serde(default)]
    pub hooks: Vec<PathBuf>,
    /// Disable directory watching.
    #[serde(default)]
    pub no_listen: bool,
    /// Disable ETag computation and conditional 304 answers.
    #[serde(default)]
    pub no_etag: bool,
    #[serde(default)]
    pub hook_pool: HookPoolConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dumps: Vec::new(),
            hooks: Vec::new(),
            no_listen: false,
            no_etag: false,
            hook_pool: HookPoolConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes to null
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Build the effective configuration from the command line, reading the
    /// config file first when one is given.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Flags override scalar settings. Dumps and hooks are appended after the
    /// ones from the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        self.dumps.extend(cli.dumps.iter().cloned());
        self.hooks.extend(cli.hooks.iter().cloned());
        self.no_listen |= cli.no_listen;
        self.no_etag |= cli.no_etag;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hook_pool.queue_size == 0 {
            return Err(ConfigError::EmptyQueue);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Dumps that exist on disk. Missing ones are reported and left out.
    pub fn existing_dumps(&self) -> Vec<PathBuf> {
        existing_files("dump", &self.dumps)
    }

    /// Hooks that exist on disk. Missing ones are reported and left out.
    pub fn existing_hooks(&self) -> Vec<PathBuf> {
        existing_files("hook", &self.hooks)
    }
}

fn existing_files(kind: &str, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| {
            let exists = path.is_file();
            if !exists {
                warn!(kind, path = %path.display(), "File not found, skipping");
            }
            exists
        })
        .cloned()
        .collect()
}
