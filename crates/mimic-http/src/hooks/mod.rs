//! Post-response hooks.
//!
//! Once a response has been handed to the transport, a snapshot of the
//! exchange is queued on a bounded worker pool. Each task runs every
//! configured hook program, in order, inside one scripting session. Hooks
//! observe the exchange; whatever they change is discarded.
//!
//! ## Module Structure
//!
//! - `rhai_hook`: Rhai-backed `HookProgram` and the per-task `HookSession`
//! - `pool`: bounded worker pool executing hook tasks

mod pool;
mod rhai_hook;

pub use pool::{HookPool, HookPoolConfig, HookPoolStats};
pub use rhai_hook::{HookSession, RhaiHook};

use crate::request::{IncomingRequest, Parameters};
use crate::response::SynthesizedResponse;
use bytes::Bytes;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to read hook {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile hook {name}: {message}")]
    Compile { name: String, message: String },
    #[error("hook {name} failed: {message}")]
    Runtime { name: String, message: String },
    #[error("hook queue is full")]
    QueueFull,
    #[error("hook pool is shut down")]
    ShutDown,
}

/// A compiled hook: compile once, execute many times.
pub trait HookProgram: Send + Sync {
    fn name(&self) -> &str;

    /// Run against the session's `http` value. Errors are reported per program
    /// and never stop the remaining programs.
    fn execute(&self, session: &mut HookSession) -> Result<(), HookError>;
}

/// Header map as exposed to hooks: name -> values.
pub type HeaderValues = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub parameters: Parameters,
    pub body: Bytes,
    /// Lower-cased names, comma-split values.
    pub headers: HeaderValues,
}

#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub body: Bytes,
    pub headers: HeaderValues,
    pub status: u16,
    pub message: String,
    pub protocol: String,
}

/// The `{request, response}` value each hook task works on.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
}

impl HookContext {
    pub fn new(request: &IncomingRequest, response: &SynthesizedResponse) -> Self {
        let request_headers = request
            .provided_headers
            .iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();

        let mut response_headers = HeaderValues::new();
        for header in &response.headers {
            response_headers
                .entry(header.name.clone())
                .or_default()
                .push(header.value.clone());
        }

        Self {
            request: RequestSnapshot {
                method: request.method.clone(),
                path: request.path.clone(),
                protocol: request.protocol.clone(),
                parameters: request.parameters.clone(),
                body: request.body.clone(),
                headers: request_headers,
            },
            response: ResponseSnapshot {
                body: response.body.clone(),
                headers: response_headers,
                status: response.status,
                message: response.message.clone().unwrap_or_default(),
                protocol: response.protocol.clone(),
            },
        }
    }
}

/// Front door for hook execution. Inert when no programs are configured.
pub struct HookDispatcher {
    pool: Option<HookPool>,
}

impl HookDispatcher {
    pub fn new(
        programs: Vec<Arc<dyn HookProgram>>,
        config: &HookPoolConfig,
    ) -> std::io::Result<Self> {
        if programs.is_empty() {
            debug!("No hooks configured, hook dispatcher is inert");
            return Ok(Self::disabled());
        }
        info!(hooks = programs.len(), "Starting hook dispatcher");
        Ok(Self {
            pool: Some(HookPool::new(config.clone(), programs)?),
        })
    }

    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Queue one task. A rejected task is logged and dropped.
    pub fn dispatch(&self, context: HookContext) {
        let Some(pool) = &self.pool else {
            return;
        };
        if let Err(e) = pool.submit(context) {
            warn!(error = %e, "Dropping hook task");
        }
    }

    pub fn stats(&self) -> Option<HookPoolStats> {
        self.pool.as_ref().map(HookPool::stats)
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}
