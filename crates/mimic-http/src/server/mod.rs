//! HTTP front end.
//!
//! One task per accepted connection; every request on a connection is
//! answered from the rule snapshot current when it arrived.

mod body;
mod handler;

pub use body::HookedBody;
pub use handler::{build_response, handle_request};

use crate::config::ServerConfig;
use crate::hooks::HookDispatcher;
use crate::reload::{ReloadCoordinator, ReloadError, RuleStore};
use crate::response::{SynthesisOptions, Synthesizer};
use crate::rule::RuleSet;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared by every connection task.
pub struct AppState {
    pub store: Arc<RuleStore>,
    pub synthesizer: Synthesizer,
    pub hooks: Arc<HookDispatcher>,
}

pub struct Server {
    state: Arc<AppState>,
    coordinator: Arc<ReloadCoordinator>,
    watchers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Load the rules once and, unless disabled, start watching the dump
    /// directories.
    pub async fn start(
        config: &ServerConfig,
        dumps: Vec<PathBuf>,
        hooks: HookDispatcher,
    ) -> Result<Self, ReloadError> {
        let store = Arc::new(RuleStore::new(RuleSet::default()));
        let coordinator = Arc::new(ReloadCoordinator::new(dumps, Arc::clone(&store)));
        coordinator.reload().await;

        let watchers = if config.no_listen {
            info!("Directory watching disabled");
            Vec::new()
        } else {
            coordinator.watch()?
        };

        let state = Arc::new(AppState {
            store,
            synthesizer: Synthesizer::new(SynthesisOptions {
                no_etag: config.no_etag,
            }),
            hooks: Arc::new(hooks),
        });

        Ok(Self {
            state,
            coordinator,
            watchers,
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let state = Arc::clone(&state);
                                    async move { handle_request(req, state, addr).await }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("Connection error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }
    }

    /// Stop the watchers and drain the hook pool.
    pub async fn shutdown(self) {
        for watcher in &self.watchers {
            watcher.abort();
        }

        let hooks = Arc::clone(&self.state.hooks);
        if let Err(e) = tokio::task::spawn_blocking(move || hooks.shutdown()).await {
            error!("Hook pool shutdown failed: {}", e);
        }
        if let Some(stats) = self.state.hooks.stats() {
            info!(
                submitted = stats.submitted,
                completed = stats.completed,
                rejected = stats.rejected,
                "Hook pool drained"
            );
        }
    }
}
