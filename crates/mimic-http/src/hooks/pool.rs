use super::{HookContext, HookError, HookProgram, HookSession};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the hook worker pool
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HookPoolConfig {
    /// Number of worker threads. 0 means auto-detect (num_cpus / 2)
    pub workers: usize,
    /// Maximum number of queued tasks waiting for a worker
    pub queue_size: usize,
}

impl Default for HookPoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 10,
        }
    }
}

impl HookPoolConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            (num_cpus::get() / 2).clamp(2, 16) // Min 2, max 16
        } else {
            self.workers
        }
    }
}

/// Point-in-time counters of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookPoolStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed_programs: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed_programs: AtomicU64,
}

struct HookTask {
    context: HookContext,
}

/// Hook worker thread
struct HookWorker {
    worker_id: usize,
    thread_handle: Option<JoinHandle<()>>,
}

impl HookWorker {
    fn spawn(
        worker_id: usize,
        work_rx: Receiver<HookTask>,
        programs: Arc<[Arc<dyn HookProgram>]>,
        counters: Arc<Counters>,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("hook-worker-{worker_id}"))
            .spawn(move || {
                debug!("Hook worker {} started", worker_id);

                // Exits once every sender is gone and the queue is drained
                while let Ok(task) = work_rx.recv() {
                    let start = Instant::now();
                    let failed = run_programs(&programs, &task.context);
                    counters
                        .failed_programs
                        .fetch_add(failed, Ordering::Relaxed);
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Hook task completed in {:?} on worker {}",
                        start.elapsed(),
                        worker_id
                    );
                }

                debug!("Hook worker {} shutting down", worker_id);
            })?;

        Ok(Self {
            worker_id,
            thread_handle: Some(handle),
        })
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for hook worker {} to finish", self.worker_id);
            if handle.join().is_err() {
                warn!("Hook worker {} panicked", self.worker_id);
            }
        }
    }
}

/// Run every program against one session. Returns the number that failed.
fn run_programs(programs: &[Arc<dyn HookProgram>], context: &HookContext) -> u64 {
    let mut session = HookSession::new(context);
    let mut failed = 0;
    for program in programs {
        if let Err(e) = program.execute(&mut session) {
            warn!(hook = program.name(), error = %e, "Hook program failed");
            failed += 1;
        }
    }
    failed
}

/// Fixed-size pool with a bounded queue. Submission never blocks: when the
/// queue is full the task is rejected.
pub struct HookPool {
    workers: Mutex<Vec<HookWorker>>,
    work_tx: Mutex<Option<Sender<HookTask>>>,
    counters: Arc<Counters>,
    config: HookPoolConfig,
}

impl HookPool {
    pub fn new(
        config: HookPoolConfig,
        programs: Vec<Arc<dyn HookProgram>>,
    ) -> std::io::Result<Self> {
        let worker_count = config.effective_workers();
        info!(
            "Creating hook pool with {} workers, queue size {}",
            worker_count, config.queue_size
        );

        let (work_tx, work_rx) = bounded(config.queue_size);
        let programs: Arc<[Arc<dyn HookProgram>]> = programs.into();
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(HookWorker::spawn(
                worker_id,
                work_rx.clone(),
                Arc::clone(&programs),
                Arc::clone(&counters),
            )?);
        }

        Ok(Self {
            workers: Mutex::new(workers),
            work_tx: Mutex::new(Some(work_tx)),
            counters,
            config,
        })
    }

    pub fn submit(&self, context: HookContext) -> Result<(), HookError> {
        let guard = self.work_tx.lock();
        let Some(work_tx) = guard.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(HookError::ShutDown);
        };

        match work_tx.try_send(HookTask { context }) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(HookError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(HookError::ShutDown)
            }
        }
    }

    pub fn stats(&self) -> HookPoolStats {
        HookPoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed_programs: self.counters.failed_programs.load(Ordering::Relaxed),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn config(&self) -> &HookPoolConfig {
        &self.config
    }

    /// Close the queue and wait for workers to finish what was already queued.
    pub fn shutdown(&self) {
        let Some(work_tx) = self.work_tx.lock().take() else {
            return;
        };
        drop(work_tx);

        let mut workers = self.workers.lock();
        info!("Shutting down hook pool with {} workers", workers.len());
        for worker in workers.iter_mut() {
            worker.join();
        }
        info!("Hook pool shutdown complete");
    }
}

impl Drop for HookPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::IncomingRequest;
    use crate::response::SynthesizedResponse;
    use bytes::Bytes;
    use crossbeam::channel::unbounded;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        name: String,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl HookProgram for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(&self, _session: &mut HookSession) -> Result<(), HookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HookError::Runtime {
                    name: self.name.clone(),
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Blocks until a permit arrives.
    struct Gate {
        permits: Receiver<()>,
    }

    impl HookProgram for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn execute(&self, _session: &mut HookSession) -> Result<(), HookError> {
            let _ = self.permits.recv();
            Ok(())
        }
    }

    fn context() -> HookContext {
        let request = IncomingRequest::new("GET", "/", "HTTP/1.1", vec![], Bytes::new());
        HookContext::new(&request, &SynthesizedResponse::bad_request())
    }

    fn counting(name: &str, calls: &Arc<AtomicUsize>, fail: bool) -> Arc<dyn HookProgram> {
        Arc::new(Counting {
            name: name.to_string(),
            calls: Arc::clone(calls),
            fail,
        })
    }

    #[test]
    fn test_default_config() {
        let config = HookPoolConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_size, 10);
        assert_eq!(config.effective_workers(), 10);
    }

    #[test]
    fn test_auto_worker_count() {
        let config = HookPoolConfig {
            workers: 0,
            queue_size: 4,
        };
        let workers = config.effective_workers();
        assert!((2..=16).contains(&workers));
    }

    #[test]
    fn test_failing_program_does_not_stop_others() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let pool = HookPool::new(
            HookPoolConfig {
                workers: 2,
                queue_size: 16,
            },
            vec![counting("first", &first, true), counting("second", &second, false)],
        )
        .unwrap();
        assert_eq!(pool.worker_count(), 2);

        for _ in 0..5 {
            pool.submit(context()).unwrap();
        }
        pool.shutdown();

        assert_eq!(first.load(Ordering::SeqCst), 5);
        assert_eq!(second.load(Ordering::SeqCst), 5);
        let stats = pool.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.failed_programs, 5);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (permit_tx, permit_rx) = unbounded();
        let pool = HookPool::new(
            HookPoolConfig {
                workers: 1,
                queue_size: 1,
            },
            vec![Arc::new(Gate { permits: permit_rx })],
        )
        .unwrap();

        // One task running (blocked) plus one queued is the most the pool can hold.
        let results: Vec<_> = (0..3).map(|_| pool.submit(context())).collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(HookError::QueueFull))));

        for _ in 0..3 {
            permit_tx.send(()).unwrap();
        }
        pool.shutdown();

        let stats = pool.stats();
        assert!(stats.rejected >= 1);
        assert_eq!(stats.submitted + stats.rejected, 3);
        assert_eq!(stats.completed, stats.submitted);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = HookPool::new(
            HookPoolConfig {
                workers: 1,
                queue_size: 1,
            },
            vec![counting("noop", &calls, false)],
        )
        .unwrap();
        pool.shutdown();
        assert!(matches!(pool.submit(context()), Err(HookError::ShutDown)));
        // Second shutdown is a no-op
        pool.shutdown();
    }
}
