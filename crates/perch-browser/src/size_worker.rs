//! Runs size walks on a dedicated thread so callers never block on disk I/O.
//!
//! One worker thread is spawned on first use and kept alive. Requests carry a
//! correlation id and wait on a oneshot reply. A panic inside a walk fails
//! every pending request and discards the worker; the next request starts a
//! new one.

use crate::size::{SizeLimits, SizeStats, measure_dir};
use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tokio::sync::oneshot;

/// Anything that can measure a directory asynchronously.
#[async_trait]
pub trait SizeBackend: Send + Sync {
    async fn measure(&self, dir: &Path, limits: SizeLimits) -> SizeStats;
}

pub type MeasureFn = Arc<dyn Fn(&Path, SizeLimits) -> SizeStats + Send + Sync>;

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Measured(SizeStats),
    /// A walk panicked; carries the panic message.
    Crashed(String),
    /// The worker stopped with the request still queued.
    Exited,
    /// The request could not be handed to the worker.
    PostFailed,
}

impl WorkerReply {
    pub fn into_stats(self) -> SizeStats {
        match self {
            WorkerReply::Measured(stats) => stats,
            WorkerReply::Crashed(message) => {
                tracing::warn!("Size worker crashed: {}", message);
                SizeStats::failed("worker-crashed")
            }
            WorkerReply::Exited => SizeStats::failed("worker-exited"),
            WorkerReply::PostFailed => SizeStats::failed("worker-post-failed"),
        }
    }
}

struct Job {
    id: u64,
    dir: PathBuf,
    limits: SizeLimits,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<WorkerReply>>>,
    /// Generation and job queue of the live worker, if any.
    current: Mutex<Option<(u64, Sender<Job>)>>,
    next_id: AtomicU64,
    generations: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<WorkerReply>>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn current(&self) -> MutexGuard<'_, Option<(u64, Sender<Job>)>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self, id: u64, reply: WorkerReply) {
        if let Some(tx) = self.pending().remove(&id) {
            let _ = tx.send(reply);
        }
    }

    fn fail_all(&self, reply: WorkerReply) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            tracing::warn!("Failing {} pending size requests: {:?}", drained.len(), reply);
        }
        for (_, tx) in drained {
            let _ = tx.send(reply.clone());
        }
    }

    /// Forget the worker of `generation`. False if a newer one is live.
    fn detach(&self, generation: u64) -> bool {
        let mut current = self.current();
        match current.as_ref() {
            Some((live, _)) if *live == generation => {
                *current = None;
                true
            }
            _ => false,
        }
    }
}

/// Fails whatever is still pending if the worker thread ends on its own.
struct ExitGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.shared.detach(self.generation) {
            self.shared.fail_all(WorkerReply::Exited);
        }
    }
}

pub struct SizeWorker {
    shared: Arc<Shared>,
    measure: MeasureFn,
}

impl Default for SizeWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeWorker {
    pub fn new() -> Self {
        let measure: MeasureFn = Arc::new(measure_dir);
        Self::with_measure(measure)
    }

    /// Use a different walk function.
    pub fn with_measure(measure: MeasureFn) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            measure,
        }
    }

    /// How many worker threads have been started so far.
    pub fn generations(&self) -> u64 {
        self.shared.generations.load(Ordering::SeqCst)
    }

    pub async fn request(&self, dir: &Path, limits: SizeLimits) -> WorkerReply {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id, tx);

        let job = Job {
            id,
            dir: dir.to_path_buf(),
            limits,
        };
        match self.ensure_worker() {
            Ok((generation, queue)) => {
                if queue.send(job).is_err() {
                    self.shared.detach(generation);
                    self.shared.resolve(id, WorkerReply::PostFailed);
                }
            }
            Err(e) => {
                tracing::warn!("Could not start size worker: {}", e);
                self.shared.resolve(id, WorkerReply::PostFailed);
            }
        }

        rx.await.unwrap_or(WorkerReply::Exited)
    }

    /// Stop the worker once its queue drains.
    pub fn shutdown(&self) {
        self.shared.current().take();
    }

    fn ensure_worker(&self) -> std::io::Result<(u64, Sender<Job>)> {
        let mut current = self.shared.current();
        if let Some((generation, queue)) = current.as_ref() {
            return Ok((*generation, queue.clone()));
        }

        let (queue, jobs) = unbounded();
        let generation = self.shared.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let measure = Arc::clone(&self.measure);
        thread::Builder::new()
            .name(format!("perch-size-worker-{}", generation))
            .spawn(move || run_worker(shared, measure, jobs, generation))?;

        tracing::debug!("Started size worker generation {}", generation);
        *current = Some((generation, queue.clone()));
        Ok((generation, queue))
    }
}

impl Drop for SizeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl SizeBackend for SizeWorker {
    async fn measure(&self, dir: &Path, limits: SizeLimits) -> SizeStats {
        self.request(dir, limits).await.into_stats()
    }
}

fn run_worker(shared: Arc<Shared>, measure: MeasureFn, jobs: Receiver<Job>, generation: u64) {
    let _guard = ExitGuard {
        shared: Arc::clone(&shared),
        generation,
    };

    while let Ok(job) = jobs.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| measure(&job.dir, job.limits)));
        match outcome {
            Ok(stats) => shared.resolve(job.id, WorkerReply::Measured(stats)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                if shared.detach(generation) {
                    shared.fail_all(WorkerReply::Crashed(message));
                }
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
