//! Background lookups for the single-threaded engine.
//!
//! A [`ResolverPool`] owns worker threads that run blocking [`Resolve`]
//! calls. Finished lookups travel back over a channel and the owning loop is
//! woken through its [`Notifier`]; the loop thread then drains them with
//! [`ResolverPool::try_complete`]. Nothing here ever calls user code, so
//! delivery order and timing stay under the loop's control.
//!
//! A blocking resolver call cannot be interrupted, so a cancelled lookup
//! keeps its thread until the resolver returns. The pool is elastic: a job
//! submitted while every worker is busy gets a fresh worker, and workers
//! beyond the configured core count exit after idling for [`IDLE_LINGER`].

use super::{lookup, Address, AddressFamily, Name, Resolve};
use crate::base::neterror::NetError;
use crate::reactor::Notifier;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long a worker above the core count waits for work before exiting.
pub(crate) const IDLE_LINGER: Duration = Duration::from_secs(10);

struct Job<K> {
    key: K,
    name: Name,
    family: AddressFamily,
    cancelled: Arc<AtomicBool>,
}

/// A finished lookup, tagged with the key it was submitted under.
pub(crate) struct Completion<K> {
    pub(crate) key: K,
    pub(crate) result: Result<Vec<Address>, NetError>,
}

/// Handle to a submitted lookup; cancelling it suppresses delivery.
#[derive(Debug)]
pub(crate) struct Ticket {
    cancelled: Arc<AtomicBool>,
}

impl Ticket {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// State shared by every worker.
struct Shared<K> {
    resolver: Arc<dyn Resolve>,
    jobs: Receiver<Job<K>>,
    done: Sender<Completion<K>>,
    notifier: Notifier,
    /// Workers waiting for a job that no `submit` has claimed yet.
    idle: AtomicUsize,
}

impl<K> Shared<K> {
    /// Takes one idle worker off the count. Fails when none is left.
    fn claim_idle(&self) -> bool {
        self.idle.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)).is_ok()
    }
}

pub(crate) struct ResolverPool<K> {
    shared: Arc<Shared<K>>,
    jobs: Sender<Job<K>>,
    completions: Receiver<Completion<K>>,
    spawned: AtomicUsize,
}

impl<K: Send + 'static> ResolverPool<K> {
    pub(crate) fn new(
        resolver: Arc<dyn Resolve>,
        threads: usize,
        notifier: Notifier,
    ) -> Result<Self, NetError> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job<K>>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let threads = threads.max(1);

        let shared = Arc::new(Shared {
            resolver,
            jobs: jobs_rx,
            done: done_tx,
            notifier,
            idle: AtomicUsize::new(threads),
        });
        let pool = Self {
            shared,
            jobs: jobs_tx,
            completions: done_rx,
            spawned: AtomicUsize::new(0),
        };

        for _ in 0..threads {
            pool.spawn(None)?;
        }
        Ok(pool)
    }

    fn spawn(&self, first: Option<Job<K>>) -> Result<(), NetError> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let core = first.is_none();

        thread::Builder::new()
            .name(format!("evnet-resolver-{index}"))
            .spawn(move || worker(shared, first, core))
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to spawn resolver thread");
                NetError::HostResolverQueueTooLarge
            })
    }

    /// Queues a lookup. The result is picked up later by `try_complete`.
    pub(crate) fn submit(
        &self,
        key: K,
        name: Name,
        family: AddressFamily,
    ) -> Result<Ticket, NetError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let job = Job { key, name, family, cancelled: Arc::clone(&cancelled) };

        if self.shared.claim_idle() {
            self.jobs.send(job).map_err(|_| NetError::HostResolverQueueTooLarge)?;
        } else {
            tracing::trace!(domain = %job.name, "all resolver threads busy, adding one");
            self.spawn(Some(job))?;
        }
        Ok(Ticket { cancelled })
    }

    /// Returns the next finished lookup, if any.
    pub(crate) fn try_complete(&self) -> Option<Completion<K>> {
        match self.completions.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn has_completions(&self) -> bool {
        !self.completions.is_empty()
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn Resolve> {
        &self.shared.resolver
    }
}

fn worker<K>(shared: Arc<Shared<K>>, first: Option<Job<K>>, core: bool) {
    if let Some(job) = first {
        if !run(&shared, job) {
            return;
        }
        shared.idle.fetch_add(1, Ordering::AcqRel);
    }

    loop {
        let job = if core {
            // Exits once the pool drops its sender.
            match shared.jobs.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        } else {
            match shared.jobs.recv_timeout(IDLE_LINGER) {
                Ok(job) => job,
                Err(RecvTimeoutError::Disconnected) => return,
                // A failed claim means a job is already on its way to an idle worker.
                Err(RecvTimeoutError::Timeout) if shared.claim_idle() => return,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        };

        if !run(&shared, job) {
            return;
        }
        shared.idle.fetch_add(1, Ordering::AcqRel);
    }
}

/// Runs one job. Returns false once the pool is gone.
fn run<K>(shared: &Shared<K>, job: Job<K>) -> bool {
    if job.cancelled.load(Ordering::Acquire) {
        return true;
    }

    let result = lookup(shared.resolver.as_ref(), &job.name, job.family);
    if job.cancelled.load(Ordering::Acquire) {
        tracing::trace!(domain = %job.name, "dropping result of cancelled lookup");
        return true;
    }

    if shared.done.send(Completion { key: job.key, result }).is_err() {
        return false;
    }
    shared.notifier.notify();
    true
}
