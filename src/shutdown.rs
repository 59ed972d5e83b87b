//! Shutdown coordinator
//!
//! Reaps every worker thread against one shared deadline. Workers still
//! running when it passes have their sockets shut down, which unblocks the
//! pending read, and are waited on once more against a second deadline.
//! Remaining sessions are closed last.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::registry::{Registry, WorkerHandle};

/// Interval between `is_finished` checks while waiting on workers
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a server teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited before the first deadline
    pub joined: usize,
    /// Workers that needed their socket shut down first
    pub forced: usize,
    /// Workers still running after the second deadline (detached)
    pub abandoned: usize,
    /// Sessions closed after all workers were reaped
    pub closed: usize,
}

/// Join every worker that finishes within `timeout`
///
/// The deadline is shared by the whole batch. Returns the number joined and
/// the workers still running.
pub fn join_all(workers: Vec<WorkerHandle>, timeout: Duration) -> (usize, Vec<WorkerHandle>) {
    let deadline = Instant::now() + timeout;
    let mut pending = workers;
    let mut joined = 0;

    loop {
        let (finished, running): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|worker| worker.handle.is_finished());
        for worker in finished {
            if worker.handle.join().is_err() {
                warn!("Worker for session {} panicked", worker.id);
            }
            joined += 1;
        }

        pending = running;
        if pending.is_empty() || Instant::now() >= deadline {
            return (joined, pending);
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
}

/// Bounded-time teardown of all workers
#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(join_timeout: Duration) -> Self {
        Self { join_timeout }
    }

    /// Join every live worker, force the stragglers, then close what remains
    ///
    /// Takes at most two join timeouts regardless of the number of workers.
    pub fn shutdown(&self, registry: &Registry) -> ShutdownReport {
        let workers = registry.drain_workers();
        info!("Shutting down {} worker(s)", workers.len());

        let mut report = ShutdownReport::default();
        let (joined, stalled) = join_all(workers, self.join_timeout);
        report.joined = joined;

        if !stalled.is_empty() {
            warn!("{} worker(s) timed out, closing their sockets", stalled.len());
            for worker in &stalled {
                worker.socket.close();
            }

            let (forced, stuck) = join_all(stalled, self.join_timeout);
            report.forced = forced;
            report.abandoned = stuck.len();
            for worker in stuck {
                error!("Worker for session {} did not stop, detaching", worker.id);
            }
        }

        report.closed = registry.close_all();
        info!(
            "Shutdown complete: {} joined, {} forced, {} abandoned, {} closed",
            report.joined, report.forced, report.abandoned, report.closed
        );
        report
    }
}
