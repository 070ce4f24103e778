// SPDX-License-Identifier: MIT
//! Bounds concurrency across a job's files and, within the scheduler's
//! shared connection pool, across one file's multipart connections.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// `max_active_files` files run in parallel; each borrows up to
/// `connections_per_file` slots from a pool sized `A * C`, so one file
/// never starves the others of every connection but also never exceeds its
/// own per-file cap.
#[derive(Clone)]
pub struct Scheduler {
    file_slots: Arc<Semaphore>,
    connection_slots: Arc<Semaphore>,
    connections_per_file: usize,
    cancellation: CancellationToken,
}

/// A held set of permits for one active file: one file slot, plus whatever
/// connection slots its multipart strategy actually uses.
pub struct FilePermit<'a> {
    _file_permit: tokio::sync::SemaphorePermit<'a>,
    connection_slots: &'a Semaphore,
    connections_per_file: usize,
}

impl<'a> FilePermit<'a> {
    /// Acquire up to `connections_per_file` connection permits, or fewer if
    /// `n` is smaller (single-stream downloads only need one).
    pub async fn acquire_connections(&self, n: usize) -> tokio::sync::SemaphorePermit<'_> {
        let n = n.min(self.connections_per_file).max(1);
        self.connection_slots
            .acquire_many(n as u32)
            .await
            .expect("connection semaphore is never closed")
    }
}

impl Scheduler {
    pub fn new(max_active_files: usize, connections_per_file: usize) -> Self {
        let total_connections = (max_active_files * connections_per_file).max(1);
        Scheduler {
            file_slots: Arc::new(Semaphore::new(max_active_files.max(1))),
            connection_slots: Arc::new(Semaphore::new(total_connections)),
            connections_per_file,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn connections_per_file(&self) -> usize {
        self.connections_per_file
    }

    /// Admit one file into the active set, FIFO with respect to the order
    /// callers request admission in (planner order, if the caller iterates
    /// the plan in order). Completion order is not guaranteed to match.
    pub async fn admit(&self) -> FilePermit<'_> {
        let permit = self
            .file_slots
            .acquire()
            .await
            .expect("file semaphore is never closed");
        FilePermit {
            _file_permit: permit,
            connection_slots: &self.connection_slots,
            connections_per_file: self.connections_per_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_max_active_files() {
        let scheduler = Scheduler::new(2, 4);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let scheduler = scheduler.clone();
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = scheduler.admit().await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn connection_permit_never_exceeds_per_file_cap() {
        let scheduler = Scheduler::new(1, 3);
        let permit = scheduler.admit().await;
        let held = permit.acquire_connections(10).await;
        // acquire_many clamps to connections_per_file (3), not the
        // requested 10, which we can't observe directly here but at least
        // confirm it didn't block forever asking for more than the pool.
        drop(held);
    }

    #[tokio::test]
    async fn cancellation_token_propagates() {
        let scheduler = Scheduler::new(1, 1);
        let token = scheduler.cancellation();
        assert!(!token.is_cancelled());
        scheduler.cancel();
        assert!(token.is_cancelled());
    }
}
