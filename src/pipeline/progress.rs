use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives best-effort frame completion updates.
///
/// Called from worker threads; `done` values may arrive out of order.
pub trait ProgressObserver: Send + Sync {
    fn frames_completed(&self, done: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn frames_completed(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Shared count of finished frames.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    completed: AtomicUsize,
    total: usize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Record one finished frame and return the new count.
    pub fn complete_one(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
