use std::cmp::max;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide logical clock.
///
/// `observe` folds in a peer's clock on every send/receive, so timestamps
/// taken with `get` order concurrent writers across clients.
#[derive(Debug, Default)]
pub struct LamportClock(AtomicU64);

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Advances to `max(local, peer) + 1` and returns the new value.
    pub fn observe(&self, peer: u64) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(max(current, peer) + 1)
            })
            .expect("fetch_update closure always returns Some");
        max(previous, peer) + 1
    }
}
