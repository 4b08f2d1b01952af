//! Cooperative cancellation shared between the caller and a running engine.
//!
//! CHANGELOG:
//! - 10/02/2026 - Initial implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable "stop requested" flag.
///
/// Engines poll it at fixed points (top of each outer loop iteration and
/// mid-send); nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running engine to stop at its next poll point.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new run starts.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!other.is_stopped());

        flag.request_stop();
        assert!(other.is_stopped());

        other.reset();
        assert!(!flag.is_stopped());
    }

    #[test]
    fn test_visible_across_threads() {
        let flag = StopFlag::new();
        let worker = flag.clone();
        std::thread::spawn(move || worker.request_stop())
            .join()
            .unwrap();
        assert!(flag.is_stopped());
    }
}
