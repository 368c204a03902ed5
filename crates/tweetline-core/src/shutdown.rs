//! Cooperative shutdown between pagination steps.
//!
//! Signal handlers only flip an atomic flag; the paginator polls it before
//! each request and winds the session down (final flush included).

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag set by the SIGINT/SIGTERM handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Handle to a shutdown flag
#[derive(Debug, Clone, Copy)]
pub struct Shutdown(&'static AtomicBool);

impl Shutdown {
    /// The process-wide flag
    pub fn global() -> Self {
        Self(shutdown_flag())
    }

    /// A handle on a caller-owned flag (tests, embedded runs)
    pub fn from_flag(flag: &'static AtomicBool) -> Self {
        Self(flag)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_flag_is_independent() {
        static LOCAL: AtomicBool = AtomicBool::new(false);
        let local = Shutdown::from_flag(&LOCAL);
        assert!(!local.is_requested());
        local.request();
        assert!(local.is_requested());
        assert!(!std::ptr::eq(local.0, shutdown_flag()));
    }
}
