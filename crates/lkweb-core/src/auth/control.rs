//! View model for the single login control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const IDLE_LABEL: &str = "Log in with Kakao";
const BUSY_LABEL: &str = "Logging in...";

/// Disabled with a busy label while a login attempt is pending.
#[derive(Debug, Clone, Default)]
pub struct LoginControl {
    busy: Arc<AtomicBool>,
}

impl LoginControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_busy()
    }

    pub fn label(&self) -> &'static str {
        if self.is_busy() {
            BUSY_LABEL
        } else {
            IDLE_LABEL
        }
    }

    /// Mark the control busy until the returned guard is dropped.
    ///
    /// Returns `None` if it is already busy.
    pub fn begin(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// Re-enables the login control on drop.
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_follows_busy_state() {
        let control = LoginControl::new();
        assert!(control.is_enabled());
        assert_eq!(control.label(), IDLE_LABEL);

        let guard = control.begin().unwrap();
        assert!(!control.is_enabled());
        assert_eq!(control.label(), BUSY_LABEL);

        drop(guard);
        assert!(control.is_enabled());
        assert_eq!(control.label(), IDLE_LABEL);
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let control = LoginControl::new();
        let _guard = control.begin().unwrap();
        assert!(control.clone().begin().is_none());
    }
}
