//! One-shot broadcast signal.
//!
//! A [`Signal`] starts unsignaled and can be fired exactly once. Any number
//! of tasks may wait on it; waiting after it fired returns immediately.
//! Everything written before [`Signal::fire`] is visible to a task once its
//! [`Signal::wait`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal and wake every waiter.
    ///
    /// Returns true for the one call that performed the transition.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Wait until the signal has fired.
    ///
    /// Cancel safe: dropping the future leaves the signal untouched.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag, otherwise a fire() landing in
        // between would be missed.
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}
