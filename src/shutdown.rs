//! Ctrl+C handling.
//!
//! An interrupt while an operation runs cancels that operation cooperatively:
//! it stops at its next batch or page boundary, flushes what it has, and the
//! caller says goodbye. An interrupt while idle (e.g. at a prompt) exits
//! straight away. A second interrupt during an operation exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Printed whenever the user interrupts the tool
pub const FAREWELL: &str = "You chose to interrupt, goodbye!";

pub fn say_goodbye() {
    println!("\n{FAREWELL}");
}

#[derive(Debug, Clone, Default)]
pub struct InterruptGuard {
    cancel: CancellationToken,
    busy: Arc<AtomicBool>,
}

impl InterruptGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to operations
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Marks an operation as running until the returned guard drops
    #[must_use]
    pub fn busy(&self) -> BusyGuard {
        self.busy.store(true, Ordering::SeqCst);
        BusyGuard {
            busy: Arc::clone(&self.busy),
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Reacts to one interrupt. Returns `true` when the process should exit now.
    pub fn interrupt(&self) -> bool {
        if self.is_busy() && !self.cancel.is_cancelled() {
            info!("Interrupt received, stopping after the current step");
            self.cancel.cancel();
            false
        } else {
            true
        }
    }

    /// Spawns the Ctrl+C listener; must be called inside a Tokio runtime
    pub fn listen(&self) {
        let guard = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to install Ctrl+C handler: {e}");
                    return;
                }
                if guard.interrupt() {
                    say_goodbye();
                    std::process::exit(0);
                }
            }
        });
    }
}

/// Clears the busy flag on drop
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
