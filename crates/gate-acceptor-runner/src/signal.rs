// gate-acceptor-runner/src/signal.rs
// ============================================================================
// Module: Cancellation Signal
// Description: Watch-channel based cancellation shared by runs and workers.
// Purpose: Let one trigger stop the scheduler, the dispatcher, and children.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! A [`CancelSignal`] is a `watch::Receiver<bool>` that flips to `true` once.
//! Receivers are cheap to clone into every worker. A dropped sender means
//! cancellation can never arrive, so [`cancelled`] then waits forever.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::pending;

use tokio::sync::watch;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Receiver side of a run cancellation flag.
pub type CancelSignal = watch::Receiver<bool>;

/// Creates a fresh, untriggered cancellation channel.
#[must_use]
pub fn cancel_channel() -> (watch::Sender<bool>, CancelSignal) {
    watch::channel(false)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when cancellation has already been requested.
#[must_use]
pub fn is_cancelled(signal: &CancelSignal) -> bool {
    *signal.borrow()
}

/// Resolves once the signal is set.
pub async fn cancelled(mut signal: CancelSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}
