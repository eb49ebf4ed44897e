//! Cooperative cancellation and pause signals
//!
//! Thin wrappers over `tokio::sync::watch`. A cancel token is an observable
//! boolean checked around every await point in the engine; the receiving
//! side can also await the flip to cancel an in-flight LLM or tool call.

use tokio::sync::watch;

/// Sender side of a cancel signal
#[derive(Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Flip the flag. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether the flag has been flipped
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of a cancel signal
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/// Create a connected cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle {
            tx: std::sync::Arc::new(tx),
        },
        CancelToken { rx },
    )
}

/// Sender side of a pause signal
#[derive(Clone)]
pub struct PauseHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl PauseHandle {
    pub fn pause(&self) {
        let _ = self.tx.send(true);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(false);
    }

    pub fn token(&self) -> PauseToken {
        PauseToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of a pause signal
#[derive(Clone)]
pub struct PauseToken {
    rx: watch::Receiver<bool>,
}

impl PauseToken {
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a connected pause handle/token pair.
pub fn pause_pair() -> (PauseHandle, PauseToken) {
    let (tx, rx) = watch::channel(false);
    (
        PauseHandle {
            tx: std::sync::Arc::new(tx),
        },
        PauseToken { rx },
    )
}
