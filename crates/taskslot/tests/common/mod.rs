/*
[INPUT]:  Test error types and operation probes
[OUTPUT]: Shared fixtures for holder integration tests
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for taskslot tests

use thiserror::Error;
use tokio::sync::oneshot;

/// Declared error type of the holders under test
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// A failure that is not an `AppError`
#[derive(Debug, Error)]
#[error("socket closed")]
pub struct SocketClosed;

/// Signals through a oneshot when the owning operation future is dropped.
pub struct DropProbe {
    tx: Option<oneshot::Sender<()>>,
}

impl DropProbe {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}
