//! The one-shot awaitable handed to a handler for each inbound MWA method
//! call.
//!
//! A [`RequestFuture`] is created by [`crate::mwa::server::MwaServer`] for
//! every inbound request it accepts, and is resolved by the UI/signer layer
//! with exactly one terminal [`Verdict`]. Resolution is built on
//! [`tokio::sync::oneshot`] so that the signer can run on any executor and
//! simply move the future's sender across to wherever resolution happens.
//! The sender lives behind a `Mutex<Option<_>>` rather than being consumed
//! by value, so that a handler which retains or clones its `RequestFuture`
//! and resolves it twice (e.g. from two racing tasks) observes the
//! idempotent no-op behavior rather than a compile-time move error masking
//! what is really a handler bug.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::mwa::types::{CommitmentLevel, Verdict};

/// Handle returned to a handler when it receives a typed MWA request.
///
/// Exactly one `complete*` call should succeed; all later calls on any clone
/// of the same future are no-ops that return `false`.
#[derive(Clone)]
pub struct RequestFuture {
    sender: Arc<Mutex<Option<oneshot::Sender<Verdict>>>>,
    payload_count: usize,
}

/// The other end of a [`RequestFuture`]: awaited by [`crate::mwa::server`]
/// once it has handed the future to a handler.
pub struct RequestOutcome {
    receiver: oneshot::Receiver<Verdict>,
}

/// Creates a linked `(RequestFuture, RequestOutcome)` pair for a request
/// carrying `payload_count` payloads (0 for `authorize`, which has no
/// payload-shaped verdicts).
pub fn request_future(payload_count: usize) -> (RequestFuture, RequestOutcome) {
    let (tx, rx) = oneshot::channel();
    (
        RequestFuture {
            sender: Arc::new(Mutex::new(Some(tx))),
            payload_count,
        },
        RequestOutcome { receiver: rx },
    )
}

impl RequestOutcome {
    /// Awaits the handler's verdict.
    ///
    /// Resolves to `None` if the future was dropped without being resolved
    /// (e.g. the handler panicked, or the UI layer discarded it on transport
    /// loss) — the caller should treat that the same as `Cancelled`.
    pub async fn wait(self) -> Option<Verdict> {
        self.receiver.await.ok()
    }
}

impl RequestFuture {
    /// Resolves with a successful result verdict.
    pub fn complete(&self, result: Value) -> bool {
        self.resolve(Verdict::Success(result))
    }

    /// Resolves with a decline verdict: the user rejected the request.
    pub fn complete_with_decline(&self) -> bool {
        self.resolve(Verdict::Declined)
    }

    /// Resolves indicating the auth token needs to be refreshed.
    pub fn complete_with_reauthorization_required(&self) -> bool {
        self.resolve(Verdict::ReauthorizationRequired)
    }

    /// Resolves indicating the auth token is not valid for this operation.
    pub fn complete_with_auth_token_not_valid(&self) -> bool {
        self.resolve(Verdict::AuthTokenNotValid)
    }

    /// Resolves with a per-payload validity vector.
    ///
    /// `valid.len()` must equal the request's payload count, and at least
    /// one entry must be `false` — violating either is a handler
    /// precondition error, reported as [`PreconditionError`] rather than
    /// silently accepted or sent to the wire.
    pub fn complete_with_invalid_payloads(
        &self,
        valid: Vec<bool>,
    ) -> Result<bool, PreconditionError> {
        if valid.len() != self.payload_count {
            return Err(PreconditionError::LengthMismatch {
                expected: self.payload_count,
                actual: valid.len(),
            });
        }
        if valid.iter().all(|v| *v) {
            return Err(PreconditionError::NoInvalidEntry);
        }
        Ok(self.resolve(Verdict::InvalidPayloads { valid }))
    }

    /// Resolves with signatures plus a per-transaction commitment vector.
    /// Only valid for `sign_and_send_transaction`.
    ///
    /// Both vectors must have length equal to the request's payload count,
    /// and at least one `committed` entry must be `false`.
    pub fn complete_with_not_committed(
        &self,
        signatures: Vec<Vec<u8>>,
        committed: Vec<bool>,
    ) -> Result<bool, PreconditionError> {
        if signatures.len() != self.payload_count {
            return Err(PreconditionError::LengthMismatch {
                expected: self.payload_count,
                actual: signatures.len(),
            });
        }
        if committed.len() != self.payload_count {
            return Err(PreconditionError::LengthMismatch {
                expected: self.payload_count,
                actual: committed.len(),
            });
        }
        if committed.iter().all(|c| *c) {
            return Err(PreconditionError::NoUncommittedEntry);
        }
        Ok(self.resolve(Verdict::NotCommitted {
            signatures,
            committed,
        }))
    }

    /// Resolves with an internal-failure verdict, mapped to `-32603` on the
    /// wire without leaking `message` to the peer.
    pub fn complete_with_internal_error(&self, message: impl Into<String>) -> bool {
        self.resolve(Verdict::Internal(message.into()))
    }

    /// The number of payloads in the originating request (0 for `authorize`).
    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    fn resolve(&self, verdict: Verdict) -> bool {
        let mut guard = self
            .sender
            .lock()
            .expect("RequestFuture mutex is never held across a panic point");
        match guard.take() {
            Some(sender) => {
                // The receiver may already be gone (transport torn down);
                // that's fine, the verdict is simply discarded.
                let _ = sender.send(verdict);
                true
            }
            None => false,
        }
    }
}

/// A precondition violation raised by a `complete_with_*` method: a handler
/// bug, never a protocol error. These are kept strictly
/// separate from wire-visible domain errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("vector length {actual} does not match request payload count {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid_payloads verdict requires at least one `false` entry")]
    NoInvalidEntry,
    #[error("not_committed verdict requires at least one `false` commitment entry")]
    NoUncommittedEntry,
}

/// Re-exported for handlers that need to describe a commitment level without
/// depending on `crate::mwa::types` directly.
pub type Commitment = CommitmentLevel;
