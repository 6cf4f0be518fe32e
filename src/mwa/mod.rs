//! The MWA method algebra: typed requests/results/verdicts, domain error
//! codes, and the server/client dispatchers built on top of [`crate::rpc`].

pub mod client;
pub mod error;
pub mod server;
pub mod types;

pub use client::MwaClient;
pub use error::{DomainCode, MwaClientError, ParamError};
pub use server::{MwaHandlers, MwaServer};
pub use types::{
    AuthorizeRequest, AuthorizeResult, CommitmentLevel, Identity, PrivilegedMethod, SignKind,
    SignRequest, Verdict,
};
