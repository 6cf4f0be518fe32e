//! Shared request/result/verdict types for the four MWA methods.
//!
//! These are the Rust-native counterparts of the protocol's prose data
//! model: both [`crate::mwa::server`] and [`crate::mwa::client`] depend on
//! this one definition, rather than each re-deriving their own shape from
//! the wire JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A privileged method a dapp may request at `authorize` time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegedMethod {
    SignTransaction,
    SignMessage,
    SignAndSendTransaction,
}

impl PrivilegedMethod {
    /// Parses a method name as it appears on the wire, e.g. in
    /// `privileged_methods`. Returns `None` for an unrecognized name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sign_transaction" => Some(Self::SignTransaction),
            "sign_message" => Some(Self::SignMessage),
            "sign_and_send_transaction" => Some(Self::SignAndSendTransaction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignTransaction => "sign_transaction",
            Self::SignMessage => "sign_message",
            Self::SignAndSendTransaction => "sign_and_send_transaction",
        }
    }
}

/// The dapp's self-reported identity, as passed to `authorize`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<url::Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Blockchain finality target for `sign_and_send_transaction`.
///
/// Ordered `Processed < Confirmed < Finalized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "processed" => Some(Self::Processed),
            "confirmed" => Some(Self::Confirmed),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Typed request for the `authorize` method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub identity: Option<Identity>,
    pub privileged_methods: Vec<PrivilegedMethod>,
}

/// Successful result of `authorize`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeResult {
    pub auth_token: String,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_uri_base: Option<url::Url>,
}

/// Which signing method a [`SignRequest`] is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignKind {
    SignTransaction,
    SignMessage,
    SignAndSendTransaction { commitment: CommitmentLevel },
}

/// Typed request shared by `sign_transaction`, `sign_message`, and
/// `sign_and_send_transaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub kind: SignKind,
    pub auth_token: String,
    pub payloads: Vec<Vec<u8>>,
}

impl SignRequest {
    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }
}

/// The terminal verdict a handler resolves a [`crate::rpc::future::RequestFuture`]
/// with. `Success` carries a pre-serialized JSON result because its shape
/// differs by method (authorize result vs. signed payloads vs. signatures);
/// [`crate::mwa::server`] builds that value from the method-specific typed
/// result before handing it to the future.
#[derive(Clone, Debug)]
pub enum Verdict {
    Success(Value),
    Declined,
    ReauthorizationRequired,
    AuthTokenNotValid,
    InvalidPayloads { valid: Vec<bool> },
    NotCommitted { signatures: Vec<Vec<u8>>, committed: Vec<bool> },
    Internal(String),
}
