//! MWA domain error codes and the client's flattened typed
//! error enumeration.

use serde_json::Value;

use crate::rpc::codec::RpcErrorObject;

/// Domain error codes allocated by MWA, as fixed negative integers outside
/// the standard JSON-RPC range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainCode {
    AuthorizationFailed,
    Reauthorize,
    NotSigned,
    InvalidPayload,
    NotCommitted,
}

impl DomainCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::AuthorizationFailed => -1,
            Self::Reauthorize => -2,
            Self::NotSigned => -3,
            Self::InvalidPayload => -4,
            Self::NotCommitted => -5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::AuthorizationFailed),
            -2 => Some(Self::Reauthorize),
            -3 => Some(Self::NotSigned),
            -4 => Some(Self::InvalidPayload),
            -5 => Some(Self::NotCommitted),
            _ => None,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::AuthorizationFailed => "authorization failed",
            Self::Reauthorize => "reauthorization required",
            Self::NotSigned => "not signed",
            Self::InvalidPayload => "invalid payload",
            Self::NotCommitted => "not committed",
        }
    }

    pub fn with_data(self, data: Value) -> RpcErrorObject {
        RpcErrorObject::with_data(self.code(), self.message(), data)
    }
}

impl From<DomainCode> for RpcErrorObject {
    fn from(code: DomainCode) -> Self {
        RpcErrorObject::new(code.code(), code.message())
    }
}

/// Raised while validating a method's wire parameters. Always mapped to
/// JSON-RPC `-32602` by the server before any handler is invoked.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("params must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("{0}")]
    MalformedEncoding(&'static str),
    #[error("`privileged_methods` must be non-empty")]
    EmptyPrivilegedMethods,
    #[error("unknown privileged method `{0}`")]
    UnknownPrivilegedMethod(String),
    #[error("`payloads` must be non-empty")]
    EmptyPayloads,
    #[error("payload at index {0} is empty")]
    EmptyPayloadEntry(usize),
    #[error("`auth_token` must be non-empty")]
    EmptyAuthToken,
    #[error("invalid `commitment` level `{0}`")]
    InvalidCommitment(String),
    #[error("identity.uri must be absolute and hierarchical")]
    InvalidIdentityUri,
    #[error("identity.icon must be a relative URI")]
    InvalidIdentityIcon,
    #[error("identity.name must be non-empty")]
    InvalidIdentityName,
}

impl From<ParamError> for RpcErrorObject {
    fn from(err: ParamError) -> Self {
        use crate::rpc::codec::standard_error::INVALID_PARAMS;
        RpcErrorObject::new(INVALID_PARAMS, err.to_string())
    }
}

/// The client's flattened, typed error enumeration: every
/// remote-error code and every local/framing failure collapses into one
/// `match`-able set.
#[derive(Debug, thiserror::Error)]
pub enum MwaClientError {
    #[error("request was declined by the user")]
    Declined,
    #[error("the auth token needs to be refreshed")]
    ReauthorizationRequired,
    #[error("the auth token is not valid for this operation")]
    AuthorizationFailed,
    #[error("{} of {} payloads were rejected", valid.iter().filter(|v| !**v).count(), valid.len())]
    InvalidPayload { valid: Vec<bool> },
    #[error("{} of {} transactions were not committed", committed.iter().filter(|c| !**c).count(), committed.len())]
    NotCommitted {
        signatures: Vec<Vec<u8>>,
        committed: Vec<bool>,
    },
    #[error("remote error {code}: {message}")]
    RemoteError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("response shape did not match the request: {0}")]
    InvalidResponse(String),
    #[error("the call timed out")]
    Timeout,
    #[error("the call was cancelled")]
    Cancelled,
    #[error("transport error")]
    Transport,
}
