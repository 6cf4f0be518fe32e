//! JSON-RPC 2.0 framing and the full-duplex endpoint engine.

pub mod codec;
pub mod endpoint;
pub mod future;

pub use codec::{ParseError, RequestId};
pub use endpoint::{CallError, CallHandle, RpcEndpoint, RpcEndpointConfig};
pub use future::{request_future, PreconditionError, RequestFuture, RequestOutcome};
