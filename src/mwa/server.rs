//! Server-side MWA dispatcher: decodes each method's params, constructs the
//! typed request, hands it to an injected [`MwaHandlers`] implementation, and
//! maps the resulting verdict back to a JSON-RPC reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::json_pack::{pack_bools, pack_bytes, unpack_bytes};
use crate::mwa::error::{DomainCode, ParamError};
use crate::mwa::types::{
    AuthorizeRequest, AuthorizeResult, CommitmentLevel, Identity, PrivilegedMethod, SignKind,
    SignRequest, Verdict,
};
use crate::rpc::codec::RpcErrorObject;
use crate::rpc::endpoint::{Dispatcher, RpcEndpoint};
use crate::rpc::future::{request_future, PreconditionError, RequestFuture};
use crate::rpc::RequestId;

/// The four MWA method handlers a wallet endpoint implements.
///
/// Each method is handed the typed request plus a [`RequestFuture`] to
/// resolve. A handler is expected to return once it has handed the request
/// off (e.g. enqueued it for the UI) — it need not wait for the future to
/// resolve itself; [`MwaServer`] awaits the outcome independently.
#[async_trait]
pub trait MwaHandlers: Send + Sync {
    async fn authorize(&self, request: AuthorizeRequest, future: RequestFuture);
    async fn sign_transaction(&self, request: SignRequest, future: RequestFuture);
    async fn sign_message(&self, request: SignRequest, future: RequestFuture);
    async fn sign_and_send_transaction(&self, request: SignRequest, future: RequestFuture);
}

/// Builds the success result for `authorize`.
pub fn complete_authorize(future: &RequestFuture, result: AuthorizeResult) -> bool {
    future.complete(serde_json::to_value(result).expect("AuthorizeResult always serializes"))
}

/// Builds the success result for `sign_transaction`/`sign_message`, enforcing
/// that the output vector matches the request's payload count.
pub fn complete_signed_payloads(
    future: &RequestFuture,
    signed_payloads: Vec<Vec<u8>>,
) -> Result<bool, PreconditionError> {
    if signed_payloads.len() != future.payload_count() {
        return Err(PreconditionError::LengthMismatch {
            expected: future.payload_count(),
            actual: signed_payloads.len(),
        });
    }
    Ok(future.complete(serde_json::json!({ "signed_payloads": pack_bytes(&signed_payloads) })))
}

/// Builds the success result for `sign_and_send_transaction`, enforcing that
/// the signatures vector matches the request's payload count.
pub fn complete_signatures(
    future: &RequestFuture,
    signatures: Vec<Vec<u8>>,
) -> Result<bool, PreconditionError> {
    if signatures.len() != future.payload_count() {
        return Err(PreconditionError::LengthMismatch {
            expected: future.payload_count(),
            actual: signatures.len(),
        });
    }
    Ok(future.complete(serde_json::json!({ "signatures": pack_bytes(&signatures) })))
}

/// Which family a method belongs to, for verdict-to-wire mapping: a decline
/// means something different for `authorize` than for a signing method.
#[derive(Clone, Copy, PartialEq, Eq)]
enum MethodFamily {
    Authorize,
    Signing,
}

/// The server-side MWA dispatcher, parameterized by the handler
/// implementation supplied by the embedding wallet.
pub struct MwaServer<H> {
    handlers: Arc<H>,
}

impl<H: MwaHandlers + 'static> MwaServer<H> {
    pub fn new(handlers: H) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Converts this server into a [`Dispatcher`] suitable for
    /// [`RpcEndpoint::set_server`].
    pub fn into_dispatcher(self) -> Dispatcher {
        let handlers = self.handlers;
        Arc::new(move |endpoint: RpcEndpoint, id: RequestId, method: String, params: Option<Value>| {
            let handlers = handlers.clone();
            Box::pin(async move {
                dispatch(handlers.as_ref(), &endpoint, id, &method, params).await;
            })
        })
    }
}

async fn dispatch(
    handlers: &(dyn MwaHandlers + '_),
    endpoint: &RpcEndpoint,
    id: RequestId,
    method: &str,
    params: Option<Value>,
) {
    match method {
        "authorize" => dispatch_authorize(handlers, endpoint, id, params).await,
        "sign_transaction" => {
            dispatch_sign(
                handlers,
                endpoint,
                id,
                params,
                SignMethod::SignTransaction,
            )
            .await
        }
        "sign_message" => {
            dispatch_sign(handlers, endpoint, id, params, SignMethod::SignMessage).await
        }
        "sign_and_send_transaction" => {
            dispatch_sign(
                handlers,
                endpoint,
                id,
                params,
                SignMethod::SignAndSendTransaction,
            )
            .await
        }
        other => {
            warn!(method = %other, "rejecting unknown MWA method");
            endpoint.reply_err(
                id,
                crate::rpc::codec::standard_error::METHOD_NOT_FOUND,
                "method not found",
                None,
            );
        }
    }
}

async fn dispatch_authorize(
    handlers: &(dyn MwaHandlers + '_),
    endpoint: &RpcEndpoint,
    id: RequestId,
    params: Option<Value>,
) {
    let request = match parse_authorize_request(params) {
        Ok(request) => request,
        Err(err) => {
            endpoint.reply_err_object(id, RpcErrorObject::from(err));
            return;
        }
    };

    let (future, outcome) = request_future(0);
    handlers.authorize(request, future).await;

    match outcome.wait().await {
        Some(verdict) => reply_verdict(endpoint, id, verdict, MethodFamily::Authorize),
        None => {
            debug!("authorize future dropped without resolution");
            endpoint.reply_err(id, standard_internal_error(), "internal error", None);
        }
    }
}

#[derive(Clone, Copy)]
enum SignMethod {
    SignTransaction,
    SignMessage,
    SignAndSendTransaction,
}

async fn dispatch_sign(
    handlers: &(dyn MwaHandlers + '_),
    endpoint: &RpcEndpoint,
    id: RequestId,
    params: Option<Value>,
    which: SignMethod,
) {
    let request = match parse_sign_request(params, which) {
        Ok(request) => request,
        Err(err) => {
            endpoint.reply_err_object(id, RpcErrorObject::from(err));
            return;
        }
    };

    let (future, outcome) = request_future(request.payload_count());

    match which {
        SignMethod::SignTransaction => handlers.sign_transaction(request, future).await,
        SignMethod::SignMessage => handlers.sign_message(request, future).await,
        SignMethod::SignAndSendTransaction => {
            handlers.sign_and_send_transaction(request, future).await
        }
    }

    match outcome.wait().await {
        Some(verdict) => reply_verdict(endpoint, id, verdict, MethodFamily::Signing),
        None => {
            debug!("sign future dropped without resolution");
            endpoint.reply_err(id, standard_internal_error(), "internal error", None);
        }
    }
}

fn standard_internal_error() -> i64 {
    crate::rpc::codec::standard_error::INTERNAL_ERROR
}

fn reply_verdict(endpoint: &RpcEndpoint, id: RequestId, verdict: Verdict, family: MethodFamily) {
    match verdict {
        Verdict::Success(result) => endpoint.reply_ok(id, result),
        Verdict::Declined => {
            let code = match family {
                MethodFamily::Authorize => DomainCode::AuthorizationFailed,
                MethodFamily::Signing => DomainCode::NotSigned,
            };
            endpoint.reply_err_object(id, RpcErrorObject::from(code));
        }
        Verdict::ReauthorizationRequired => {
            endpoint.reply_err_object(id, RpcErrorObject::from(DomainCode::Reauthorize));
        }
        Verdict::AuthTokenNotValid => {
            endpoint.reply_err_object(id, RpcErrorObject::from(DomainCode::AuthorizationFailed));
        }
        Verdict::InvalidPayloads { valid } => {
            let error = DomainCode::InvalidPayload
                .with_data(serde_json::json!({ "valid": pack_bools(&valid) }));
            endpoint.reply_err_object(id, error);
        }
        Verdict::NotCommitted {
            signatures,
            committed,
        } => {
            let error = DomainCode::NotCommitted.with_data(serde_json::json!({
                "signatures": pack_bytes(&signatures),
                "commitment": pack_bools(&committed),
            }));
            endpoint.reply_err_object(id, error);
        }
        Verdict::Internal(reason) => {
            warn!(%reason, "handler reported an internal failure");
            endpoint.reply_err(id, standard_internal_error(), "internal error", None);
        }
    }
}

fn parse_authorize_request(params: Option<Value>) -> Result<AuthorizeRequest, ParamError> {
    let obj = params
        .as_ref()
        .and_then(Value::as_object)
        .ok_or(ParamError::NotAnObject)?;

    let privileged_methods = obj
        .get("privileged_methods")
        .ok_or(ParamError::Missing("privileged_methods"))?
        .as_array()
        .ok_or(ParamError::Missing("privileged_methods"))?;

    if privileged_methods.is_empty() {
        return Err(ParamError::EmptyPrivilegedMethods);
    }

    let privileged_methods = privileged_methods
        .iter()
        .map(|value| {
            let name = value
                .as_str()
                .ok_or_else(|| ParamError::UnknownPrivilegedMethod(value.to_string()))?;
            PrivilegedMethod::parse(name)
                .ok_or_else(|| ParamError::UnknownPrivilegedMethod(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let identity = match obj.get("identity") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_identity(value)?),
    };

    Ok(AuthorizeRequest {
        identity,
        privileged_methods,
    })
}

fn parse_identity(value: &Value) -> Result<Identity, ParamError> {
    let obj = value.as_object().ok_or(ParamError::InvalidIdentityUri)?;

    let uri = match obj.get("uri") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let parsed = url::Url::parse(s).map_err(|_| ParamError::InvalidIdentityUri)?;
            if parsed.cannot_be_a_base() {
                return Err(ParamError::InvalidIdentityUri);
            }
            Some(parsed)
        }
        Some(_) => return Err(ParamError::InvalidIdentityUri),
    };

    let icon = match obj.get("icon") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if url::Url::parse(s).is_ok() {
                // An icon that parses as an absolute URI on its own is not relative.
                return Err(ParamError::InvalidIdentityIcon);
            }
            Some(s.clone())
        }
        Some(_) => return Err(ParamError::InvalidIdentityIcon),
    };

    let name = match obj.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(_) => return Err(ParamError::InvalidIdentityName),
    };

    Ok(Identity { uri, icon, name })
}

fn parse_sign_request(
    params: Option<Value>,
    which: SignMethod,
) -> Result<SignRequest, ParamError> {
    let obj = params
        .as_ref()
        .and_then(Value::as_object)
        .ok_or(ParamError::NotAnObject)?;

    let auth_token = obj
        .get("auth_token")
        .and_then(Value::as_str)
        .ok_or(ParamError::Missing("auth_token"))?;
    if auth_token.is_empty() {
        return Err(ParamError::EmptyAuthToken);
    }

    let payloads_value = obj
        .get("payloads")
        .ok_or(ParamError::Missing("payloads"))?;
    let payloads = unpack_bytes(payloads_value)?;
    if payloads.is_empty() {
        return Err(ParamError::EmptyPayloads);
    }
    if let Some(index) = payloads.iter().position(|p| p.is_empty()) {
        return Err(ParamError::EmptyPayloadEntry(index));
    }

    let kind = match which {
        SignMethod::SignTransaction => SignKind::SignTransaction,
        SignMethod::SignMessage => SignKind::SignMessage,
        SignMethod::SignAndSendTransaction => {
            let commitment_str = obj
                .get("commitment")
                .and_then(Value::as_str)
                .ok_or(ParamError::Missing("commitment"))?;
            let commitment = CommitmentLevel::parse(commitment_str)
                .ok_or_else(|| ParamError::InvalidCommitment(commitment_str.to_string()))?;
            SignKind::SignAndSendTransaction { commitment }
        }
    };

    Ok(SignRequest {
        kind,
        auth_token: auth_token.to_string(),
        payloads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_authorize_request() {
        let params = serde_json::json!({"privileged_methods": ["sign_transaction"]});
        let request = parse_authorize_request(Some(params)).unwrap();
        assert_eq!(request.privileged_methods, vec![PrivilegedMethod::SignTransaction]);
        assert!(request.identity.is_none());
    }

    #[test]
    fn rejects_empty_privileged_methods() {
        let params = serde_json::json!({"privileged_methods": []});
        assert_eq!(
            parse_authorize_request(Some(params)).unwrap_err(),
            ParamError::EmptyPrivilegedMethods
        );
    }

    #[test]
    fn rejects_unknown_privileged_method() {
        let params = serde_json::json!({"privileged_methods": ["levitate"]});
        assert!(matches!(
            parse_authorize_request(Some(params)),
            Err(ParamError::UnknownPrivilegedMethod(_))
        ));
    }

    #[test]
    fn parses_identity_with_absolute_uri_and_relative_icon() {
        let params = serde_json::json!({
            "privileged_methods": ["sign_message"],
            "identity": {"uri": "https://example.com/app", "icon": "favicon.ico", "name": "Example"},
        });
        let request = parse_authorize_request(Some(params)).unwrap();
        let identity = request.identity.unwrap();
        assert_eq!(identity.uri.unwrap().as_str(), "https://example.com/app");
        assert_eq!(identity.icon.as_deref(), Some("favicon.ico"));
    }

    #[test]
    fn rejects_absolute_icon() {
        let params = serde_json::json!({
            "privileged_methods": ["sign_message"],
            "identity": {"icon": "https://evil.example/x"},
        });
        assert_eq!(
            parse_authorize_request(Some(params)).unwrap_err(),
            ParamError::InvalidIdentityIcon
        );
    }

    #[test]
    fn parses_sign_transaction_request() {
        let params = serde_json::json!({"auth_token": "tok", "payloads": ["3q0"]});
        let request = parse_sign_request(Some(params), SignMethod::SignTransaction).unwrap();
        assert_eq!(request.payloads, vec![vec![0xDE, 0xAD]]);
        assert_eq!(request.payload_count(), 1);
    }

    #[test]
    fn rejects_empty_payloads() {
        let params = serde_json::json!({"auth_token": "tok", "payloads": []});
        assert_eq!(
            parse_sign_request(Some(params), SignMethod::SignTransaction).unwrap_err(),
            ParamError::EmptyPayloads
        );
    }

    #[test]
    fn rejects_missing_auth_token() {
        let params = serde_json::json!({"payloads": ["3q0"]});
        assert_eq!(
            parse_sign_request(Some(params), SignMethod::SignTransaction).unwrap_err(),
            ParamError::Missing("auth_token")
        );
    }

    #[test]
    fn sign_and_send_requires_valid_commitment() {
        let params = serde_json::json!({
            "auth_token": "tok",
            "payloads": ["3q0"],
            "commitment": "finalized",
        });
        let request =
            parse_sign_request(Some(params), SignMethod::SignAndSendTransaction).unwrap();
        assert!(matches!(
            request.kind,
            SignKind::SignAndSendTransaction {
                commitment: CommitmentLevel::Finalized
            }
        ));
    }

    #[test]
    fn sign_and_send_rejects_bad_commitment() {
        let params = serde_json::json!({
            "auth_token": "tok",
            "payloads": ["3q0"],
            "commitment": "eventually",
        });
        assert!(matches!(
            parse_sign_request(Some(params), SignMethod::SignAndSendTransaction),
            Err(ParamError::InvalidCommitment(_))
        ));
    }
}
