//! Client-side MWA invoker: encodes params, submits through an
//! [`RpcEndpoint`], and collapses the remote/local error surface into one
//! typed enumeration.

use serde_json::{Map, Value};

use crate::json_pack::{pack_bytes, unpack_bools, unpack_bytes};
use crate::mwa::error::{DomainCode, MwaClientError};
use crate::mwa::types::{AuthorizeResult, CommitmentLevel, Identity, PrivilegedMethod};
use crate::rpc::endpoint::{CallError, RpcEndpoint};

/// A typed client over an [`RpcEndpoint`] already wired to an association
/// scenario's transport.
#[derive(Clone)]
pub struct MwaClient {
    endpoint: RpcEndpoint,
}

impl MwaClient {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }

    /// Calls `authorize`.
    pub async fn authorize(
        &self,
        identity: Option<Identity>,
        privileged_methods: Vec<PrivilegedMethod>,
    ) -> Result<AuthorizeResult, MwaClientError> {
        if privileged_methods.is_empty() {
            return Err(MwaClientError::InvalidResponse(
                "privileged_methods must be non-empty".to_string(),
            ));
        }

        let mut params = Map::new();
        if let Some(identity) = identity {
            params.insert(
                "identity".to_string(),
                serde_json::to_value(identity).expect("Identity always serializes"),
            );
        }
        params.insert(
            "privileged_methods".to_string(),
            Value::Array(
                privileged_methods
                    .iter()
                    .map(|m| Value::String(m.as_str().to_string()))
                    .collect(),
            ),
        );

        let result = self
            .endpoint
            .call("authorize", Some(Value::Object(params)))
            .wait()
            .await
            .map_err(map_call_error)?;

        serde_json::from_value(result)
            .map_err(|e| MwaClientError::InvalidResponse(e.to_string()))
    }

    /// Calls `sign_transaction`.
    pub async fn sign_transaction(
        &self,
        auth_token: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, MwaClientError> {
        let expected = payloads.len();
        let result = self
            .sign("sign_transaction", auth_token, payloads, None)
            .await?;
        extract_byte_vecs(&result, "signed_payloads", expected)
    }

    /// Calls `sign_message`.
    pub async fn sign_message(
        &self,
        auth_token: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, MwaClientError> {
        let expected = payloads.len();
        let result = self
            .sign("sign_message", auth_token, payloads, None)
            .await?;
        extract_byte_vecs(&result, "signed_payloads", expected)
    }

    /// Calls `sign_and_send_transaction`.
    pub async fn sign_and_send_transaction(
        &self,
        auth_token: &str,
        payloads: Vec<Vec<u8>>,
        commitment: CommitmentLevel,
    ) -> Result<Vec<Vec<u8>>, MwaClientError> {
        let expected = payloads.len();
        let result = self
            .sign(
                "sign_and_send_transaction",
                auth_token,
                payloads,
                Some(commitment),
            )
            .await?;
        extract_byte_vecs(&result, "signatures", expected)
    }

    async fn sign(
        &self,
        method: &'static str,
        auth_token: &str,
        payloads: Vec<Vec<u8>>,
        commitment: Option<CommitmentLevel>,
    ) -> Result<Value, MwaClientError> {
        if auth_token.is_empty() {
            return Err(MwaClientError::InvalidResponse(
                "auth_token must be non-empty".to_string(),
            ));
        }
        if payloads.is_empty() {
            return Err(MwaClientError::InvalidResponse(
                "payloads must be non-empty".to_string(),
            ));
        }

        let mut params = Map::new();
        params.insert("auth_token".to_string(), Value::String(auth_token.to_string()));
        params.insert("payloads".to_string(), pack_bytes(&payloads));
        if let Some(commitment) = commitment {
            params.insert(
                "commitment".to_string(),
                Value::String(commitment.as_str().to_string()),
            );
        }

        self.endpoint
            .call(method, Some(Value::Object(params)))
            .wait()
            .await
            .map_err(map_call_error)
    }
}

fn extract_byte_vecs(
    value: &Value,
    field: &'static str,
    expected: usize,
) -> Result<Vec<Vec<u8>>, MwaClientError> {
    let array = value
        .get(field)
        .ok_or_else(|| MwaClientError::InvalidResponse(format!("missing `{field}`")))?;
    let items =
        unpack_bytes(array).map_err(|e| MwaClientError::InvalidResponse(e.to_string()))?;
    if items.len() != expected {
        return Err(MwaClientError::InvalidResponse(format!(
            "expected {expected} entries in `{field}`, got {}",
            items.len()
        )));
    }
    Ok(items)
}

fn map_call_error(err: CallError) -> MwaClientError {
    match err {
        CallError::RemoteError { code, message, data } => map_remote_error(code, message, data),
        CallError::Timeout => MwaClientError::Timeout,
        CallError::Cancelled => MwaClientError::Cancelled,
        CallError::Transport => MwaClientError::Transport,
    }
}

fn map_remote_error(code: i64, message: String, data: Option<Value>) -> MwaClientError {
    match DomainCode::from_code(code) {
        Some(DomainCode::NotSigned) => MwaClientError::Declined,
        Some(DomainCode::Reauthorize) => MwaClientError::ReauthorizationRequired,
        Some(DomainCode::AuthorizationFailed) => MwaClientError::AuthorizationFailed,
        Some(DomainCode::InvalidPayload) => data
            .as_ref()
            .and_then(|d| d.get("valid"))
            .and_then(|v| unpack_bools(v).ok())
            .map(|valid| MwaClientError::InvalidPayload { valid })
            .unwrap_or(MwaClientError::RemoteError { code, message, data }),
        Some(DomainCode::NotCommitted) => {
            let signatures = data
                .as_ref()
                .and_then(|d| d.get("signatures"))
                .and_then(|v| unpack_bytes(v).ok());
            let committed = data
                .as_ref()
                .and_then(|d| d.get("commitment"))
                .and_then(|v| unpack_bools(v).ok());
            match (signatures, committed) {
                (Some(signatures), Some(committed)) => {
                    MwaClientError::NotCommitted { signatures, committed }
                }
                _ => MwaClientError::RemoteError { code, message, data },
            }
        }
        None => MwaClientError::RemoteError { code, message, data },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::endpoint::RpcEndpointConfig;
    use tokio::sync::mpsc;

    fn test_client() -> (MwaClient, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = RpcEndpoint::new(tx, RpcEndpointConfig::default());
        (MwaClient::new(endpoint.clone()), rx)
    }

    fn respond(
        endpoint: &RpcEndpoint,
        emitted: &[u8],
        body: serde_json::Value,
    ) {
        let id = serde_json::from_slice::<Value>(emitted).unwrap()["id"]
            .as_i64()
            .unwrap();
        let mut frame = serde_json::json!({"jsonrpc": "2.0", "id": id});
        for (k, v) in body.as_object().unwrap() {
            frame[k] = v.clone();
        }
        endpoint.handle_inbound(serde_json::to_vec(&frame).unwrap().as_slice());
    }

    #[tokio::test]
    async fn authorize_rejects_empty_privileged_methods() {
        let (client, _outbound) = test_client();
        let err = client.authorize(None, vec![]).await.unwrap_err();
        assert!(matches!(err, MwaClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn sign_transaction_happy_path() {
        let (client, mut outbound) = test_client();
        let endpoint = client.endpoint.clone();

        let call = client.sign_transaction("tok", vec![vec![0xDE, 0xAD]]);
        tokio::pin!(call);

        let emitted = outbound.recv().await.unwrap();
        respond(
            &endpoint,
            &emitted,
            serde_json::json!({"result": {"signed_payloads": ["vu8"]}}),
        );

        let signed = call.await.unwrap();
        assert_eq!(signed, vec![vec![0xBE, 0xEF]]);
    }

    #[tokio::test]
    async fn sign_rejects_empty_auth_token_without_sending() {
        let (client, mut outbound) = test_client();
        let err = client
            .sign_transaction("", vec![vec![1]])
            .await
            .unwrap_err();
        assert!(matches!(err, MwaClientError::InvalidResponse(_)));
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn not_signed_maps_to_declined() {
        let (client, mut outbound) = test_client();
        let endpoint = client.endpoint.clone();

        let call = client.sign_message("tok", vec![vec![1]]);
        tokio::pin!(call);

        let emitted = outbound.recv().await.unwrap();
        respond(
            &endpoint,
            &emitted,
            serde_json::json!({"error": {"code": -3, "message": "not signed"}}),
        );

        assert!(matches!(call.await.unwrap_err(), MwaClientError::Declined));
    }

    #[tokio::test]
    async fn invalid_payload_error_parses_data() {
        let (client, mut outbound) = test_client();
        let endpoint = client.endpoint.clone();

        let call = client.sign_transaction("tok", vec![vec![1], vec![2]]);
        tokio::pin!(call);

        let emitted = outbound.recv().await.unwrap();
        respond(
            &endpoint,
            &emitted,
            serde_json::json!({"error": {"code": -4, "message": "invalid payload", "data": {"valid": [true, false]}}}),
        );

        match call.await.unwrap_err() {
            MwaClientError::InvalidPayload { valid } => assert_eq!(valid, vec![true, false]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_committed_error_parses_data() {
        let (client, mut outbound) = test_client();
        let endpoint = client.endpoint.clone();

        let call =
            client.sign_and_send_transaction("tok", vec![vec![1]], CommitmentLevel::Finalized);
        tokio::pin!(call);

        let emitted = outbound.recv().await.unwrap();
        respond(
            &endpoint,
            &emitted,
            serde_json::json!({"error": {"code": -5, "message": "not committed", "data": {"signatures": ["vu8"], "commitment": [false]}}}),
        );

        match call.await.unwrap_err() {
            MwaClientError::NotCommitted { signatures, committed } => {
                assert_eq!(signatures, vec![vec![0xBE, 0xEF]]);
                assert_eq!(committed, vec![false]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn length_mismatch_yields_invalid_response() {
        let (client, mut outbound) = test_client();
        let endpoint = client.endpoint.clone();

        let call = client.sign_transaction("tok", vec![vec![1], vec![2]]);
        tokio::pin!(call);

        let emitted = outbound.recv().await.unwrap();
        respond(
            &endpoint,
            &emitted,
            serde_json::json!({"result": {"signed_payloads": ["vu8"]}}),
        );

        assert!(matches!(
            call.await.unwrap_err(),
            MwaClientError::InvalidResponse(_)
        ));
    }
}
