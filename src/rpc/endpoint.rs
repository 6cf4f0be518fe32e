//! The full-duplex JSON-RPC engine: outbound calls correlated by `id`, with
//! per-call timeout and cancellation, plus inbound dispatch to a server
//! handler.
//!
//! An [`RpcEndpoint`] does not own a transport; it owns the pending-call
//! table and the outbound frame sink. The embedding application feeds
//! inbound bytes to [`RpcEndpoint::handle_inbound`]
//! as whole frames arrive, and reads outbound bytes off the channel it
//! supplied at construction — bringing up the actual duplex stream is a
//! transport concern and stays out of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::codec::{
    self, standard_error, DecodedFrame, ParseError, RequestFrame, RequestId, ResponseFrame,
    RpcErrorObject,
};

/// The default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Configuration for an [`RpcEndpoint`].
#[derive(Clone, Debug)]
pub struct RpcEndpointConfig {
    /// Used by [`RpcEndpoint::call`] when no per-call timeout is given.
    pub default_timeout: Duration,
    /// The first `id` assigned to an outbound call; subsequent calls count
    /// up from it. Exposed so two endpoints sharing a log (e.g. in tests)
    /// can be given disjoint id ranges.
    pub initial_id: u64,
}

impl Default for RpcEndpointConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            initial_id: 1,
        }
    }
}

/// Why an outbound [`CallHandle`] failed to resolve with a result.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CallError {
    #[error("remote returned error {code}: {message}")]
    RemoteError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("call timed out")]
    Timeout,
    #[error("call was cancelled")]
    Cancelled,
    #[error("endpoint is closed")]
    Transport,
}

type PendingResult = Result<Value, CallError>;

/// The dispatcher installed via [`RpcEndpoint::set_server`]: invoked for
/// every inbound request frame. It is responsible for eventually replying
/// via [`RpcEndpoint::reply_ok`]/[`RpcEndpoint::reply_err`] exactly once.
pub type Dispatcher =
    Arc<dyn Fn(RpcEndpoint, RequestId, String, Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Inner {
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<PendingResult>>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    closed: AtomicBool,
    config: RpcEndpointConfig,
}

/// A full-duplex JSON-RPC 2.0 endpoint.
///
/// Cheap to clone: clones share the same pending-call table and outbound
/// sink, which is what lets a spawned dispatch task and the main reader
/// loop both hold a handle to the same logical endpoint.
#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<Inner>,
}

impl RpcEndpoint {
    /// Creates a new endpoint writing outbound frames to `outbound`.
    pub fn new(outbound: mpsc::UnboundedSender<Vec<u8>>, config: RpcEndpointConfig) -> Self {
        info!(initial_id = config.initial_id, "opening RPC endpoint");
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(config.initial_id),
                outbound,
                pending: Mutex::new(HashMap::new()),
                dispatcher: Mutex::new(None),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Installs the inbound-request dispatcher. Replaces any previously set
    /// dispatcher.
    pub fn set_server(&self, dispatcher: Dispatcher) {
        *self.inner.dispatcher.lock().unwrap() = Some(dispatcher);
    }

    /// Submits an outbound method call.
    ///
    /// Assigns a unique `id`, emits the frame immediately, and registers the
    /// pending call. Returns a [`CallHandle`] the caller awaits (or cancels)
    /// separately: the id is allocated and the
    /// frame emitted before the caller necessarily awaits anything.
    pub fn call(&self, method: impl Into<String>, params: Option<Value>) -> CallHandle {
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst) as i64);

        let (tx, rx) = oneshot::channel();

        if self.inner.closed.load(Ordering::SeqCst) {
            // Resolve immediately; no frame is emitted for a closed endpoint.
            let _ = tx.send(Err(CallError::Transport));
        } else {
            self.inner
                .pending
                .lock()
                .unwrap()
                .insert(id.clone(), tx);

            let frame = RequestFrame {
                id: id.clone(),
                method: method.into(),
                params,
            };
            trace!(id = %frame.id, method = %frame.method, "emitting outbound call");
            let _ = self.inner.outbound.send(codec::serialize_request(&frame));
        }

        CallHandle {
            id,
            endpoint: self.clone(),
            receiver: rx,
            timeout: self.inner.config.default_timeout,
        }
    }

    /// Cancels a pending outbound call by id. Idempotent: cancelling an id
    /// that is not (or no longer) pending is a no-op.
    fn cancel_call(&self, id: &RequestId) {
        if let Some(sender) = self.inner.pending.lock().unwrap().remove(id) {
            let _ = sender.send(Err(CallError::Cancelled));
        }
    }

    /// Replies to an inbound request with a success result.
    pub fn reply_ok(&self, id: RequestId, result: Value) {
        let bytes = codec::serialize_response_ok(&id, result);
        let _ = self.inner.outbound.send(bytes);
    }

    /// Replies to an inbound request with an error.
    pub fn reply_err(&self, id: RequestId, code: i64, message: impl Into<String>, data: Option<Value>) {
        let error = match data {
            Some(data) => RpcErrorObject::with_data(code, message, data),
            None => RpcErrorObject::new(code, message),
        };
        self.reply_err_object(id, error);
    }

    /// Replies to an inbound request with an already-constructed error
    /// object, e.g. one built via `From<DomainCode>`/`From<ParamError>`.
    pub fn reply_err_object(&self, id: RequestId, error: RpcErrorObject) {
        let bytes = codec::serialize_response_err(&id, &error);
        let _ = self.inner.outbound.send(bytes);
    }

    /// Feeds one whole inbound frame to the endpoint.
    ///
    /// Request frames are handed to the installed dispatcher (spawned as an
    /// independent task, so a slow handler does not block other inbound
    /// frames from being processed). Response frames are matched against
    /// the pending-call table by `id`; an unmatched id (already timed out,
    /// cancelled, or unknown) is silently discarded.
    pub fn handle_inbound(&self, bytes: &[u8]) {
        match codec::parse_frame(bytes) {
            Ok(DecodedFrame::Request(req)) => self.dispatch_request(req),
            Ok(DecodedFrame::Response(resp)) => self.resolve_response(resp),
            Err(ParseError::InvalidJson(_)) => {
                warn!("rejecting unparsable frame");
                let bytes = codec::serialize_response_err_no_id(&RpcErrorObject::new(
                    standard_error::PARSE_ERROR,
                    "parse error",
                ));
                let _ = self.inner.outbound.send(bytes);
            }
            Err(ParseError::BadVersion) => {
                warn!("rejecting frame with bad jsonrpc version");
                let bytes = codec::serialize_response_err_no_id(&RpcErrorObject::new(
                    standard_error::INVALID_REQUEST,
                    "invalid request",
                ));
                let _ = self.inner.outbound.send(bytes);
            }
            Err(ParseError::UnrecognizedShape) => {
                warn!("rejecting frame with unrecognized shape");
                let bytes = codec::serialize_response_err_no_id(&RpcErrorObject::new(
                    standard_error::INVALID_REQUEST,
                    "invalid request",
                ));
                let _ = self.inner.outbound.send(bytes);
            }
        }
    }

    fn dispatch_request(&self, req: RequestFrame) {
        let dispatcher = self.inner.dispatcher.lock().unwrap().clone();
        match dispatcher {
            Some(dispatcher) => {
                let endpoint = self.clone();
                let fut = dispatcher(endpoint, req.id, req.method, req.params);
                crate::spawn!("mwa-dispatch", fut);
            }
            None => {
                warn!(method = %req.method, "no dispatcher installed, rejecting inbound call");
                self.reply_err(req.id, standard_error::METHOD_NOT_FOUND, "method not found", None);
            }
        }
    }

    fn resolve_response(&self, resp: ResponseFrame) {
        let id = resp.id().clone();
        let sender = self.inner.pending.lock().unwrap().remove(&id);
        match sender {
            Some(sender) => {
                let result = match resp {
                    ResponseFrame::Ok { result, .. } => Ok(result),
                    ResponseFrame::Err { error, .. } => Err(CallError::RemoteError {
                        code: error.code,
                        message: error.message,
                        data: error.data,
                    }),
                };
                let _ = sender.send(result);
            }
            None => {
                debug!(%id, "discarding response for unknown or already-resolved id");
            }
        }
    }

    /// Cancels every pending outbound and inbound call and marks the
    /// endpoint closed; subsequent `call()`s fail immediately with
    /// [`CallError::Transport`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = std::mem::take(&mut *self.inner.pending.lock().unwrap());
        info!(cancelled = pending.len(), "closing RPC endpoint");
        for (_, sender) in pending {
            let _ = sender.send(Err(CallError::Cancelled));
        }
        *self.inner.dispatcher.lock().unwrap() = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// A pending outbound call: assigned an id and (unless the endpoint was
/// already closed) already emitted on the wire. Await [`CallHandle::wait`]
/// for the result, or call [`CallHandle::cancel`] to abandon it.
pub struct CallHandle {
    id: RequestId,
    endpoint: RpcEndpoint,
    receiver: oneshot::Receiver<PendingResult>,
    timeout: Duration,
}

impl CallHandle {
    /// Overrides the default per-call timeout for this specific call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The id assigned to this call.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Cancels this call. A response that arrives after cancellation is
    /// discarded by the endpoint.
    pub fn cancel(&self) {
        self.endpoint.cancel_call(&self.id);
    }

    /// Awaits the result: the matching response, a timeout, or cancellation.
    ///
    /// A timeout fires at most once: once fired, the pending entry is
    /// removed, so a late response for the same id is silently dropped by
    /// [`RpcEndpoint::handle_inbound`].
    pub async fn wait(self) -> Result<Value, CallError> {
        let CallHandle {
            id,
            endpoint,
            receiver,
            timeout,
        } = self;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            // Sender dropped without sending: only happens if the endpoint
            // was torn down through a path that didn't go through `close()`.
            Ok(Err(_)) => Err(CallError::Cancelled),
            Err(_elapsed) => {
                endpoint.cancel_call(&id);
                Err(CallError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_endpoint() -> (RpcEndpoint, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RpcEndpoint::new(tx, RpcEndpointConfig::default()), rx)
    }

    #[tokio::test]
    async fn call_emits_frame_and_resolves_on_matching_response() {
        let (endpoint, mut outbound) = test_endpoint();

        let handle = endpoint.call("authorize", Some(serde_json::json!({"privileged_methods": []})));
        let emitted = outbound.recv().await.unwrap();
        let frame: serde_json::Value = serde_json::from_slice(&emitted).unwrap();
        assert_eq!(frame["method"], "authorize");
        let id = frame["id"].as_i64().unwrap();

        endpoint.handle_inbound(
            format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{"ok":true}}}}"#).as_bytes(),
        );

        let result = handle.wait().await.unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn call_ids_start_from_configured_initial_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = RpcEndpoint::new(
            tx,
            RpcEndpointConfig {
                initial_id: 100,
                ..RpcEndpointConfig::default()
            },
        );

        let _first = endpoint.call("sign_message", None);
        let _second = endpoint.call("sign_message", None);

        let first_frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        let second_frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first_frame["id"], 100);
        assert_eq!(second_frame["id"], 101);
    }

    #[tokio::test]
    async fn call_resolves_remote_error() {
        let (endpoint, mut outbound) = test_endpoint();
        let handle = endpoint.call("sign_message", None);
        let emitted = outbound.recv().await.unwrap();
        let id = serde_json::from_slice::<Value>(&emitted).unwrap()["id"]
            .as_i64()
            .unwrap();

        endpoint.handle_inbound(
            format!(r#"{{"jsonrpc":"2.0","id":{id},"error":{{"code":-3,"message":"not signed"}}}}"#)
                .as_bytes(),
        );

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, CallError::RemoteError { code: -3, .. }));
    }

    #[tokio::test]
    async fn timeout_fires_once_and_late_response_is_dropped() {
        let (endpoint, mut outbound) = test_endpoint();
        let handle = endpoint
            .call("sign_message", None)
            .with_timeout(Duration::from_millis(20));
        let emitted = outbound.recv().await.unwrap();
        let id = serde_json::from_slice::<Value>(&emitted).unwrap()["id"]
            .as_i64()
            .unwrap();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, CallError::Timeout));

        // A late response for the now-forgotten id must not panic or be
        // observable - there is nothing left to observe it with, which is
        // the point.
        endpoint.handle_inbound(
            format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{}}}}"#).as_bytes(),
        );
    }

    #[tokio::test]
    async fn cancel_before_response_yields_cancelled() {
        let (endpoint, mut outbound) = test_endpoint();
        let handle = endpoint.call("sign_message", None);
        let _ = outbound.recv().await.unwrap();
        handle.cancel();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }

    #[tokio::test]
    async fn close_cancels_all_pending_calls() {
        let (endpoint, mut outbound) = test_endpoint();
        let h1 = endpoint.call("sign_message", None);
        let h2 = endpoint.call("sign_transaction", None);
        let _ = outbound.recv().await.unwrap();
        let _ = outbound.recv().await.unwrap();

        endpoint.close();

        assert!(matches!(h1.wait().await, Err(CallError::Cancelled)));
        assert!(matches!(h2.wait().await, Err(CallError::Cancelled)));
    }

    #[tokio::test]
    async fn call_on_closed_endpoint_fails_without_emitting_frame() {
        let (endpoint, mut outbound) = test_endpoint();
        endpoint.close();
        let handle = endpoint.call("sign_message", None);
        assert!(matches!(handle.wait().await, Err(CallError::Transport)));
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn inbound_request_without_dispatcher_gets_method_not_found() {
        let (endpoint, mut outbound) = test_endpoint();
        endpoint.handle_inbound(br#"{"jsonrpc":"2.0","id":1,"method":"authorize","params":{}}"#);
        let emitted = outbound.recv().await.unwrap();
        let frame: Value = serde_json::from_slice(&emitted).unwrap();
        assert_eq!(frame["error"]["code"], standard_error::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_gets_parse_error_with_null_id() {
        let (endpoint, mut outbound) = test_endpoint();
        endpoint.handle_inbound(b"{ not json");
        let emitted = outbound.recv().await.unwrap();
        let frame: Value = serde_json::from_slice(&emitted).unwrap();
        assert_eq!(frame["error"]["code"], standard_error::PARSE_ERROR);
        assert!(frame["id"].is_null());
    }

    #[tokio::test]
    async fn dispatcher_runs_concurrently_with_other_inbound_frames() {
        let (endpoint, mut outbound) = test_endpoint();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let gate_rx = Arc::new(Mutex::new(Some(gate_rx)));

        endpoint.set_server(Arc::new(move |ep, id, _method, _params| {
            let gate_rx = gate_rx.clone();
            Box::pin(async move {
                if let Some(rx) = gate_rx.lock().unwrap().take() {
                    let _ = rx.await;
                }
                ep.reply_ok(id, serde_json::json!({"done": true}));
            })
        }));

        // This inbound request blocks on `gate_rx` until we open the gate below.
        endpoint.handle_inbound(br#"{"jsonrpc":"2.0","id":1,"method":"slow","params":{}}"#);

        // A second, unrelated inbound frame (a response to our own call)
        // must still be processed while the first dispatch is blocked.
        let handle = endpoint.call("ping", None);
        let emitted = outbound.recv().await.unwrap();
        let ping_id = serde_json::from_slice::<Value>(&emitted).unwrap()["id"]
            .as_i64()
            .unwrap();
        endpoint.handle_inbound(
            format!(r#"{{"jsonrpc":"2.0","id":{ping_id},"result":{{}}}}"#).as_bytes(),
        );
        assert!(handle.wait().await.is_ok());

        let _ = gate_tx.send(());
        let emitted = outbound.recv().await.unwrap();
        let frame: Value = serde_json::from_slice(&emitted).unwrap();
        assert_eq!(frame["result"], serde_json::json!({"done": true}));
    }
}
