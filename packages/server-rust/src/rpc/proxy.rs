//! The caller-side call core: pending-call tracking, reply routing, and the
//! service proxy.
//!
//! A proxy owns a uuid-scoped reply stream and a pending-call table keyed by
//! correlation id. Inbound replies are routed to the registered handler for
//! their correlation id; lookup, completion, and removal happen under one
//! map-entry guard so a late duplicate reply can never complete an already
//! removed (or reused) id. Replies for one correlation id are applied in
//! arrival order; nothing orders replies across different ids.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use conduit_core::{headers, Cri, EventBus, Event, ServiceIdentifier};
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::rpc::handler::{
    MultiValueHandler, RpcResponseConverter, RpcReturnValueHandler, SingleValueHandler,
};
use crate::rpc::request::RpcRequest;
use crate::service::exception::{ExceptionConverterComposite, JsonExceptionConverter};

// ---------------------------------------------------------------------------
// PendingCalls
// ---------------------------------------------------------------------------

/// The pending-call table: exactly one live entry per in-flight correlation
/// id. Concurrent insert/route/remove without external locking.
pub(crate) struct PendingCalls {
    calls: DashMap<String, Box<dyn RpcReturnValueHandler>>,
}

impl PendingCalls {
    fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    fn insert(&self, correlation_id: String, handler: Box<dyn RpcReturnValueHandler>) {
        self.calls.insert(correlation_id, handler);
    }

    fn remove(&self, correlation_id: &str) -> Option<Box<dyn RpcReturnValueHandler>> {
        self.calls.remove(correlation_id).map(|(_, handler)| handler)
    }

    fn len(&self) -> usize {
        self.calls.len()
    }

    /// Routes one inbound reply to its handler. Completion and removal are a
    /// single atomic step: the entry guard is held across both.
    fn route(&self, event: Event) {
        let Some(correlation_id) = event
            .metadata()
            .get(headers::CORRELATION_ID)
            .map(str::to_string)
        else {
            warn!(cri = %event.cri(), "discarding reply without correlation id");
            return;
        };

        match self.calls.entry(correlation_id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let done = entry.get_mut().process_response(event);
                if done {
                    entry.remove();
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                // Late reply for a completed, cancelled, or timed-out call.
                debug!(correlation_id = %entry.key(), "discarding reply for unknown correlation id");
            }
        }
    }
}

/// Removes (and cancels) the pending entry when an in-flight single-value
/// call is dropped before completion. A no-op on every path that already
/// resolved the entry.
struct PendingGuard {
    pending: Arc<PendingCalls>,
    correlation_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(mut handler) = self.pending.remove(&self.correlation_id) {
            handler.cancel("call dropped by caller");
        }
    }
}

// ---------------------------------------------------------------------------
// RpcServiceProxy
// ---------------------------------------------------------------------------

/// Location-transparent proxy for one published service.
///
/// Calls address the service by its identifier; the proxy never knows which
/// node hosts it. Single-value calls are plain futures (nothing is sent
/// until awaited); multi-value calls return a cold [`RpcStreamCall`] that
/// sends on first poll.
pub struct RpcServiceProxy {
    service: ServiceIdentifier,
    bus: Arc<dyn EventBus>,
    pending: Arc<PendingCalls>,
    converter: RpcResponseConverter,
    default_timeout: Duration,
    reply_to: Cri,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServiceProxy {
    /// Starts a proxy with the default JSON exception chain.
    ///
    /// # Errors
    ///
    /// Fails when the reply subscription cannot be established.
    pub async fn start(
        service: ServiceIdentifier,
        bus: Arc<dyn EventBus>,
        config: &RpcConfig,
    ) -> anyhow::Result<Self> {
        let exceptions = ExceptionConverterComposite::new()
            .with_converter(JsonExceptionConverter::new(config.debug));
        Self::start_with_exceptions(service, bus, Arc::new(exceptions), config).await
    }

    /// Starts a proxy with a caller-assembled exception chain.
    ///
    /// # Errors
    ///
    /// Fails when the reply subscription cannot be established.
    pub async fn start_with_exceptions(
        service: ServiceIdentifier,
        bus: Arc<dyn EventBus>,
        exceptions: Arc<ExceptionConverterComposite>,
        config: &RpcConfig,
    ) -> anyhow::Result<Self> {
        let reply_to = Cri::stream("rpc.replies")?.with_scope(Uuid::new_v4().to_string());
        let mut replies = bus.listen(&reply_to).await?;

        let pending = Arc::new(PendingCalls::new());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let listener = tokio::spawn({
            let pending = pending.clone();
            async move {
                loop {
                    tokio::select! {
                        reply = replies.next() => {
                            match reply {
                                Some(event) => pending.route(event),
                                None => break,
                            }
                        }
                        _ = &mut shutdown_rx => break,
                    }
                }
            }
        });

        Ok(Self {
            service,
            bus,
            pending,
            converter: RpcResponseConverter::new(exceptions),
            default_timeout: config.default_call_timeout,
            reply_to,
            shutdown_tx: Some(shutdown_tx),
            listener: Some(listener),
        })
    }

    #[must_use]
    pub fn service(&self) -> &ServiceIdentifier {
        &self.service
    }

    /// The CRI replies to this proxy's calls arrive on.
    #[must_use]
    pub fn reply_to(&self) -> &Cri {
        &self.reply_to
    }

    /// Invokes a single-value function with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`RpcError`]; every failure kind surfaces here, nothing is
    /// swallowed.
    pub async fn invoke(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        self.invoke_with_timeout(function, args, self.default_timeout)
            .await
    }

    /// Invokes a single-value function, waiting at most `timeout` for the
    /// reply. On timeout the pending entry is removed and the call resolves
    /// with [`RpcError::Timeout`]; a reply arriving later is discarded.
    /// Dropping the returned future before completion cancels the call the
    /// same way. Neither notifies the remote side.
    ///
    /// # Errors
    ///
    /// See [`RpcError`].
    pub async fn invoke_with_timeout(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let request = RpcRequest::new(&self.service, function, &args, &self.reply_to)?;
        let correlation_id = request.correlation_id().to_string();

        let (handler, rx) = SingleValueHandler::new(self.converter.clone());
        self.pending
            .insert(correlation_id.clone(), Box::new(handler));
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            correlation_id: correlation_id.clone(),
        };

        self.bus
            .send(request.into_event())
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Cancelled(
                "pending call entry was dropped".to_string(),
            )),
            Err(_) => {
                if let Some(mut handler) = self.pending.remove(&correlation_id) {
                    handler.process_error(RpcError::Timeout(timeout));
                }
                Err(RpcError::Timeout(timeout))
            }
        }
    }

    /// Typed convenience over [`RpcServiceProxy::invoke`].
    ///
    /// # Errors
    ///
    /// See [`RpcError`]; a reply that does not deserialize into `T` is an
    /// [`RpcError::UnsupportedContent`].
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<T, RpcError> {
        let value = self.invoke(function, args).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::UnsupportedContent(format!("reply type mismatch: {e}")))
    }

    /// Invokes a multi-value function, returning a cold stream of elements.
    /// The request is sent on first poll; each reply event is one element
    /// until the terminal control marker completes the stream or an error
    /// reply terminates it.
    ///
    /// # Errors
    ///
    /// Fails when the request cannot be built.
    pub fn invoke_stream(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<RpcStreamCall, RpcError> {
        let request = RpcRequest::new(&self.service, function, &args, &self.reply_to)?;
        let correlation_id = request.correlation_id().to_string();

        let (handler, rx) = MultiValueHandler::new(self.converter.clone());
        self.pending
            .insert(correlation_id.clone(), Box::new(handler));

        Ok(RpcStreamCall {
            pending: self.pending.clone(),
            bus: self.bus.clone(),
            correlation_id,
            request: Some(request),
            rx: UnboundedReceiverStream::new(rx),
        })
    }

    /// Number of in-flight calls, exposed for diagnostics.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Stops the reply listener. In-flight calls resolve only by timeout or
    /// cancellation afterwards.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
    }
}

// ---------------------------------------------------------------------------
// RpcStreamCall
// ---------------------------------------------------------------------------

/// A cold multi-value call: [`Stream`] of reply elements.
///
/// The request event is sent when the stream is first polled. Dropping the
/// stream or calling [`RpcStreamCall::cancel`] removes the pending entry;
/// neither notifies the remote side, which may keep producing into the void.
pub struct RpcStreamCall {
    pending: Arc<PendingCalls>,
    bus: Arc<dyn EventBus>,
    correlation_id: String,
    request: Option<RpcRequest>,
    rx: UnboundedReceiverStream<Result<serde_json::Value, RpcError>>,
}

impl RpcStreamCall {
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Terminates the stream with [`RpcError::Cancelled`] and removes the
    /// pending entry. Idempotent; a no-op after the stream completed.
    pub fn cancel(&mut self, message: &str) {
        self.request = None;
        if let Some(mut handler) = self.pending.remove(&self.correlation_id) {
            handler.cancel(message);
        }
    }
}

impl Stream for RpcStreamCall {
    type Item = Result<serde_json::Value, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(request) = this.request.take() {
            // First poll: perform the deferred send off this task.
            let bus = this.bus.clone();
            let pending = this.pending.clone();
            let correlation_id = this.correlation_id.clone();
            tokio::spawn(async move {
                if let Err(e) = bus.send(request.into_event()).await {
                    error!(error = %e, "failed to send stream request");
                    if let Some(mut handler) = pending.remove(&correlation_id) {
                        handler.process_error(RpcError::Transport(e.to_string()));
                    }
                }
            });
        }
        Pin::new(&mut this.rx).poll_next(cx)
    }
}

impl Drop for RpcStreamCall {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use conduit_core::{
        FunctionDescriptor, Metadata, ParameterSpec, ReturnKind, ServiceDescriptor,
    };
    use futures_util::stream;

    use super::*;
    use crate::service::handler::{InvocationFault, InvocationResult, ServiceHandler};
    use crate::service::registry::ServiceRegistry;
    use crate::test_support::MemoryEventBus;

    struct CalcService;

    #[async_trait]
    impl ServiceHandler for CalcService {
        async fn invoke(
            &self,
            function: &str,
            args: Vec<serde_json::Value>,
        ) -> Result<InvocationResult, InvocationFault> {
            match function {
                "add" => {
                    let a = args[0].as_i64().unwrap_or(0);
                    let b = args[1].as_i64().unwrap_or(0);
                    Ok(InvocationResult::Value(serde_json::json!(a + b)))
                }
                "boom" => Err(InvocationFault::new("org.acme.Boom", "always fails")),
                "countTo" => {
                    let n = args[0].as_i64().unwrap_or(0);
                    let items = (1..=n).map(|i| Ok(serde_json::json!(i)));
                    Ok(InvocationResult::Stream(Box::pin(stream::iter(items))))
                }
                other => Err(InvocationFault::new(
                    "org.acme.Unknown",
                    format!("unknown function {other}"),
                )),
            }
        }
    }

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(ServiceIdentifier::new("org.acme.Calc"))
            .with_function(FunctionDescriptor::new(
                "add",
                vec![ParameterSpec::Payload, ParameterSpec::Payload],
                ReturnKind::Value,
            ))
            .with_function(FunctionDescriptor::new("boom", vec![], ReturnKind::Value))
            .with_function(FunctionDescriptor::new(
                "countTo",
                vec![ParameterSpec::Payload],
                ReturnKind::Stream,
            ))
    }

    async fn published_registry(bus: Arc<MemoryEventBus>) -> ServiceRegistry {
        let registry = ServiceRegistry::new(bus, &RpcConfig::default());
        registry
            .register(descriptor(), Arc::new(CalcService))
            .await
            .unwrap();
        registry
    }

    async fn proxy(bus: Arc<MemoryEventBus>) -> RpcServiceProxy {
        RpcServiceProxy::start(
            ServiceIdentifier::new("org.acme.Calc"),
            bus,
            &RpcConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn invoke_round_trips_through_the_bus() {
        let bus = Arc::new(MemoryEventBus::new());
        let _registry = published_registry(bus.clone()).await;
        let proxy = proxy(bus).await;

        let value = proxy
            .invoke("add", vec![serde_json::json!(2), serde_json::json!(40)])
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!(42));
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn typed_call_deserializes_the_reply() {
        let bus = Arc::new(MemoryEventBus::new());
        let _registry = published_registry(bus.clone()).await;
        let proxy = proxy(bus).await;

        let value: i64 = proxy
            .call("add", vec![serde_json::json!(20), serde_json::json!(22)])
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn remote_fault_surfaces_with_original_identity() {
        let bus = Arc::new(MemoryEventBus::new());
        let _registry = published_registry(bus.clone()).await;
        let proxy = proxy(bus).await;

        match proxy.invoke("boom", vec![]).await.unwrap_err() {
            RpcError::Remote {
                exception_class,
                message,
                ..
            } => {
                assert_eq!(exception_class, "org.acme.Boom");
                assert_eq!(message, "always fails");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn stream_call_emits_elements_in_order_then_completes() {
        let bus = Arc::new(MemoryEventBus::new());
        let _registry = published_registry(bus.clone()).await;
        let proxy = proxy(bus).await;

        let mut call = proxy
            .invoke_stream("countTo", vec![serde_json::json!(3)])
            .unwrap();
        assert_eq!(proxy.in_flight(), 1);

        let mut seen = Vec::new();
        while let Some(item) = call.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                serde_json::json!(1),
                serde_json::json!(2),
                serde_json::json!(3)
            ]
        );
        // Entry removed only by the terminal marker.
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn stream_cancel_terminates_with_cancelled_error() {
        let bus = Arc::new(MemoryEventBus::new());
        // No service registered: the request is never answered.
        let _requests = bus
            .listen(&Cri::parse("srv://org.acme.Calc").unwrap())
            .await
            .unwrap();
        let proxy = proxy(bus).await;

        let mut call = proxy
            .invoke_stream("countTo", vec![serde_json::json!(5)])
            .unwrap();
        call.cancel("caller lost interest");

        match call.next().await.unwrap().unwrap_err() {
            RpcError::Cancelled(message) => assert_eq!(message, "caller lost interest"),
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert!(call.next().await.is_none());
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_the_call_and_clears_the_entry() {
        let bus = Arc::new(MemoryEventBus::new());
        // A listener that never replies.
        let _requests = bus
            .listen(&Cri::parse("srv://org.acme.Calc").unwrap())
            .await
            .unwrap();
        let proxy = proxy(bus).await;

        let started = tokio::time::Instant::now();
        let err = proxy
            .invoke_with_timeout("add", vec![], Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(err, RpcError::Timeout(Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn duplicate_reply_is_discarded() {
        let bus = Arc::new(MemoryEventBus::new());
        let proxy = proxy(bus.clone()).await;

        let (handler, mut rx) = SingleValueHandler::new(proxy.converter.clone());
        proxy
            .pending
            .insert("cid-dup".to_string(), Box::new(handler));

        let reply = |payload: &str| {
            let metadata: Metadata = [
                (headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON),
                (headers::CORRELATION_ID, "cid-dup"),
            ]
            .into_iter()
            .collect();
            Event::with_metadata(proxy.reply_to().clone(), metadata, payload.to_string())
        };

        proxy.pending.route(reply("1"));
        assert_eq!(proxy.in_flight(), 0);
        // Second reply for the same id: entry is gone, nothing observable.
        proxy.pending.route(reply("2"));

        assert_eq!(rx.try_recv().unwrap().unwrap(), serde_json::json!(1));
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_to_the_caller() {
        // Nobody listens on the service CRI, so sending fails.
        let bus = Arc::new(MemoryEventBus::new());
        let proxy = proxy(bus).await;

        let err = proxy.invoke("add", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn proxy_stop_halts_the_reply_listener() {
        let bus = Arc::new(MemoryEventBus::new());
        let mut proxy = proxy(bus).await;
        proxy.stop().await;
    }
}
