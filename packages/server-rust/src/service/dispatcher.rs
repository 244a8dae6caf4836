//! The dispatch core: one `ServiceDispatcher` per published service.
//!
//! The dispatcher consumes events addressed at its service's base-resource
//! CRI and, for each one: matches the addressed instance, selects the
//! function named by the CRI path, resolves arguments, invokes the handler,
//! and sends the converted result (or marshalled failure) back to the
//! inbound `reply-to` address. Handler invocation runs on a spawned worker
//! task so a slow handler never blocks the bus consumer loop.

use std::sync::Arc;

use bytes::Bytes;
use conduit_core::{
    headers, Event, EventBus, Metadata, Participant, ReturnKind, ServiceDescriptor,
    ServiceIdentifier,
};
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::RpcError;
use crate::service::converter::ReturnValueConverterComposite;
use crate::service::exception::{ExceptionConverterComposite, Fault};
use crate::service::handler::{InvocationResult, ServiceHandler};
use crate::service::resolver::ArgumentResolverComposite;

// ---------------------------------------------------------------------------
// DispatchContext
// ---------------------------------------------------------------------------

/// Everything a worker task needs to process one inbound event.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub descriptor: Arc<ServiceDescriptor>,
    pub handler: Arc<dyn ServiceHandler>,
    pub resolvers: Arc<ArgumentResolverComposite>,
    pub converters: Arc<ReturnValueConverterComposite>,
    pub exceptions: Arc<ExceptionConverterComposite>,
    pub bus: Arc<dyn EventBus>,
}

// ---------------------------------------------------------------------------
// ServiceDispatcher
// ---------------------------------------------------------------------------

/// Handle to the running consumer loop of one published service.
pub struct ServiceDispatcher {
    identifier: ServiceIdentifier,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServiceDispatcher {
    /// Subscribes to the service's base-resource CRI and starts consuming.
    ///
    /// # Errors
    ///
    /// Returns an error when the service identifier does not form a valid
    /// CRI or the bus subscription cannot be established.
    pub(crate) async fn start(context: DispatchContext) -> anyhow::Result<Self> {
        let identifier = context.descriptor.identifier().clone();
        let cri = identifier.cri()?;
        let mut events = context.bus.listen(&cri).await?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.next() => {
                        match event {
                            Some(event) => {
                                // Worker task per event: the consumer loop never
                                // awaits a handler.
                                tokio::spawn(handle_event(context.clone(), event));
                            }
                            None => break, // Bus closed the subscription.
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            identifier,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    /// Stops the consumer loop. In-flight worker tasks run to completion.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Per-event processing
// ---------------------------------------------------------------------------

pub(crate) async fn handle_event(context: DispatchContext, event: Event) {
    if let Err(rpc_error) = process(&context, &event).await {
        if event.metadata().contains(headers::REPLY_TO) {
            send_error_reply(&context, event.metadata(), &Fault::from(&rpc_error)).await;
        } else {
            warn!(cri = %event.cri(), error = %rpc_error, "dropping failed event with no reply-to");
        }
    }
}

async fn process(context: &DispatchContext, event: &Event) -> Result<(), RpcError> {
    // 1. Match the addressed instance: resource name, version, and scope must
    //    all agree with this registration.
    let addressed = ServiceIdentifier::from_cri(event.cri());
    if addressed != *context.descriptor.identifier() {
        return Err(RpcError::NotFound(format!(
            "no service instance for {addressed}"
        )));
    }

    // 2. Select the function named by the CRI path.
    let function_name = event
        .cri()
        .path()
        .ok_or_else(|| RpcError::NotFound("address names no function".to_string()))?;
    let function = context
        .descriptor
        .function(function_name)
        .ok_or_else(|| {
            RpcError::NotFound(format!(
                "{} has no function {function_name}",
                context.descriptor.identifier()
            ))
        })?
        .clone();

    // 3. Resolve arguments; participant parameters bind to the session
    //    identity stamped on the event, never to the payload.
    let participant = sender_participant(event.metadata())?;
    let args = context
        .resolvers
        .resolve(event, &function, participant.as_ref())?;

    // 4. Invoke and await completion.
    let result = context.handler.invoke(function.name(), args).await;

    // 5./6. Convert and send the reply.
    let reply_expected = event.metadata().contains(headers::REPLY_TO);
    match result {
        Ok(InvocationResult::Value(value)) => {
            if reply_expected {
                let reply =
                    context
                        .converters
                        .convert(event.metadata(), function.returns(), value)?;
                send_reply(context, reply).await;
            } else if function.returns() != ReturnKind::Unit {
                warn!(
                    function = function.name(),
                    "discarding return value: request had no reply-to"
                );
            }
        }
        Ok(InvocationResult::Stream(mut items)) => {
            if !reply_expected {
                warn!(
                    function = function.name(),
                    "discarding reply stream: request had no reply-to"
                );
                return Ok(());
            }
            while let Some(item) = items.next().await {
                match item {
                    Ok(value) => {
                        let reply = context.converters.convert(
                            event.metadata(),
                            ReturnKind::Stream,
                            value,
                        )?;
                        send_reply(context, reply).await;
                    }
                    Err(fault) => {
                        send_error_reply(context, event.metadata(), &Fault::from(&fault)).await;
                        return Ok(());
                    }
                }
            }
            send_stream_complete(context, event.metadata()).await;
        }
        Err(fault) => {
            if reply_expected {
                send_error_reply(context, event.metadata(), &Fault::from(&fault)).await;
            } else {
                warn!(
                    function = function.name(),
                    error = %fault,
                    "handler failed on fire-and-forget invocation"
                );
            }
        }
    }
    Ok(())
}

fn sender_participant(metadata: &Metadata) -> Result<Option<Participant>, RpcError> {
    match metadata.get(headers::SENDER) {
        None => Ok(None),
        Some(json) => serde_json::from_str(json)
            .map(Some)
            .map_err(|e| RpcError::BadArguments(format!("unreadable sender identity: {e}"))),
    }
}

/// Reply delivery is at-most-once: a send failure is logged, never retried.
async fn send_reply(context: &DispatchContext, reply: Event) {
    if let Err(e) = context.bus.send(reply).await {
        error!(error = %e, "failed to send reply");
    }
}

async fn send_error_reply(context: &DispatchContext, inbound: &Metadata, fault: &Fault) {
    match context.exceptions.to_event(inbound, fault) {
        Ok(reply) => send_reply(context, reply).await,
        Err(e) => error!(error = %e, "could not build error reply"),
    }
}

async fn send_stream_complete(context: &DispatchContext, inbound: &Metadata) {
    let terminal: Metadata = [(headers::CONTROL, headers::CONTROL_COMPLETE)]
        .into_iter()
        .collect();
    match Event::reply_to(inbound, terminal, Bytes::new()) {
        Ok(reply) => send_reply(context, reply).await,
        Err(e) => debug!(error = %e, "could not build stream-complete reply"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
