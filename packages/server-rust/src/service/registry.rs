//! The published-handler table: registration and teardown of service
//! dispatchers.

use std::sync::Arc;

use conduit_core::{EventBus, ServiceDescriptor, ServiceIdentifier};
use dashmap::DashMap;

use crate::config::RpcConfig;
use crate::service::converter::{JsonReturnValueConverter, ReturnValueConverterComposite};
use crate::service::dispatcher::{DispatchContext, ServiceDispatcher};
use crate::service::exception::{ExceptionConverterComposite, JsonExceptionConverter};
use crate::service::handler::ServiceHandler;
use crate::service::resolver::{ArgumentResolverComposite, JsonArgumentResolver};

/// Errors from service registration and teardown.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service already registered: {0}")]
    AlreadyRegistered(ServiceIdentifier),
    #[error("no service registered: {0}")]
    NotRegistered(ServiceIdentifier),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Owns one [`ServiceDispatcher`] per registered service.
///
/// This is the only service-side cross-request shared state; it is an
/// explicit instance owned by the hosting process and handed to whichever
/// component needs it, never a process-wide singleton.
pub struct ServiceRegistry {
    bus: Arc<dyn EventBus>,
    resolvers: Arc<ArgumentResolverComposite>,
    converters: Arc<ReturnValueConverterComposite>,
    exceptions: Arc<ExceptionConverterComposite>,
    dispatchers: DashMap<ServiceIdentifier, ServiceDispatcher>,
}

impl ServiceRegistry {
    /// Creates a registry with the default JSON resolver/converter chains.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, config: &RpcConfig) -> Self {
        Self::with_pipelines(
            bus,
            ArgumentResolverComposite::new().with_resolver(JsonArgumentResolver),
            ReturnValueConverterComposite::new().with_converter(JsonReturnValueConverter),
            ExceptionConverterComposite::new()
                .with_converter(JsonExceptionConverter::new(config.debug)),
        )
    }

    /// Creates a registry with caller-assembled pipelines. Chain order is
    /// preserved as registered.
    #[must_use]
    pub fn with_pipelines(
        bus: Arc<dyn EventBus>,
        resolvers: ArgumentResolverComposite,
        converters: ReturnValueConverterComposite,
        exceptions: ExceptionConverterComposite,
    ) -> Self {
        Self {
            bus,
            resolvers: Arc::new(resolvers),
            converters: Arc::new(converters),
            exceptions: Arc::new(exceptions),
            dispatchers: DashMap::new(),
        }
    }

    /// Publishes a service: starts a dispatcher consuming its base-resource
    /// CRI.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] for a duplicate
    /// identifier, or a transport error when the subscription fails.
    pub async fn register(
        &self,
        descriptor: ServiceDescriptor,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<(), RegistryError> {
        let identifier = descriptor.identifier().clone();
        if self.dispatchers.contains_key(&identifier) {
            return Err(RegistryError::AlreadyRegistered(identifier));
        }

        let context = DispatchContext {
            descriptor: Arc::new(descriptor),
            handler,
            resolvers: self.resolvers.clone(),
            converters: self.converters.clone(),
            exceptions: self.exceptions.clone(),
            bus: self.bus.clone(),
        };
        let mut dispatcher = ServiceDispatcher::start(context).await?;

        match self.dispatchers.entry(identifier) {
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(dispatcher);
                Ok(())
            }
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                // Lost a registration race; tear down the younger dispatcher.
                let identifier = entry.key().clone();
                drop(entry);
                dispatcher.stop().await;
                Err(RegistryError::AlreadyRegistered(identifier))
            }
        }
    }

    /// Unpublishes a service and stops its dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] when the identifier has no
    /// live registration.
    pub async fn unregister(&self, identifier: &ServiceIdentifier) -> Result<(), RegistryError> {
        match self.dispatchers.remove(identifier) {
            Some((_, mut dispatcher)) => {
                dispatcher.stop().await;
                Ok(())
            }
            None => Err(RegistryError::NotRegistered(identifier.clone())),
        }
    }

    #[must_use]
    pub fn is_registered(&self, identifier: &ServiceIdentifier) -> bool {
        self.dispatchers.contains_key(identifier)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
