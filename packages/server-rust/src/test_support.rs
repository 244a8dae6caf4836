//! In-memory event bus used by tests in place of the real transport.

use async_trait::async_trait;
use conduit_core::{Cri, Event, EventBus, EventStream};
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Routes events to listeners by the base-resource form of their CRI, the
/// same key dispatchers and proxies listen on. Sending with no listener is a
/// transport error, mirroring a bus with no subscribers.
pub struct MemoryEventBus {
    listeners: DashMap<String, mpsc::UnboundedSender<Event>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn send(&self, event: Event) -> anyhow::Result<()> {
        let key = event.cri().base_resource().to_string();
        let Some(tx) = self.listeners.get(&key) else {
            anyhow::bail!("no listener for {key}");
        };
        tx.send(event)
            .map_err(|_| anyhow::anyhow!("listener for {key} is gone"))
    }

    async fn listen(&self, cri: &Cri) -> anyhow::Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(cri.base_resource().to_string(), tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
