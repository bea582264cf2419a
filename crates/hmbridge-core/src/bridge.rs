//! The bridge facade.
//!
//! Owns the discovery publisher and event translator over one shared
//! registry and receives controller callbacks for both.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::discovery::DiscoveryPublisher;
use crate::ports::{BusPublisher, DeviceCallbacks};
use crate::registry::DeviceRegistry;
use crate::translator::EventTranslator;
use crate::value::{AttrValue, ChannelDescriptor};

pub struct Bridge {
    registry: Arc<DeviceRegistry>,
    discovery: DiscoveryPublisher,
    translator: EventTranslator,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        registry: Arc<DeviceRegistry>,
        bus: Arc<dyn BusPublisher>,
    ) -> Self {
        Self {
            discovery: DiscoveryPublisher::new(config.clone(), registry.clone(), bus.clone()),
            translator: EventTranslator::new(config, registry.clone(), bus),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn discovery(&self) -> &DiscoveryPublisher {
        &self.discovery
    }

    pub fn translator(&self) -> &EventTranslator {
        &self.translator
    }
}

#[async_trait]
impl DeviceCallbacks for Bridge {
    async fn on_discovery(&self, session_id: &str, descriptors: Vec<ChannelDescriptor>) {
        self.discovery.handle_batch(session_id, &descriptors).await;
    }

    async fn on_event(&self, session_id: &str, address: &str, field: &str, value: AttrValue) {
        self.translator
            .handle_event(session_id, address, field, value)
            .await;
    }
}
