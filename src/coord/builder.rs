//! Orchestrator construction

use std::sync::Arc;

use crate::coord::orchestrator::Orchestrator;
use crate::core::config::CoordinatorConfig;
use crate::core::errors::Result;
use crate::dispatch::channel::ChannelAdapter;
use crate::dispatch::dispatcher::Dispatcher;
use crate::store::{MemoryStore, Store};

/// Builder wiring a store, channel adapters and configuration into an
/// [`Orchestrator`]. Without an explicit store the in-memory reference
/// implementation is used.
pub struct OrchestratorBuilder {
    config: CoordinatorConfig,
    store: Option<Arc<dyn Store>>,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            store: None,
            adapters: Vec::new(),
        }
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let mut dispatcher = Dispatcher::new(self.config.channel_timeout());
        for adapter in self.adapters {
            dispatcher.register(adapter);
        }
        Ok(Orchestrator::new(store, dispatcher, self.config))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
