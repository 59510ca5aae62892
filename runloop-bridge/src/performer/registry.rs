//! Dispatch thread → performer context table.
//!
//! Contexts are created on first use by the dispatch thread that needs one
//! and then only read by offering threads.

use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::DashMap;

use crate::config::BridgeConfig;
use crate::performer::context::PerformerContext;

#[derive(Debug)]
pub struct PerformerRegistry {
    performers: DashMap<ThreadId, Arc<PerformerContext>>,
    config: BridgeConfig,
}

impl Default for PerformerRegistry {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl PerformerRegistry {
    pub fn new(config: BridgeConfig) -> Self {
        Self { performers: DashMap::new(), config }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&crate::PERFORMERS)
    }

    /// Context for `thread`, created atomically if it does not exist yet.
    pub fn get_or_create(&self, thread: ThreadId) -> Arc<PerformerContext> {
        let entry = self.performers.entry(thread).or_insert_with(|| {
            tracing::debug!(?thread, "creating performer context");
            Arc::new(PerformerContext::new(thread, self.config.clone()))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, thread: ThreadId) -> Option<Arc<PerformerContext>> {
        self.performers.get(&thread).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the context of a dispatch thread that is going away.
    pub fn remove(&self, thread: ThreadId) -> Option<Arc<PerformerContext>> {
        self.performers.remove(&thread).map(|(_, context)| context)
    }

    /// Frame depth for `thread`; zero when it has no context.
    pub fn frame_depth(&self, thread: ThreadId) -> usize {
        self.get(thread).map_or(0, |context| context.frame_depth())
    }

    pub fn len(&self) -> usize {
        self.performers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.performers.is_empty()
    }
}
