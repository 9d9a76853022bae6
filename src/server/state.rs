//! Server application state shared across handlers

use std::sync::Arc;

use super::events::EventBroadcaster;
use crate::completion::CompletionClient;
use crate::config::PipelineConfig;
use crate::research::ResearchService;
use crate::shutdown::ShutdownState;

#[derive(Clone)]
pub struct ServerAppState {
    /// Job creation, status and execution
    pub service: ResearchService,

    /// Event broadcaster for WebSocket clients
    pub broadcaster: Arc<EventBroadcaster>,

    pub shutdown_state: ShutdownState,
}

impl ServerAppState {
    /// Wire the research service to a fresh broadcaster
    pub fn new(
        client: Arc<dyn CompletionClient>,
        config: PipelineConfig,
        shutdown_state: ShutdownState,
    ) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let service = ResearchService::new(client, config).with_broadcaster(broadcaster.clone());

        Self {
            service,
            broadcaster,
            shutdown_state,
        }
    }
}
