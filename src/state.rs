use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::generation::GenerationClient;
use crate::speech::SpeechBackend;

/// Shared application state. The upstream clients are constructed once at
/// the process entry point and injected here; no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub speech: Arc<dyn SpeechBackend>,
    pub generation: Arc<GenerationClient>,
    pub backend: Arc<BackendClient>,
    pub connections: Arc<DashMap<String, ConnectionInfo>>,
}

/// Bookkeeping for one live WebSocket connection. Session state itself is
/// owned by the connection's task; nothing is shared across connections.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connected_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        speech: Arc<dyn SpeechBackend>,
        generation: Arc<GenerationClient>,
        backend: Arc<BackendClient>,
    ) -> Self {
        Self {
            config,
            speech,
            generation,
            backend,
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn generate_client_uid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
