//! Shared application state.

use std::sync::Arc;

use pixelforge_db::DbPool;
use pixelforge_events::EventBus;

use crate::config::ServerConfig;
use crate::ingest::IngestService;
use crate::submission::SubmissionService;
use crate::ws::registry::SessionRegistry;

/// State handed to every handler. Cloning is cheap: the pool is an Arc
/// internally and everything else is behind one.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub bus: Arc<EventBus>,
    pub submission: Arc<SubmissionService>,
    pub ingest: Arc<IngestService>,
}
