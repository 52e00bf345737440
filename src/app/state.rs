//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{MatchRegistry, MatchSettings};
use crate::matchmaking::{MatchmakingHandle, MatchmakingService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub matchmaking: MatchmakingHandle,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    /// Build the state and the matchmaking service it talks to.
    /// The caller decides when to spawn the service.
    pub fn new(config: &Config) -> (Self, MatchmakingService) {
        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new());

        let settings = MatchSettings {
            timings: config.round_timings,
            ..Default::default()
        };
        let (service, matchmaking) = MatchmakingService::new(match_registry.clone(), settings);

        let state = Self {
            matchmaking,
            match_registry,
        };
        (state, service)
    }
}
