//! Matchmaking - pairs connected sessions into matches

pub mod queue;
pub mod service;

pub use service::{MatchmakingHandle, MatchmakingMsg, MatchmakingService, MatchmakingStats};
