//! Error types for the simulator.

use hydro_core::CoreError;
use hydro_env::TransportError;
use thiserror::Error;

/// Errors surfaced by the engine, its transports and the bootstrap client.
///
/// Publish failures never appear here: the publisher counts them instead.
#[derive(Debug, Error)]
pub enum SimError {
    /// Connection-level failure (connect, reconnect, timeout).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Entity lookup failed while wiring the topology.
    #[error("Topology error: {0}")]
    Topology(#[from] CoreError),

    /// Backend never reported healthy.
    #[error("Backend not reachable at {url} after {secs}s")]
    BackendUnavailable { url: String, secs: u64 },

    /// A bootstrap REST call failed.
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// Payload encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `run` was called on an engine that is not in its initial state.
    #[error("Engine cannot run from state {0}")]
    InvalidState(String),

    /// Name did not match any registered scenario.
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl SimError {
    /// Creates a bootstrap error.
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }
}

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        Self::Bootstrap(err.to_string())
    }
}
