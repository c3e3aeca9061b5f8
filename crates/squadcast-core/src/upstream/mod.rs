// Read-only access to the fantasy data service.
//
// `FplSource` is the seam between the aggregator and the network so the
// aggregator can be driven by an in-memory source in tests.

pub mod http;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpFplSource;
use wire::{RawBootstrap, RawElementSummary, RawEntry, RawEntryHistory, RawFixture, RawPicks};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} not found")]
    NotFound { url: String },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// The six read operations the pipeline needs.
#[async_trait]
pub trait FplSource: Send + Sync {
    async fn bootstrap(&self) -> Result<RawBootstrap, UpstreamError>;

    async fn fixtures(&self, gameweek: u32) -> Result<Vec<RawFixture>, UpstreamError>;

    async fn entry(&self, manager_id: u64) -> Result<RawEntry, UpstreamError>;

    async fn entry_history(&self, manager_id: u64) -> Result<RawEntryHistory, UpstreamError>;

    async fn entry_picks(&self, manager_id: u64, gameweek: u32)
        -> Result<RawPicks, UpstreamError>;

    async fn element_summary(&self, player_id: u32) -> Result<RawElementSummary, UpstreamError>;
}
