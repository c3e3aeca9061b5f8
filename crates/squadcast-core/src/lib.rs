// Library root: data aggregation and feature assembly for the squadcast
// pipeline.

pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod upstream;
