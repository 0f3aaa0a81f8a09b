//! Latency statistics: percentile summaries and explicit result states.

pub mod entry;
pub mod summary;
