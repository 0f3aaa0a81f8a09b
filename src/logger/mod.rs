//! Activity logging: a dedicated logger thread writing JSONL with a fallback chain.

pub mod activity;
pub mod jsonl;
