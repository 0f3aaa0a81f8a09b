//! Core types: errors, configuration, ordered report maps.

pub mod config;
pub mod errors;
pub mod ordered;
