//! Measurement harness: cancellation, worker pool, scenarios, load sweep, and
//! the full experiment.

pub mod accumulator;
pub mod cancel;
pub mod experiment;
pub mod load;
pub mod runner;
pub mod scenario;
