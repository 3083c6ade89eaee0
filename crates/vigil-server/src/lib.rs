//! Wiring for the vigil alert pipeline: configuration, seed loading,
//! the ingest pipeline itself and its maintenance scheduler.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod seed;
