//! adaptest-core: Adaptive examination engine.
//!
//! This crate defines the question model, the all-or-nothing validator, the
//! difficulty controller, the question selector, the session reducer and the
//! diagnostic report synthesizer that the rest of adaptest builds on.

pub mod aggregator;
pub mod diagnostics;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod report;
pub mod results;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod statistics;
pub mod traits;
