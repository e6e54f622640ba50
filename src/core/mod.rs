//! Core infrastructure for bundle execution
//!
//! Unit model, dependency resolution, phase execution and the ambient
//! pieces they share (configuration, errors, output, locking).

pub mod config;
pub mod context;
pub mod deps;
pub mod error;
pub mod executor;
pub mod lock;
pub mod output;
pub mod phase;
pub mod privilege;
pub mod unit;
