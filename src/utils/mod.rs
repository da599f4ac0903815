//! Utils module - Utility functions and helpers

pub mod fs;
pub mod logging;
pub mod metrics;
