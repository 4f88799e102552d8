//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the date-indexed [`Panel`] container
//! - series metadata and loaded datasets
//! - configuration enums and per-stage settings
//! - ranking and evaluation records

pub mod panel;
pub mod types;

pub use panel::*;
pub use types::*;
