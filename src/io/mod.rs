//! Input/output helpers.
//!
//! - CSV ingest of panels, metadata and vintages (`ingest`)
//! - CSV / spreadsheet / JSON exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
