//! `nowcast` library crate.
//!
//! The binary (`nowcast`) is a thin wrapper around this library so that:
//!
//! - the estimation core is testable without spawning processes
//! - every stage (alignment, correction, selection, models, evaluation) is
//!   usable on its own
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod eval;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod selection;
