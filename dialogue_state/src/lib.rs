//! # Dialogue State
//!
//! The plain-data side of the dialogue policy engine. This crate holds what a
//! conversation has accumulated so far and contains no policy logic.
//!
//! - **knowledge**: what the user has learned, what the system has inferred,
//!   decaying conversation counters, and evidence metrics
//! - **situation**: the normalized 8-dimension vector describing which kind of
//!   conversational work currently dominates

pub mod error;
pub mod knowledge;
pub mod situation;

pub use error::*;
pub use knowledge::*;
pub use situation::*;
