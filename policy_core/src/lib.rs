//! # Policy Core
//!
//! The per-turn dialogue policy engine. Given a user utterance and the
//! accumulated `dialogue_state`, it decides what the system does next: one
//! reactive action that answers the user's most pressing need, and up to two
//! proactive actions that move the conversation forward, under a fixed token
//! budget handed to an external text generator.
//!
//! ## Core Components
//!
//! - **signals**: lexical (and optionally semantic) detection of cues in the utterance and state
//! - **tracker**: the decaying, normalized situation composition
//! - **catalog**: validated action definitions loaded from TOML or JSON
//! - **selector**: composite scoring, continuity and recency rules
//! - **composer**: slot budgets and final well-formedness checks
//! - **engine**: the turn pipeline, selective context, and the session guard
//!
//! ## Design Philosophy
//!
//! - **Bounded context**: the generator sees only what the selected actions name
//! - **Degrade, don't fail**: missing capabilities and bad turns fall back to safe defaults
//! - **Commit at the end**: a turn's state changes land together or not at all

pub mod catalog;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod selector;
pub mod signals;
pub mod tracker;

pub use catalog::*;
pub use composer::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use selector::*;
pub use signals::*;
pub use tracker::*;
