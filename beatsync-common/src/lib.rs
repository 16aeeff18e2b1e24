//! # beatsync Common Library
//!
//! Shared code for the beatsync crates including:
//! - Beat timing model (BPM segments, stops, beat-zero offset)
//! - Simfile timing reader
//! - Event types (SyncEvent enum) and EventBus
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod simfile;
pub mod timing;

pub use error::{Error, Result};
pub use timing::TimingModel;
