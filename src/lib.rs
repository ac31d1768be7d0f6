//! Reorch - Multi-Track Mixing and Playback Engine
//!
//! Reorch holds a set of decoded audio tracks, mixes them block by block into
//! one output stream for real-time playback, and supports non-destructive
//! editing: range selection, extraction into a new track, and splitting a
//! track into instrument stems with an external separation tool.
//!
//! # Architecture
//!
//! - [`engine::Project`]: an ordered, copy-on-write list of tracks, mixed by
//!   [`engine::Project::mix_block`]
//! - [`engine::Player`]: drives an [`engine::OutputDevice`] that pulls one
//!   mixed block per callback and advances a lock-free cursor
//! - [`engine::Codecs`] and [`separation::Separator`]: the file and
//!   external-tool boundaries, all failures returned as [`ReorchError`]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod separation;

pub use config::EngineConfig;
pub use error::{ReorchError, Result};
