//! Core engine for untisync.
//!
//! This crate covers everything below the terminal surface: the WebUntis
//! HTTP client, the wire-to-model transformation, the on-disk cache, the
//! change-detection diff and the sync orchestration tying them together.

pub mod cache;
pub mod client;
pub mod config;
pub mod diff;
pub mod element;
pub mod error;
pub mod lesson;
pub mod merge;
pub mod raw;
pub mod session;
pub mod sync;
pub mod transform;

pub use error::{UntisyncError, UntisyncResult};
