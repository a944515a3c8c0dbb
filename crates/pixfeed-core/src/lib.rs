//! # pixfeed-core
//!
//! Core types shared across the pixfeed crates: frame buffers, the
//! configuration model, content hashing and the error type every stage of
//! the feed pipeline reports through.

pub mod config;
pub mod error;
pub mod frame;
pub mod hash;

pub use config::*;

pub use error::{FeedError, FeedResult};
pub use frame::{FrameBuffer, OutputFrame, PixelFormat, SourceFrame};
pub use hash::ContentHash;
