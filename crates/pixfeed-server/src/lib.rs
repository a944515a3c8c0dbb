//! # pixfeed-server
//!
//! The `pixfeed` service: fetches the upstream WebP on every `GET /feed`,
//! runs it through the render and encode pipeline and answers with a GIF or
//! PNG.

pub mod feed;
pub mod server;
pub mod upstream;

pub use feed::{FeedFailure, FeedService, Stage};
pub use server::{router, run_server, AppState};
pub use upstream::Upstream;
