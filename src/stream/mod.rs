//! Async stream adapters for consumers running on tokio

mod frames;

pub use frames::FrameStream;
