//! Live background replacement.
//!
//! Each frame goes through a [`Segmenter`](segmentation::Segmenter), which
//! produces a foreground [`Mask`](segmentation::Mask), and a
//! [`BackgroundProcessor`](background::BackgroundProcessor), which keeps the
//! foreground pixels and replaces the rest with a synthetic background.
//! [`FramePipeline`](pipeline::FramePipeline) chains the two.

pub mod background;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod segmentation;

pub use error::{PipelineError, Result};
pub use pipeline::FramePipeline;
