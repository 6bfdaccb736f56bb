//! VIDEOWALL - Vehicle trajectory playback and caching engine
//!
//! Re-exports all modules for use by binary targets.

// Core engine (caches, window, playback, pipeline)
pub mod cache;
pub mod lanes;
pub mod model;
pub mod pipeline;
pub mod playback;
pub mod source;
pub mod window;

// App modules
pub mod cli;
pub mod config;
pub mod render;
pub mod server;

// Re-export commonly used types from the core
pub use cache::BoundedAttributeCache;
pub use pipeline::{FrameConsumer, PipelineItem, StepOutcome, StreamingPipeline};
pub use playback::{PlaybackLoop, PlaybackState, TickOutcome};
pub use source::{FrameSource, MemoryFrameSource, RawFrame};
pub use window::{AdvanceMode, WindowController, WindowState};

// Re-export model shapes
pub use model::{RenderModel, TrajectorySegment, VehicleAttributes, VehicleFrame, VehicleId};
