// src/lib.rs
pub mod catalog;
pub mod config;
pub mod core;
pub mod events;
pub mod extract;
pub mod index;
pub mod recorder;
pub mod testing;

// Re-export die wichtigsten Typen
pub use catalog::{Segment, SegmentCatalog, SegmentMetadata};
pub use config::Config;
pub use core::{ComponentLogger, LogContext};
pub use events::{Event, EventProcessor, EventScheduler, IngestServer};
pub use extract::{ExtractionRequest, Extractor, FfmpegMuxer, Muxer};
pub use index::FrameIndexEntry;
