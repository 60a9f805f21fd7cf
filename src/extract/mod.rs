pub mod extractor;
pub mod mux;
pub mod resolver;

pub use extractor::{ClipOutcome, ClipSpan, ExtractionRequest, Extractor};
pub use mux::{FfmpegMuxer, Muxer};
pub use resolver::{ResolvedRange, ResolverConfig, resolve, resolve_within};
