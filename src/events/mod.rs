pub mod detections;
pub mod event;
pub mod ingest;
pub mod processor;
pub mod scheduler;

pub use detections::{ClipNotes, DetectionClient, DetectionFrame};
pub use event::Event;
pub use ingest::{IngestServer, Reply, send_request};
pub use processor::{EventProcessor, ProcessorHandles, ProcessorSettings};
pub use scheduler::{EventScheduler, ScheduledEvent};
