pub mod error;
pub mod logging;
pub mod snapshot;
pub mod timestamp;

pub use error::{
    DetectionError, ExtractError, ExtractResult, IngestError, MuxError, ResolveError,
    SchedulerFull,
};
pub use logging::{ComponentLogger, LogContext};
pub use snapshot::FileSnapshot;
pub use timestamp::*;
