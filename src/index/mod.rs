pub mod codec;
pub mod reader;
pub mod writer;

pub use codec::{FrameIndexEntry, RECORD_SIZE, decode_all};
pub use reader::{read_index, read_index_file};
pub use writer::IndexWriter;
