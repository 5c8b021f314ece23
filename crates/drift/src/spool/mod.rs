//! Local spooling between the fetch path and the sink.
//!
//! - `buffer`: bounded FIFO handing records from the fetcher to the writer
//! - `writer`: append-only batch unit on disk, sealed by rename

mod buffer;
mod writer;

pub use buffer::{SPOOL_CAPACITY, SpoolConsumer, SpoolProducer, spool_buffer};
pub use writer::{BatchWriter, SealedUnit};
