//! Pattern ingestion
//!
//! - `record`: pattern records as producers publish them
//! - `vectorize`: embeddings for records without a vector
//! - `fingerprint`: versioned dedup fingerprints
//! - `dedup`: time and size bounded dedup window
//! - `queue`: hysteresis backpressure queue
//! - `gateway`: admission, batching and the worker threads

pub mod dedup;
pub mod fingerprint;
pub mod gateway;
pub mod queue;
pub mod record;
pub mod vectorize;

pub use dedup::DedupWindow;
pub use fingerprint::Fingerprinter;
pub use gateway::{BatchReport, IngestionGateway, SubmitOutcome};
pub use queue::{Admission, IngestQueue, QueuedRecord};
pub use record::{PatternRecord, INTENSITY_ATTRIBUTE};
pub use vectorize::PatternVectorizer;
