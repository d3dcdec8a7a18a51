//! Batched-operation engine: batch partitioning for bulk archives, cursor
//! pagination for large reads, and chunked CSV output.

pub mod batch;
pub mod csv_out;
pub mod paginator;
pub mod progress;

pub use batch::{process_batches, BatchError, BatchProcessor, OperationResult};
pub use csv_out::{write_error_ledger, write_field_metadata, write_records_csv, ChunkedCsvWriter};
pub use paginator::{PageSource, Paginator};
pub use progress::{ConsoleProgress, ProgressReporter, SilentProgress};
