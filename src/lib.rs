pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod init;
pub mod menu;
pub mod objects;
pub mod operations;
pub mod report;
pub mod shutdown;

// Re-export key types for convenience
pub use api::{CrmClient, CrmRecord, RateLimitedTransport, RetryPolicy};
pub use config::Config;
pub use engine::{
    process_batches, BatchError, BatchProcessor, ChunkedCsvWriter, OperationResult, Paginator,
    ProgressReporter,
};
pub use error::{ApiError, EngineError};
pub use init::{initialize_config, InitOptions};
pub use operations::Operations;

// Test utilities module - only compiled with test or testing feature
#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
