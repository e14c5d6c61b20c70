//! Job queue: durable units of work executed by an external worker

pub mod bulk;
pub mod queue;
pub mod types;

pub use bulk::{BulkFailure, BulkOperation, BulkOutcome, BulkRequest};
pub use queue::JobQueue;
pub use types::{
    BackgroundJob, JobFilter, JobMetadata, JobOutcome, JobPayload, JobResult, JobStatus, JobType,
    NewJob,
};
