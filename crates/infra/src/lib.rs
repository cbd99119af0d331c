//! Infrastructure layer: job storage, platform API clients and the
//! publishing queue processor.

pub mod platforms;
pub mod processor;
pub mod store;

pub use platforms::{PlatformEndpoints, PlatformPublisher, PublishError, PublishRequest, Publishers};
pub use processor::{
    JobReport, ProcessError, ProcessSummary, ProcessorConfig, QueueProcessor, ReportStatus,
};
pub use store::{DueJob, InMemoryPublishStore, JobStats, PgPublishStore, PublishStore, StoreError};
