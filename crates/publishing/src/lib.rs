//! Publishing domain module.
//!
//! Business rules for delivering scheduled posts to social platforms,
//! implemented as deterministic domain logic (no IO, no HTTP, no storage).
//! The queue processor in `jbsaas-infra` drives these types through one
//! claim → attempt → resolve cycle per job.

pub mod account;
pub mod delivery;
pub mod job;
pub mod outcome;
pub mod platform;
pub mod retry;

pub use account::{AccessToken, DestinationAccount, PostContent};
pub use delivery::{AttemptOutcome, DeliveryStatus, DeliveryStatusRecord};
pub use job::{JobStatus, PublishJob};
pub use outcome::{JobResolution, PublishReceipt};
pub use platform::{Platform, UnsupportedPlatform};
pub use retry::{RETRY_CEILING, RetryPolicy};
