//! Shared identifiers and the domain error model.
//!
//! Pure types only: nothing in here touches IO, HTTP or storage.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, DeliveryRecordId, JobId, PostId, TenantId};
