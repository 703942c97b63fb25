//! Lead records and the fields the pipeline reads and writes.

pub mod model;

pub use model::{
    EmailVerified, LeadField, LeadIndex, LeadRecord, LeadUpdate, ProcessingStatus, ResponseStatus,
};
