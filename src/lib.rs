//! Lead pipeline — concurrent discovery, verification, and outreach of sales leads.

pub mod channels;
pub mod config;
pub mod error;
pub mod leads;
pub mod pipeline;
pub mod store;
pub mod validation;
