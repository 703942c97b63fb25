//! Persistence layer — lead records behind the `LeadStore` trait.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlLeadStore;
pub use memory::MemoryLeadStore;
pub use traits::LeadStore;
