//! Address validation — syntax, disposable domains, and MX records.

pub mod dns;
pub mod email;

use async_trait::async_trait;

use crate::error::ValidationError;

pub use dns::DnsMxResolver;
pub use email::EmailValidator;

/// Decides whether an address is worth contacting.
///
/// Infrastructure problems are folded into a negative verdict; this never
/// fails.
#[async_trait]
pub trait AddressValidator: Send + Sync {
    async fn validate(&self, address: &str) -> bool;
}

/// Looks up whether a domain publishes mail exchangers.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// `Ok(false)` when the domain has no MX records; `Err` when the lookup
    /// itself failed.
    async fn has_mx(&self, domain: &str) -> Result<bool, ValidationError>;
}
