//! MX lookups through the system resolver.

use async_trait::async_trait;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::error::ResolveErrorKind;
use tracing::debug;

use crate::error::ValidationError;
use crate::validation::MxResolver;

/// `MxResolver` backed by trust-dns with the host's resolver configuration.
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
}

impl DnsMxResolver {
    /// Build a resolver from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> Result<Self, ValidationError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| ValidationError::ResolverSetup(e.to_string()))?;
        Ok(Self { resolver })
    }

    pub fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl MxResolver for DnsMxResolver {
    async fn has_mx(&self, domain: &str) -> Result<bool, ValidationError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let count = lookup.iter().count();
                debug!(domain, count, "MX lookup complete");
                Ok(count > 0)
            }
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                debug!(domain, "No MX records");
                Ok(false)
            }
            Err(e) => Err(ValidationError::MxLookup {
                domain: domain.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
