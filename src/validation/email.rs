//! Email address checks used by verification.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::validation::{AddressValidator, MxResolver};

static EMAIL_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+$").unwrap()
});

/// Domains that never belong to a real prospect.
pub const DISPOSABLE_DOMAINS: &[&str] = &[
    "example.com",
    "mailinator.com",
    "tempmail.net",
    "company.com",
    "test.com",
    "business.com",
];

/// Syntax check only.
pub fn is_valid_syntax(address: &str) -> bool {
    EMAIL_SYNTAX.is_match(address)
}

/// Lowercased domain part of an address.
pub fn domain_of(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .filter(|d| !d.is_empty())
}

/// Syntax, disposable-domain, and MX validation.
///
/// Checks short-circuit in that order; the MX lookup only runs for
/// syntactically valid, non-disposable addresses.
pub struct EmailValidator {
    disposable: HashSet<String>,
    resolver: Arc<dyn MxResolver>,
}

impl EmailValidator {
    pub fn new(resolver: Arc<dyn MxResolver>) -> Self {
        Self {
            disposable: DISPOSABLE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            resolver,
        }
    }

    /// Reject an additional domain.
    pub fn with_disposable_domain(mut self, domain: impl Into<String>) -> Self {
        self.disposable.insert(domain.into().to_lowercase());
        self
    }

    pub fn is_disposable(&self, domain: &str) -> bool {
        self.disposable.contains(&domain.to_lowercase())
    }
}

#[async_trait]
impl AddressValidator for EmailValidator {
    async fn validate(&self, address: &str) -> bool {
        if !is_valid_syntax(address) {
            debug!(address, "Rejected: invalid syntax");
            return false;
        }

        let Some(domain) = domain_of(address) else {
            return false;
        };

        if self.is_disposable(&domain) {
            debug!(address, domain = %domain, "Rejected: disposable domain");
            return false;
        }

        match self.resolver.has_mx(&domain).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(address, domain = %domain, "Rejected: no MX records");
                false
            }
            Err(e) => {
                warn!(address, "MX lookup failed, treating as invalid: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ValidationError;

    /// Answers from a fixed domain list and counts lookups.
    struct StubResolver {
        with_mx: Vec<&'static str>,
        fail: bool,
        lookups: AtomicUsize,
    }

    impl StubResolver {
        fn new(with_mx: Vec<&'static str>) -> Self {
            Self {
                with_mx,
                fail: false,
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MxResolver for StubResolver {
        async fn has_mx(&self, domain: &str) -> Result<bool, ValidationError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ValidationError::MxLookup {
                    domain: domain.into(),
                    reason: "timeout".into(),
                });
            }
            Ok(self.with_mx.iter().any(|d| *d == domain))
        }
    }

    #[test]
    fn syntax_accepts_common_addresses() {
        assert!(is_valid_syntax("jane.doe+leads@acme-corp.co.uk"));
        assert!(is_valid_syntax("a_b@x.io"));
    }

    #[test]
    fn syntax_rejects_malformed() {
        assert!(!is_valid_syntax("bad-email"));
        assert!(!is_valid_syntax("two@@acme.io"));
        assert!(!is_valid_syntax("nodot@localhost"));
        assert!(!is_valid_syntax(""));
        assert!(!is_valid_syntax("space in@acme.io"));
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("Jane@ACME.io").as_deref(), Some("acme.io"));
        assert_eq!(domain_of("nodomain@"), None);
        assert_eq!(domain_of("plain"), None);
    }

    #[tokio::test]
    async fn valid_address_with_mx_passes() {
        let validator = EmailValidator::new(Arc::new(StubResolver::new(vec!["acme.io"])));
        assert!(validator.validate("jane@acme.io").await);
    }

    #[tokio::test]
    async fn disposable_domain_skips_lookup() {
        let resolver = Arc::new(StubResolver::new(vec!["mailinator.com"]));
        let validator = EmailValidator::new(resolver.clone());

        assert!(!validator.validate("x@mailinator.com").await);
        assert!(!validator.validate("x@Example.com").await);
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_syntax_skips_lookup() {
        let resolver = Arc::new(StubResolver::new(vec![]));
        let validator = EmailValidator::new(resolver.clone());

        assert!(!validator.validate("bad-email").await);
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_mx_fails() {
        let validator = EmailValidator::new(Arc::new(StubResolver::new(vec![])));
        assert!(!validator.validate("jane@acme.io").await);
    }

    #[tokio::test]
    async fn lookup_error_is_negative_verdict() {
        let mut resolver = StubResolver::new(vec!["acme.io"]);
        resolver.fail = true;
        let validator = EmailValidator::new(Arc::new(resolver));
        assert!(!validator.validate("jane@acme.io").await);
    }

    #[tokio::test]
    async fn extra_disposable_domain() {
        let validator = EmailValidator::new(Arc::new(StubResolver::new(vec!["burner.io"])))
            .with_disposable_domain("Burner.io");
        assert!(!validator.validate("x@burner.io").await);
    }
}
