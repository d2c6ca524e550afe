//! Mail exchanger lookup and ordering.

use std::future::Future;

use trust_dns_resolver::TokioAsyncResolver;

/// A host that accepts mail for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeCandidate {
    /// Host name or IP address, without a trailing root dot.
    pub host: String,
    /// Lower is tried first.
    pub preference: u16,
}

impl ExchangeCandidate {
    /// Creates a candidate, stripping the trailing `.` of a fully qualified
    /// name.
    #[must_use]
    pub fn new(host: impl Into<String>, preference: u16) -> Self {
        let mut host = host.into();
        while host.ends_with('.') {
            host.pop();
        }
        Self { host, preference }
    }
}

/// Failure of the exchanger lookup collaborator.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Source of exchanger candidates for a domain.
///
/// No ordering is expected from implementations; see [`order_candidates`].
pub trait ExchangerLookup: Send + Sync {
    /// Returns the exchangers advertised for `domain`.
    fn lookup(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<ExchangeCandidate>, LookupError>> + Send;
}

/// MX lookup through the system resolver configuration.
#[derive(Debug, Clone)]
pub struct DnsLookup {
    resolver: TokioAsyncResolver,
}

impl DnsLookup {
    /// Wraps an existing resolver.
    #[must_use]
    pub const fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    /// Builds a resolver from `/etc/resolv.conf` (or the platform
    /// equivalent).
    ///
    /// # Errors
    ///
    /// Returns an error if the system configuration cannot be read.
    pub fn from_system_conf() -> Result<Self, LookupError> {
        TokioAsyncResolver::tokio_from_system_conf()
            .map(Self::new)
            .map_err(|e| LookupError(e.to_string()))
    }
}

impl ExchangerLookup for DnsLookup {
    async fn lookup(&self, domain: &str) -> Result<Vec<ExchangeCandidate>, LookupError> {
        let answer = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| LookupError(e.to_string()))?;
        let candidates: Vec<_> = answer
            .iter()
            .map(|mx| ExchangeCandidate::new(mx.exchange().to_utf8(), mx.preference()))
            .collect();
        tracing::debug!(domain, count = candidates.len(), "MX lookup");
        Ok(candidates)
    }
}

/// Sorts candidates by ascending preference.
///
/// The sort is stable: candidates with equal preference keep the order the
/// lookup returned them in.
#[must_use]
pub fn order_candidates(mut candidates: Vec<ExchangeCandidate>) -> Vec<ExchangeCandidate> {
    candidates.sort_by_key(|c| c.preference);
    candidates
}
