//! Delivery across the exchangers of a domain.
//!
//! The dispatcher resolves the routing domain, orders the exchangers and
//! tries them one after another, each with a fresh [`Session`] over a fresh
//! transport. The first exchanger to accept the message ends the delivery.
//! Failures of earlier exchangers are logged and dropped on success; they are
//! only reported when every exchanger failed.

use tokio::time::Instant;
use tracing::Instrument;

use crate::connection::{Config, Envelope, RouteBy, Session, Transport};
use crate::error::{DeliveryError, Error, HostFailure, Result};
use crate::parser::{parse_host_str, parse_mailbox_str, parse_path_str, parse_reverse_path_str};
use crate::resolver::{ExchangeCandidate, ExchangerLookup, order_candidates};
use crate::types::{AddressLiteral, Host, Mailbox, Path, ReversePath};

/// Successful delivery report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Exchanger that accepted the message.
    pub exchanger: String,
    /// Number of exchangers that failed before it.
    pub retried_hosts: usize,
}

/// Outbound delivery engine.
///
/// Holds no per-delivery state, so one instance can serve concurrent
/// deliveries behind an `Arc`.
#[derive(Debug)]
pub struct Dispatcher<L, T> {
    config: Config,
    helo: Host,
    lookup: L,
    transport: T,
}

impl<L, T> Dispatcher<L, T>
where
    L: ExchangerLookup,
    T: Transport,
{
    /// Creates a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `GrammarViolation` if `config.helo_name` is not a domain or
    /// address literal.
    pub async fn new(config: Config, lookup: L, transport: T) -> Result<Self> {
        let helo = parse_host_str(&config.helo_name).await?;
        Ok(Self {
            config,
            helo,
            lookup,
            transport,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Looks up the exchangers for the domain of `address`.
    ///
    /// The result is in lookup order; see [`order_candidates`].
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if `address` is not a mailbox
    /// - `NoExchangersFound` if the lookup fails or comes back empty
    pub async fn resolve_exchangers(
        &self,
        address: &str,
    ) -> std::result::Result<Vec<ExchangeCandidate>, DeliveryError> {
        let mailbox = parse_mailbox_str(address)
            .await
            .map_err(|_| DeliveryError::InvalidAddress(address.to_string()))?;
        self.candidates_for(&mailbox).await
    }

    async fn candidates_for(
        &self,
        mailbox: &Mailbox,
    ) -> std::result::Result<Vec<ExchangeCandidate>, DeliveryError> {
        let domain = match &mailbox.host {
            Host::Domain(domain) => domain.as_str(),
            Host::Literal(AddressLiteral::Ipv4(ip)) => {
                return Ok(vec![ExchangeCandidate::new(ip.to_string(), 0)]);
            }
            Host::Literal(AddressLiteral::Ipv6(ip)) => {
                return Ok(vec![ExchangeCandidate::new(ip.to_string(), 0)]);
            }
            Host::Literal(literal @ AddressLiteral::General { .. }) => {
                return Err(DeliveryError::InvalidAddress(format!(
                    "{mailbox}: cannot route to {literal}"
                )));
            }
        };
        let candidates =
            self.lookup
                .lookup(domain)
                .await
                .map_err(|e| DeliveryError::NoExchangersFound {
                    domain: domain.to_string(),
                    reason: e.to_string(),
                })?;
        if candidates.is_empty() {
            return Err(DeliveryError::NoExchangersFound {
                domain: domain.to_string(),
                reason: "empty answer".to_string(),
            });
        }
        // RFC 7505: an exchanger named "." means the domain takes no mail.
        if candidates.iter().any(|c| c.host.is_empty()) {
            return Err(DeliveryError::NoExchangersFound {
                domain: domain.to_string(),
                reason: "null MX".to_string(),
            });
        }
        Ok(candidates)
    }

    /// Delivers `envelope`, trying exchangers in preference order until one
    /// accepts it.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if the routing address is a general address literal
    /// - `NoExchangersFound` if the lookup gives nothing to try
    /// - `AllExchangersFailed` with one entry per exchanger tried
    pub async fn deliver(
        &self,
        envelope: &Envelope,
    ) -> std::result::Result<Delivery, DeliveryError> {
        let span = tracing::info_span!("delivery", from = %envelope.from, to = %envelope.to);
        self.deliver_in_span(envelope).instrument(span).await
    }

    async fn deliver_in_span(
        &self,
        envelope: &Envelope,
    ) -> std::result::Result<Delivery, DeliveryError> {
        let mailbox = match (self.config.route_by, envelope.from.mailbox()) {
            (RouteBy::Sender, Some(sender)) => sender,
            (RouteBy::Sender, None) => {
                tracing::debug!("null reverse-path, routing by recipient");
                &envelope.to.mailbox
            }
            (RouteBy::Recipient, _) => &envelope.to.mailbox,
        };
        let candidates = order_candidates(self.candidates_for(mailbox).await?);
        let deadline = self.config.delivery_timeout.map(|d| Instant::now() + d);

        let mut failures = Vec::new();
        for candidate in &candidates {
            let span = tracing::info_span!(
                "exchanger",
                host = %candidate.host,
                preference = candidate.preference
            );
            let attempt = self.attempt(candidate, envelope, span.clone());
            let outcome = match (deadline, self.config.delivery_timeout) {
                (Some(deadline), Some(total)) => tokio::time::timeout_at(deadline, attempt)
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout(total))),
                _ => attempt.await,
            };

            match outcome {
                Ok(()) => {
                    for failure in &failures {
                        let HostFailure { host, reason } = failure;
                        tracing::warn!(%host, %reason, "earlier exchanger failed");
                    }
                    tracing::info!(
                        exchanger = %candidate.host,
                        retried = failures.len(),
                        "delivered"
                    );
                    return Ok(Delivery {
                        exchanger: candidate.host.clone(),
                        retried_hosts: failures.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!(parent: &span, error = %e, "exchanger failed");
                    failures.push(HostFailure {
                        host: candidate.host.clone(),
                        reason: e.to_string(),
                    });
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        tracing::warn!("delivery deadline reached");
                        break;
                    }
                }
            }
        }
        Err(DeliveryError::AllExchangersFailed { failures })
    }

    async fn attempt(
        &self,
        candidate: &ExchangeCandidate,
        envelope: &Envelope,
        span: tracing::Span,
    ) -> Result<()> {
        let stream = self
            .transport
            .open(&candidate.host, self.config.port)
            .instrument(span.clone())
            .await?;
        let mut session = Session::new(stream, self.helo.clone(), &self.config, span);
        session.deliver(envelope).await
    }

    /// Public entry point: parses the addresses and delivers to the first
    /// recipient.
    ///
    /// An empty `from` is the null reverse-path `<>`. Addresses may be given
    /// bare (`a@example.com`) or bracketed (`<a@example.com>`).
    ///
    /// # Errors
    ///
    /// `InvalidAddress` if `to` is empty or an address does not parse, then
    /// the errors of [`Dispatcher::deliver`].
    pub async fn send_mail(
        &self,
        from: &str,
        to: &[String],
        body: Option<String>,
    ) -> std::result::Result<Delivery, DeliveryError> {
        let Some(first) = to.first() else {
            return Err(DeliveryError::InvalidAddress(
                "no recipient given".to_string(),
            ));
        };
        if to.len() > 1 {
            tracing::debug!(ignored = to.len() - 1, "only the first recipient is used");
        }
        let envelope = Envelope {
            from: parse_sender(from).await?,
            to: parse_recipient(first).await?,
            body,
        };
        self.deliver(&envelope).await
    }
}

async fn parse_sender(from: &str) -> std::result::Result<ReversePath, DeliveryError> {
    let from = from.trim();
    let parsed = if from.is_empty() {
        Ok(ReversePath::Null)
    } else if from.starts_with('<') {
        parse_reverse_path_str(from).await
    } else {
        parse_mailbox_str(from)
            .await
            .map(|m| ReversePath::Path(m.into()))
    };
    parsed.map_err(|_| DeliveryError::InvalidAddress(from.to_string()))
}

async fn parse_recipient(to: &str) -> std::result::Result<Path, DeliveryError> {
    let to = to.trim();
    let parsed = if to.starts_with('<') {
        parse_path_str(to).await
    } else {
        parse_mailbox_str(to).await.map(Path::from)
    };
    parsed.map_err(|_| DeliveryError::InvalidAddress(to.to_string()))
}
