//! Redirect chasing
//!
//! The shared client never follows redirects on its own; this module does,
//! hop by hop, so every hop goes through the same exchange (and therefore the
//! same attempt-local cookie handling) as the first request.

use std::collections::HashSet;
use std::net::IpAddr;

use url::{Host, Url};

use super::exchange::{ExchangeRequest, RawResponse};
use super::Transport;
use crate::errors::TransportResult;

/// Per-call redirect handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    /// Chase `Location` headers up to the hop budget
    #[default]
    Follow,
    /// Return the first response as-is
    Manual,
}

/// Why a chase stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaseEnd {
    /// Final response is not a redirect (or redirects were not followed)
    Completed,
    /// A hop pointed at a URL already visited; the first response is returned
    LoopDetected,
    /// A hop pointed at the local machine; the first response is returned
    LocalTargetBlocked,
    /// Hop budget used up; the last response is returned
    BudgetExhausted,
}

/// Response at the end of a redirect chase
#[derive(Debug, Clone)]
pub struct Chase {
    pub response: RawResponse,
    pub end: ChaseEnd,
    pub hops: usize,
}

impl Chase {
    fn new(response: RawResponse, end: ChaseEnd, hops: usize) -> Self {
        Self {
            response,
            end,
            hops,
        }
    }
}

impl Transport {
    /// Send `request`, chasing redirects when `policy` allows
    pub(crate) async fn send(
        &self,
        request: ExchangeRequest,
        policy: RedirectPolicy,
    ) -> TransportResult<Chase> {
        let initial = self.send_with_retry(request.clone()).await?;
        if policy == RedirectPolicy::Manual || !initial.is_redirect() {
            return Ok(Chase::new(initial, ChaseEnd::Completed, 0));
        }

        let origin_is_local = is_local_target(&request.url);
        let mut visited: HashSet<Url> = HashSet::from([request.url.clone(), initial.url.clone()]);
        let mut request = request;
        let mut current = initial.clone();

        for hop in 1..=self.config.max_redirects {
            let Some(location) = current.location() else {
                return Ok(Chase::new(current, ChaseEnd::Completed, hop - 1));
            };
            let target = match current.url.join(location) {
                Ok(target) => target,
                Err(e) => {
                    tracing::debug!("Unresolvable Location {:?} from {}: {}", location, current.url, e);
                    return Ok(Chase::new(current, ChaseEnd::Completed, hop - 1));
                }
            };

            if !origin_is_local && is_local_target(&target) {
                tracing::warn!("Refusing redirect from {} to local target {}", request.url, target);
                return Ok(Chase::new(initial, ChaseEnd::LocalTargetBlocked, hop - 1));
            }
            if !visited.insert(target.clone()) {
                tracing::debug!("Redirect loop detected at {}", target);
                return Ok(Chase::new(initial, ChaseEnd::LoopDetected, hop - 1));
            }

            tracing::debug!("Redirect hop {}: {} -> {}", hop, current.url, target);
            request = request.redirected(target, current.status);
            current = self.send_with_retry(request.clone()).await?;
            if !current.is_redirect() {
                return Ok(Chase::new(current, ChaseEnd::Completed, hop));
            }
        }

        tracing::warn!(
            "Redirect budget of {} hops exhausted at {}",
            self.config.max_redirects,
            current.url
        );
        Ok(Chase::new(current, ChaseEnd::BudgetExhausted, self.config.max_redirects))
    }
}

/// Whether `url` points at the local machine
pub(crate) fn is_local_target(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_local_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_local_ip(IpAddr::V6(ip)),
        None => false,
    }
}

fn is_local_ip(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}
