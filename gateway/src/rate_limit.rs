//! Cluster-wide fixed-window rate limiting.
//!
//! Counters live in a store every gateway instance shares, keyed by client IP
//! and window index, so the limit holds across instances. Requests from the
//! configured health-check ranges never touch the counter.

use agora_core::environment::Clock;
use agora_core::rate_limit::WindowCounter;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within the limit; `count` requests seen in this window
    Allowed {
        /// Count after this request
        count: u64,
    },
    /// Source is a health-check range
    Bypassed,
    /// Over the limit
    Limited,
    /// The counter store failed; the request is let through
    FailedOpen,
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Limited)
    }
}

/// Parse CIDR strings, skipping (and logging) invalid ones. A bare address is
/// taken as a single-host range.
#[must_use]
pub fn parse_cidrs(cidrs: &[String]) -> Vec<IpNet> {
    cidrs
        .iter()
        .filter_map(|raw| {
            let parsed = raw
                .parse::<IpNet>()
                .or_else(|_| raw.parse::<IpAddr>().map(IpNet::from));
            match parsed {
                Ok(net) => Some(net),
                Err(e) => {
                    tracing::warn!(cidr = %raw, error = %e, "Ignoring invalid health-check CIDR");
                    None
                }
            }
        })
        .collect()
}

/// Fixed-window limiter over a shared [`WindowCounter`].
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn WindowCounter>,
    clock: Arc<dyn Clock>,
    max_requests: u64,
    window: Duration,
    bypass: Arc<[IpNet]>,
}

impl RateLimiter {
    /// Allow `max_requests` per `window` per IP, except for `bypass` ranges.
    #[must_use]
    pub fn new(
        counter: Arc<dyn WindowCounter>,
        clock: Arc<dyn Clock>,
        max_requests: u64,
        window: Duration,
        bypass: Vec<IpNet>,
    ) -> Self {
        Self {
            counter,
            clock,
            max_requests,
            window: window.max(Duration::from_secs(1)),
            bypass: bypass.into(),
        }
    }

    /// Counter key for `ip` in the current window.
    #[must_use]
    pub fn key_for(&self, ip: IpAddr) -> String {
        let now = u64::try_from(self.clock.now().timestamp()).unwrap_or_default();
        let window_index = now / self.window.as_secs();
        format!("rate_limit:{ip}:{window_index}")
    }

    /// Count one request from `ip`.
    pub async fn check(&self, ip: IpAddr) -> Decision {
        if self.bypass.iter().any(|net| net.contains(&ip)) {
            return Decision::Bypassed;
        }

        let key = self.key_for(ip);
        match self.counter.increment(&key, self.window).await {
            Ok(count) if count > self.max_requests => {
                tracing::warn!(client_ip = %ip, count, limit = self.max_requests, "Rate limit exceeded");
                metrics::counter!("agora_gateway_rate_limited_total").increment(1);
                Decision::Limited
            }
            Ok(count) => Decision::Allowed { count },
            Err(e) => {
                tracing::error!(client_ip = %ip, error = %e, "Rate limit counter unavailable, allowing request");
                metrics::counter!("agora_gateway_rate_limit_errors_total").increment(1);
                Decision::FailedOpen
            }
        }
    }
}
