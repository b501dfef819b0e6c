//! Rate limiting for flood protection.
//!
//! Provides governor-based rate limiting for:
//! - Chat/DM message rate per connection
//! - Typing-notification rate per connection
//! - Connection rate per IP
//!
//! Media paths are NOT routed through here; screen frames and audio use
//! the byte-bucket ledger in the screen-share state, which has different
//! semantics (silent drop inside a fixed window).

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Connection identifier key.
type ConnId = String;

/// Thread-safe rate limit manager using governor.
#[derive(Debug)]
pub struct RateLimitManager {
    /// Per-connection message rate limiters.
    message_limiters: DashMap<ConnId, DirectRateLimiter>,
    /// Per-connection typing-notification limiters.
    typing_limiters: DashMap<ConnId, DirectRateLimiter>,
    /// Per-IP connection rate limiters.
    connection_limiters: DashMap<IpAddr, DirectRateLimiter>,
    /// Configuration values.
    config: Arc<RateLimitConfig>,
}

impl RateLimitManager {
    /// Create a new rate limit manager with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            message_limiters: DashMap::new(),
            typing_limiters: DashMap::new(),
            connection_limiters: DashMap::new(),
            config: Arc::new(config),
        }
    }

    /// Check if a connection can send a text message.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check_message_rate(&self, conn_id: &str) -> bool {
        let limiter = self
            .message_limiters
            .entry(conn_id.to_string())
            .or_insert_with(|| {
                let rate = NonZeroU32::new(self.config.message_rate_per_second)
                    .unwrap_or(nonzero!(20u32));
                GovRateLimiter::direct(Quota::per_second(rate))
            });

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(conn_id = %conn_id, "message rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Check if a connection can emit a typing notification.
    pub fn check_typing_rate(&self, conn_id: &str) -> bool {
        let limiter = self
            .typing_limiters
            .entry(conn_id.to_string())
            .or_insert_with(|| {
                let rate =
                    NonZeroU32::new(self.config.typing_rate_per_second).unwrap_or(nonzero!(2u32));
                GovRateLimiter::direct(Quota::per_second(rate))
            });
        limiter.check().is_ok()
    }

    /// Check if an IP may open another connection.
    pub fn check_connection_rate(&self, ip: IpAddr) -> bool {
        let limiter = self.connection_limiters.entry(ip).or_insert_with(|| {
            let rate =
                NonZeroU32::new(self.config.connection_burst_per_ip).unwrap_or(nonzero!(30u32));
            GovRateLimiter::direct(Quota::per_second(rate))
        });

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "connection rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Drop per-connection limiter state on disconnect.
    pub fn remove_connection(&self, conn_id: &str) {
        self.message_limiters.remove(conn_id);
        self.typing_limiters.remove(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_rate_is_tighter_than_messages() {
        let manager = RateLimitManager::new(RateLimitConfig {
            message_rate_per_second: 100,
            typing_rate_per_second: 1,
            connection_burst_per_ip: 100,
        });

        assert!(manager.check_typing_rate("c1"));
        // Second notification inside the same second is throttled.
        assert!(!manager.check_typing_rate("c1"));
        // Other connections are unaffected.
        assert!(manager.check_typing_rate("c2"));
    }

    #[test]
    fn disconnect_purges_limiters() {
        let manager = RateLimitManager::new(RateLimitConfig {
            message_rate_per_second: 1,
            typing_rate_per_second: 1,
            connection_burst_per_ip: 1,
        });
        assert!(manager.check_message_rate("c1"));
        assert!(!manager.check_message_rate("c1"));
        manager.remove_connection("c1");
        // Fresh bucket after reconnect.
        assert!(manager.check_message_rate("c1"));
    }
}
