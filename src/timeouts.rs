//! Timeout configuration for relay-link client operations.

use std::time::Duration;

/// Timeout configuration for relay-link client operations.
///
/// # Examples
///
/// ```rust
/// use relay_link::RelayLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = RelayLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = RelayLinkTimeouts::builder()
///     .connect_timeout(Duration::from_secs(30))
///     .request_timeout(Duration::from_secs(20))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = RelayLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct RelayLinkTimeouts {
    /// Timeout for the connection handshake (INFO/CONNECT/PING round trip).
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Default deadline for `request` calls that don't pass an explicit one.
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Deadline for `drain`. An unresponsive broker fails the drain with a
    /// timeout and force-closes the connection instead of stalling forever.
    /// Default: 30 seconds
    pub drain_timeout: Duration,
}

impl Default for RelayLinkTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> RelayLinkTimeoutsBuilder {
        RelayLinkTimeoutsBuilder::new()
    }

    /// Create timeouts optimized for fast local development and tests.
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for creating custom [`RelayLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct RelayLinkTimeoutsBuilder {
    timeouts: RelayLinkTimeouts,
}

impl RelayLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: RelayLinkTimeouts::default(),
        }
    }

    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the default request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the drain deadline.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.drain_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> RelayLinkTimeouts {
        self.timeouts
    }
}
