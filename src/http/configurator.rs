//! Connection configurators
//!
//! A configurator sees every request builder before it is sent, handshake
//! and payload alike. Transport settings such as timeouts live here so the
//! protocol code never hardcodes them.

use reqwest::RequestBuilder;
use std::time::Duration;

/// Hook applied to each outbound connection before use
pub trait ConnectionConfigurator: Send + Sync {
    /// Customize the request before it is sent
    fn configure(&self, request: RequestBuilder) -> RequestBuilder;
}

impl<F> ConnectionConfigurator for F
where
    F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
{
    fn configure(&self, request: RequestBuilder) -> RequestBuilder {
        self(request)
    }
}

/// Leaves requests untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConfigurator;

impl ConnectionConfigurator for NoopConfigurator {
    fn configure(&self, request: RequestBuilder) -> RequestBuilder {
        request
    }
}

/// Applies a per-request timeout
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfigurator {
    timeout: Duration,
}

impl TimeoutConfigurator {
    /// Create a configurator with the given timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ConnectionConfigurator for TimeoutConfigurator {
    fn configure(&self, request: RequestBuilder) -> RequestBuilder {
        request.timeout(self.timeout)
    }
}
