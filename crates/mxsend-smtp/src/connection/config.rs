//! Delivery configuration types.

use std::time::Duration;

/// Default SMTP relay port.
pub const DEFAULT_PORT: u16 = 25;

/// Default cap on a single reply line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Which envelope address picks the exchangers to contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteBy {
    /// Domain of the sender: the sender's own exchangers relay the message.
    /// A null reverse-path falls back to the recipient.
    #[default]
    Sender,
    /// Domain of the recipient, for direct delivery.
    Recipient,
}

/// Outbound delivery configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Port dialled on every exchanger.
    pub port: u16,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout for each step of the dialogue.
    pub io_timeout: Duration,
    /// Deadline for a whole delivery across all exchangers.
    pub delivery_timeout: Option<Duration>,
    /// Source of the routing domain.
    pub route_by: RouteBy,
    /// Longest accepted reply line, in bytes.
    pub max_line_length: usize,
}

impl Config {
    /// Creates a configuration with port 25 and default timeouts.
    #[must_use]
    pub fn new(helo_name: impl Into<String>) -> Self {
        ConfigBuilder::new(helo_name).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(helo_name: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(helo_name)
    }
}

/// Builder for delivery configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    helo_name: String,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    delivery_timeout: Option<Duration>,
    route_by: RouteBy,
    max_line_length: usize,
}

impl ConfigBuilder {
    /// Creates a new builder announcing `helo_name`.
    #[must_use]
    pub fn new(helo_name: impl Into<String>) -> Self {
        Self {
            helo_name: helo_name.into(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            delivery_timeout: None,
            route_by: RouteBy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the whole-delivery deadline.
    #[must_use]
    pub const fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }

    /// Sets the routing address.
    #[must_use]
    pub const fn route_by(mut self, route_by: RouteBy) -> Self {
        self.route_by = route_by;
        self
    }

    /// Sets the reply line cap.
    #[must_use]
    pub const fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            helo_name: self.helo_name,
            port: self.port,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            delivery_timeout: self.delivery_timeout,
            route_by: self.route_by,
            max_line_length: self.max_line_length,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = Config::new("relay.example.com");
        assert_eq!(config.helo_name, "relay.example.com");
        assert_eq!(config.port, 25);
        assert_eq!(config.route_by, RouteBy::Sender);
        assert_eq!(config.delivery_timeout, None);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("relay.example.com")
            .port(2525)
            .connect_timeout(Duration::from_secs(5))
            .io_timeout(Duration::from_secs(10))
            .delivery_timeout(Duration::from_secs(120))
            .route_by(RouteBy::Recipient)
            .max_line_length(4096)
            .build();

        assert_eq!(config.port, 2525);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.delivery_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.route_by, RouteBy::Recipient);
        assert_eq!(config.max_line_length, 4096);
    }
}
