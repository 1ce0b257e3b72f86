//! Connection configuration types.

use std::time::Duration;

use crate::extension::Extension;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// TCP connect and TLS handshake timeout.
    pub connect_timeout: Duration,
    /// Bound on every single read or write.
    pub io_timeout: Duration,
    /// Extensions treated as absent even when advertised.
    pub ignored_capabilities: Vec<Extension>,
    /// Emulate SORT and THREAD when the server lacks them.
    pub client_sort: bool,
    /// Preferred charset for non-ASCII search strings.
    pub search_charset: String,
    /// ID parameters sent after login when the server supports ID.
    pub client_id: Option<Vec<(String, String)>>,
    /// Request COMPRESS=DEFLATE after authentication.
    pub compress: bool,
}

impl Config {
    /// Creates a configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    ignored_capabilities: Vec<Extension>,
    client_sort: bool,
    search_charset: String,
    client_id: Option<Vec<(String, String)>>,
    compress: bool,
}

impl ConfigBuilder {
    /// Creates a builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            ignored_capabilities: Vec::new(),
            client_sort: true,
            search_charset: "UTF-8".to_string(),
            client_id: None,
            compress: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
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

    /// Disables an extension regardless of what the server advertises.
    #[must_use]
    pub fn ignore(mut self, extension: Extension) -> Self {
        if !self.ignored_capabilities.contains(&extension) {
            self.ignored_capabilities.push(extension);
        }
        self
    }

    /// Enables or disables client-side SORT/THREAD emulation.
    #[must_use]
    pub const fn client_sort(mut self, enabled: bool) -> Self {
        self.client_sort = enabled;
        self
    }

    /// Sets the preferred search charset.
    #[must_use]
    pub fn search_charset(mut self, charset: impl Into<String>) -> Self {
        self.search_charset = charset.into();
        self
    }

    /// Adds an ID parameter (RFC 2971), e.g. `("name", "mailsync")`.
    #[must_use]
    pub fn client_id(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_id
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// Requests COMPRESS=DEFLATE after authentication.
    #[must_use]
    pub const fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            ignored_capabilities: self.ignored_capabilities,
            client_sort: self.client_sort,
            search_charset: self.search_charset,
            client_id: self.client_id,
            compress: self.compress,
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
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert!(config.client_sort);
        assert_eq!(config.search_charset, "UTF-8");
        assert!(config.ignored_capabilities.is_empty());
        assert!(!config.compress);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .security(Security::StartTls)
            .io_timeout(Duration::from_secs(5))
            .ignore(Extension::Sort)
            .ignore(Extension::Sort)
            .client_sort(false)
            .client_id("name", "mailsync")
            .compress(true)
            .build();

        assert_eq!(config.port, 143);
        assert_eq!(config.io_timeout, Duration::from_secs(5));
        assert_eq!(config.ignored_capabilities, vec![Extension::Sort]);
        assert!(!config.client_sort);
        assert_eq!(
            config.client_id,
            Some(vec![("name".to_string(), "mailsync".to_string())])
        );
        assert!(config.compress);
    }
}
