//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of connections open at once.
    pub max_connections: u32,

    /// How long `acquire` may wait in the queue before giving up.
    ///
    /// `None` waits until a connection frees up or the pool closes.
    pub acquire_timeout: Option<Duration>,

    /// Whether to check `is_valid` on idle connections before handing them out.
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 1,
            acquire_timeout: None,
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Enable or disable testing connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(PoolError::Configuration(
                "acquire_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.acquire_timeout, None);
        assert!(config.test_on_checkout);
    }

    #[test]
    fn test_config_builder_methods() {
        let config = PoolConfig::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(2))
            .test_on_checkout(false);

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(2)));
        assert!(!config.test_on_checkout);
    }

    #[test]
    fn test_config_validation_zero_max() {
        let result = PoolConfig::new().max_connections(0).validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("max_connections must be greater than 0")
        );
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let result = PoolConfig::new().acquire_timeout(Duration::ZERO).validate();
        assert!(result.is_err());
    }
}
