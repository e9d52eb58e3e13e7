//! Vault configuration.

use std::time::Duration;

/// Name of the consolidated file holding all internal entries.
pub const DEFAULT_STORE_FILE: &str = "main.vault";

/// Configuration for opening a vault.
#[derive(Debug, Clone)]
pub struct Config {
    /// Quiet period that must elapse after the last mutation before the
    /// consolidated file and sub-key sets are flushed.
    pub debounce: Duration,

    /// File name of the consolidated store inside the root directory.
    pub store_file: String,

    /// Whether to create the root directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            store_file: DEFAULT_STORE_FILE.to_string(),
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush debounce window.
    #[must_use]
    pub const fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Sets the consolidated store file name.
    #[must_use]
    pub fn store_file(mut self, name: impl Into<String>) -> Self {
        self.store_file = name.into();
        self
    }

    /// Sets whether to create the root directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.debounce, Duration::from_millis(150));
        assert_eq!(config.store_file, "main.vault");
        assert!(config.create_if_missing);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .debounce(Duration::from_millis(10))
            .store_file("test.vault")
            .create_if_missing(false);

        assert_eq!(config.debounce, Duration::from_millis(10));
        assert_eq!(config.store_file, "test.vault");
        assert!(!config.create_if_missing);
    }
}
