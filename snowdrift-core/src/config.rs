//! Runtime Configuration
//!
//! A small set of knobs installed per thread, because the scheduler that
//! consumes them is thread-local.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::Result;

thread_local! {
    static CURRENT: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Tunables for the scheduler and the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times one reaction may run within a single batch before the
    /// scheduler drops it and reports a `ReactionLoop`.
    pub max_batch_reruns: usize,

    /// Prefix of the synthetic attribute used for event delegation.
    pub event_attribute_prefix: String,

    /// Spawn a flush on the current tokio runtime whenever one is armed.
    ///
    /// Only a current-thread runtime qualifies. Elsewhere a warning is
    /// logged and the batch waits for an explicit `flush` or `tick`.
    pub auto_flush: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_batch_reruns: 100,
            event_attribute_prefix: "sn".to_string(),
            auto_flush: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Make this the active configuration for the current thread.
    pub fn install(self) {
        tracing::debug!(config = ?self, "installing runtime config");
        CURRENT.with(|current| *current.borrow_mut() = self);
    }

    /// The configuration active on the current thread.
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn with<R>(f: impl FnOnce(&RuntimeConfig) -> R) -> R {
        CURRENT.with(|current| f(&current.borrow()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "max_batch_reruns": 7 }"#).unwrap();
        assert_eq!(config.max_batch_reruns, 7);
        assert_eq!(config.event_attribute_prefix, "sn");
        assert!(!config.auto_flush);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn install_is_thread_local() {
        RuntimeConfig {
            event_attribute_prefix: "x".into(),
            ..RuntimeConfig::default()
        }
        .install();
        assert_eq!(RuntimeConfig::current().event_attribute_prefix, "x");

        let other = std::thread::spawn(|| RuntimeConfig::current().event_attribute_prefix)
            .join()
            .unwrap();
        assert_eq!(other, "sn");

        RuntimeConfig::default().install();
    }
}
