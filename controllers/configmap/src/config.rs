//! Controller configuration.
//!
//! Settings come from environment variables. Parsing goes through a lookup
//! closure so tests can supply values without touching the process
//! environment.

use crate::error::ControllerError;
use resource_watch::kube_source::DEFAULT_WATCH_TIMEOUT_SECS;
use resource_watch::{DiffReporter, InformerConfig};
use std::env;
use std::time::Duration;

/// Default pause before re-listing after the watch breaks.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// The API server rejects watch timeouts at or above this value.
const MAX_WATCH_TIMEOUT_SECS: u32 = 295;

/// Typed controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch (`WATCH_NAMESPACE`)
    pub namespace: String,
    /// Label selector (`LABEL_SELECTOR`)
    pub label_selector: Option<String>,
    /// Field selector (`FIELD_SELECTOR`)
    pub field_selector: Option<String>,
    /// Periodic re-list interval (`RESYNC_INTERVAL_SECS`, 0 disables)
    pub resync_interval: Option<Duration>,
    /// Pause before resyncing after a watch failure (`RECONNECT_DELAY_SECS`)
    pub reconnect_delay: Duration,
    /// Server-side watch timeout in seconds (`WATCH_TIMEOUT_SECS`)
    pub watch_timeout: u32,
    /// JSON pointers left out of diffs (`DIFF_IGNORE_PATHS`); `None` keeps the defaults
    pub diff_ignore_paths: Option<Vec<String>>,
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let resync_secs: u64 = parse(get("RESYNC_INTERVAL_SECS"), "RESYNC_INTERVAL_SECS")?.unwrap_or(0);
        let reconnect_secs: u64 =
            parse(get("RECONNECT_DELAY_SECS"), "RECONNECT_DELAY_SECS")?.unwrap_or(DEFAULT_RECONNECT_DELAY_SECS);
        let watch_timeout: u32 =
            parse(get("WATCH_TIMEOUT_SECS"), "WATCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_WATCH_TIMEOUT_SECS);

        if watch_timeout == 0 || watch_timeout >= MAX_WATCH_TIMEOUT_SECS {
            return Err(ControllerError::InvalidConfig(format!(
                "WATCH_TIMEOUT_SECS must be between 1 and {}, got {}",
                MAX_WATCH_TIMEOUT_SECS - 1,
                watch_timeout
            )));
        }

        let diff_ignore_paths = get("DIFF_IGNORE_PATHS")
            .map(|paths| {
                paths
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(|path| {
                        if path.starts_with('/') {
                            Ok(path.to_string())
                        } else {
                            Err(ControllerError::InvalidConfig(format!(
                                "DIFF_IGNORE_PATHS entry is not a JSON pointer: {path}"
                            )))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(Self {
            namespace: get("WATCH_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            label_selector: get("LABEL_SELECTOR"),
            field_selector: get("FIELD_SELECTOR"),
            resync_interval: (resync_secs > 0).then(|| Duration::from_secs(resync_secs)),
            reconnect_delay: Duration::from_secs(reconnect_secs),
            watch_timeout,
            diff_ignore_paths,
        })
    }

    /// Diff reporter honoring `DIFF_IGNORE_PATHS`.
    pub fn diff_reporter(&self) -> DiffReporter {
        match &self.diff_ignore_paths {
            Some(paths) => DiffReporter::new(paths.iter().cloned()),
            None => DiffReporter::default(),
        }
    }

    /// Informer settings; the controller always resyncs after a failure.
    pub fn informer_config(&self) -> InformerConfig {
        InformerConfig {
            resync_interval: self.resync_interval,
            reconnect_delay: Some(self.reconnect_delay),
        }
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>, ControllerError> {
    value
        .map(|raw| {
            raw.parse()
                .map_err(|_| ControllerError::InvalidConfig(format!("{key} must be a non-negative integer, got {raw:?}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).expect("defaults are valid");

        assert_eq!(config.namespace, "default");
        assert_eq!(config.label_selector, None);
        assert_eq!(config.field_selector, None);
        assert_eq!(config.resync_interval, None);
        assert_eq!(config.reconnect_delay, Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS));
        assert_eq!(config.watch_timeout, DEFAULT_WATCH_TIMEOUT_SECS);
        assert_eq!(config.diff_ignore_paths, None);
        assert_eq!(
            config.diff_reporter().ignored_paths(),
            DiffReporter::default().ignored_paths()
        );
    }

    #[test]
    fn test_all_variables() {
        let config = load(&[
            ("WATCH_NAMESPACE", "kube-system"),
            ("LABEL_SELECTOR", "app=web"),
            ("FIELD_SELECTOR", "metadata.name=cfg1"),
            ("RESYNC_INTERVAL_SECS", "600"),
            ("RECONNECT_DELAY_SECS", "2"),
            ("WATCH_TIMEOUT_SECS", "60"),
            ("DIFF_IGNORE_PATHS", "/metadata/managedFields, /metadata/annotations"),
        ])
        .expect("valid config");

        assert_eq!(config.namespace, "kube-system");
        assert_eq!(config.label_selector.as_deref(), Some("app=web"));
        assert_eq!(config.field_selector.as_deref(), Some("metadata.name=cfg1"));
        assert_eq!(config.resync_interval, Some(Duration::from_secs(600)));
        assert_eq!(config.watch_timeout, 60);
        assert_eq!(
            config.diff_reporter().ignored_paths(),
            ["/metadata/managedFields", "/metadata/annotations"]
        );

        let informer = config.informer_config();
        assert_eq!(informer.resync_interval, Some(Duration::from_secs(600)));
        assert_eq!(informer.reconnect_delay, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = load(&[("WATCH_NAMESPACE", "  "), ("LABEL_SELECTOR", "")]).expect("valid config");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.label_selector, None);
    }

    #[test]
    fn test_zero_resync_interval_disables() {
        let config = load(&[("RESYNC_INTERVAL_SECS", "0")]).expect("valid config");
        assert_eq!(config.resync_interval, None);
    }

    #[test]
    fn test_rejects_invalid_numbers() {
        for (key, value) in [
            ("RESYNC_INTERVAL_SECS", "soon"),
            ("RECONNECT_DELAY_SECS", "-1"),
            ("WATCH_TIMEOUT_SECS", "0"),
            ("WATCH_TIMEOUT_SECS", "300"),
        ] {
            let result = load(&[(key, value)]);
            assert!(
                matches!(result, Err(ControllerError::InvalidConfig(ref msg)) if msg.contains(key)),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_relative_ignore_path() {
        let result = load(&[("DIFF_IGNORE_PATHS", "metadata/annotations")]);
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }
}
