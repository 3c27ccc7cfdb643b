//! Pool configuration

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

/// Worker pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on pool size; 0 means "use the parallelism hint"
    pub max_workers: usize,

    /// Per-task timeout in seconds; 0 means none
    ///
    /// Accepted and stored for each dispatch but never enforced: nothing
    /// in the dispatch loop checks it. Callers must not rely on tasks
    /// being interrupted.
    pub timeout_secs: u64,

    /// Shut the whole pool down when any single task fails
    pub terminate_on_error: bool,

    /// Dependencies made available inside each worker context
    ///
    /// Deserializes from either a single string or a list of strings.
    #[serde(deserialize_with = "string_or_list")]
    pub deps: Vec<String>,
}

impl PoolConfig {
    /// Effective pool size for a given available-parallelism hint
    pub fn effective_workers(&self, parallelism: usize) -> usize {
        debug!(max_workers = self.max_workers, parallelism, "PoolConfig::effective_workers: called");
        if self.max_workers > 0 {
            self.max_workers.min(parallelism)
        } else {
            parallelism
        }
    }

    /// The configured timeout as a Duration, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Accept `deps: "single"` as shorthand for `deps: ["single"]`
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(dep) => vec![dep],
        StringOrList::Many(deps) => deps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_workers, 0);
        assert_eq!(config.timeout_secs, 0);
        assert!(!config.terminate_on_error);
        assert!(config.deps.is_empty());
    }

    #[test]
    fn test_effective_workers_unbounded() {
        let config = PoolConfig::default();
        assert_eq!(config.effective_workers(8), 8);
        assert_eq!(config.effective_workers(1), 1);
    }

    #[test]
    fn test_effective_workers_capped() {
        let config = PoolConfig {
            max_workers: 4,
            ..Default::default()
        };
        // Bound by max_workers when the host has more cores
        assert_eq!(config.effective_workers(16), 4);
        // Bound by the hint when the host has fewer
        assert_eq!(config.effective_workers(2), 2);
    }

    #[test]
    fn test_timeout_duration() {
        let config = PoolConfig {
            timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(PoolConfig::default().timeout(), None);
    }

    #[test]
    fn test_deps_from_list() {
        let config: PoolConfig = serde_yaml::from_str("deps: [fft, linalg]").unwrap();
        assert_eq!(config.deps, vec!["fft".to_string(), "linalg".to_string()]);
    }

    #[test]
    fn test_deps_from_bare_string() {
        let config: PoolConfig = serde_yaml::from_str("deps: fft").unwrap();
        assert_eq!(config.deps, vec!["fft".to_string()]);
    }

    #[test]
    fn test_config_from_json() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"max_workers": 2, "timeout_secs": 10, "terminate_on_error": true, "deps": "fft"}"#,
        )
        .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.timeout_secs, 10);
        assert!(config.terminate_on_error);
        assert_eq!(config.deps, vec!["fft".to_string()]);
    }
}
