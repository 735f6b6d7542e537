use serde::{Deserialize, Serialize};

/// Runner limits.
///
/// Deserializable so hosts can embed it in their own configuration:
///
/// ```
/// let config: stepwise::RunnerConfig = serde_json::from_str(r#"{"max_cycles": 1000}"#).unwrap();
/// assert_eq!(config.max_cycles, Some(1000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Total instructions a process may execute across all resumes.
    /// `None` means unlimited.
    pub max_cycles: Option<u64>,

    /// Procedure frames allowed on top of the global scope. `None` means
    /// unlimited.
    pub max_call_depth: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_cycles, None);
        assert_eq!(config.max_call_depth, None);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());

        let config: RunnerConfig = serde_json::from_str(r#"{"max_call_depth": 64}"#).unwrap();
        assert_eq!(config.max_call_depth, Some(64));
        assert_eq!(config.max_cycles, None);
    }
}
