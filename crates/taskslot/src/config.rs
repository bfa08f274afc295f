/*
[INPUT]:  YAML configuration text or file
[OUTPUT]: Parsed holder configuration and scheduling priority
[POS]:    Configuration layer - holder setup
[UPDATE]: When adding new holder options
*/

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HolderError, Result};

/// Scheduling hint attached to a launched operation.
///
/// Tokio has no task priorities, so this is advisory: `Background` yields
/// once before the operation is first polled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    UserInitiated,
    Utility,
    Background,
}

impl Priority {
    pub(crate) fn defers_first_poll(self) -> bool {
        matches!(self, Priority::Background)
    }
}

/// Holder configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HolderConfig {
    /// Label used in log records for this slot
    #[serde(default = "default_name")]
    pub name: String,
    /// Priority used by `start` and `start_with`
    #[serde(default)]
    pub priority: Priority,
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            priority: Priority::default(),
        }
    }
}

fn default_name() -> String {
    "task".to_string()
}

impl HolderConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HolderError::InvalidConfig(
                "holder name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config = HolderConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, HolderConfig::default());
        assert_eq!(config.name, "task");
        assert_eq!(config.priority, Priority::UserInitiated);
    }

    #[test]
    fn test_parse_full_config() {
        let config = HolderConfig::from_yaml_str("name: profile-loader\npriority: background\n")
            .unwrap();
        assert_eq!(config.name, "profile-loader");
        assert_eq!(config.priority, Priority::Background);
        assert!(config.priority.defers_first_poll());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = HolderConfig::from_yaml_str("name: \"  \"\n").unwrap_err();
        assert!(matches!(err, HolderError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let err = HolderConfig::from_yaml_str("priority: urgent\n").unwrap_err();
        assert!(matches!(err, HolderError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HolderConfig::from_file("/nonexistent/taskslot.yaml").unwrap_err();
        assert!(matches!(err, HolderError::Io(_)));
    }
}
