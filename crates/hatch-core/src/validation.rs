use serde::{Deserialize, Serialize};
use std::path::Component;

use crate::config::{
    HatchConfig, MAX_LOG_REFRESH_SECS, MAX_SCRIPT_TIMEOUT_SECS, MIN_LOG_REFRESH_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for HatchConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.status_timeout_seconds == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "status_timeout_seconds.zero",
                message: "log script timeout must be greater than zero".to_string(),
            });
        } else if self.status_timeout_seconds > MAX_SCRIPT_TIMEOUT_SECS {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "status_timeout_seconds.clamped",
                message: format!(
                    "log script timeout {}s exceeds {MAX_SCRIPT_TIMEOUT_SECS}s and will be clamped",
                    self.status_timeout_seconds
                ),
            });
        }

        if self.log_max_output_bytes == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "log_max_output_bytes.zero",
                message: "log output cap must be greater than zero".to_string(),
            });
        }

        if self.log_script.as_os_str().is_empty()
            || self.log_script.is_absolute()
            || self
                .log_script
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "log_script.not_relative",
                message: format!(
                    "log_script must be a plain relative path inside the worktree, got {}",
                    self.log_script.display()
                ),
            });
        }

        if self.log_refresh_interval_secs != 0
            && !(MIN_LOG_REFRESH_SECS..=MAX_LOG_REFRESH_SECS)
                .contains(&self.log_refresh_interval_secs)
        {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "log_refresh_interval.clamped",
                message: format!(
                    "log refresh interval {}s is outside {MIN_LOG_REFRESH_SECS}..={MAX_LOG_REFRESH_SECS}s and will be clamped",
                    self.log_refresh_interval_secs
                ),
            });
        }

        if self.status_tracking && self.status_refresh_interval_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "status_refresh_interval.zero",
                message: "status refresh interval 0 is raised to 1s".to_string(),
            });
        }

        if self.multiplexer_bin.trim().is_empty() || self.sandbox_bin.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "collaborator_bin.empty",
                message: "multiplexer_bin and sandbox_bin must not be empty".to_string(),
            });
        }

        issues
    }
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn codes(config: &HatchConfig) -> Vec<&'static str> {
        config.validate().into_iter().map(|issue| issue.code).collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(HatchConfig::default().validate().is_empty());
    }

    #[test]
    fn traversal_or_absolute_log_script_is_rejected() {
        for script in ["../outside/log", "/etc/log", ".hooks/../../log", ""] {
            let config = HatchConfig {
                log_script: PathBuf::from(script),
                ..HatchConfig::default()
            };
            let issues = config.validate();
            assert!(
                issues.iter().any(|issue| issue.code == "log_script.not_relative"),
                "expected rejection for {script:?}"
            );
            assert!(has_errors(&issues));
        }
    }

    #[test]
    fn out_of_range_log_interval_is_only_a_warning() {
        let config = HatchConfig {
            log_refresh_interval_secs: 500,
            ..HatchConfig::default()
        };
        let issues = config.validate();
        assert_eq!(codes(&config), vec!["log_refresh_interval.clamped"]);
        assert!(!has_errors(&issues));
    }

    #[test]
    fn zero_timeout_and_cap_are_errors() {
        let config = HatchConfig {
            status_timeout_seconds: 0,
            log_max_output_bytes: 0,
            ..HatchConfig::default()
        };
        let found = codes(&config);
        assert!(found.contains(&"status_timeout_seconds.zero"));
        assert!(found.contains(&"log_max_output_bytes.zero"));
    }

    #[test]
    fn oversized_timeout_is_clamped_with_warning() {
        let config = HatchConfig {
            status_timeout_seconds: u64::MAX,
            ..HatchConfig::default()
        };
        assert_eq!(codes(&config), vec!["status_timeout_seconds.clamped"]);
        assert!(!has_errors(&config.validate()));
        assert_eq!(
            config.script_timeout(),
            std::time::Duration::from_secs(MAX_SCRIPT_TIMEOUT_SECS)
        );
    }
}
