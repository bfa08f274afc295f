/*
[INPUT]:  YAML scenario file (holder config, input, start/cancel/wait/settle steps)
[OUTPUT]: Scenario replayed against one TaskHolder with per-step snapshot logging
[POS]:    Driver layer - owning scope for a holder outside any UI
[UPDATE]: When adding new step kinds or scripted outcomes
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use taskslot::{CancellationToken, Generation, HolderConfig, TaskHolder, TaskSnapshot};
use thiserror::Error;

/// Error type declared by the scenario holder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemoError {
    /// Failure raised by a step with `error: known`
    #[error("rejected: {0}")]
    Rejected(String),

    /// Foreign failure translated by the scenario's error mapper
    #[error("unexpected: {0}")]
    Unexpected(String),
}

/// Top-level scenario file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub holder: HolderConfig,
    /// Input handed to every started operation
    #[serde(default)]
    pub input: i64,
    /// Map foreign failures to `DemoError::Unexpected` instead of dropping them
    #[serde(default)]
    pub map_foreign_errors: bool,
    pub steps: Vec<Step>,
}

/// One scripted action against the holder
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Start {
        label: String,
        #[serde(default)]
        delay_ms: u64,
        outcome: StepOutcome,
    },
    Cancel,
    Wait {
        ms: u64,
    },
    Settle,
}

/// What a started operation produces once its delay elapses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Value { value: i64 },
    Double,
    Fail { error: FailureKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Known,
    Foreign,
}

impl StepOutcome {
    fn resolve(self, input: i64) -> Result<i64> {
        match self {
            StepOutcome::Value { value } => Ok(value),
            StepOutcome::Double => input
                .checked_mul(2)
                .ok_or_else(|| anyhow!("doubling {input} overflows")),
            StepOutcome::Fail {
                error: FailureKind::Known,
                message,
            } => Err(DemoError::Rejected(message).into()),
            StepOutcome::Fail {
                error: FailureKind::Foreign,
                message,
            } => Err(anyhow!(message)),
        }
    }
}

impl ScenarioConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse scenario yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a scenario from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.holder.validate().context("invalid holder config")?;
        if self.steps.is_empty() {
            bail!("scenario must contain at least one step");
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Start { label, .. } = step {
                if label.trim().is_empty() {
                    bail!("step {index}: start label must not be empty");
                }
            }
        }
        Ok(())
    }

    pub fn build_holder(&self) -> TaskHolder<i64, DemoError> {
        let builder = TaskHolder::builder().config(self.holder.clone());
        if self.map_foreign_errors {
            builder
                .error_mapper(|failure| match failure.downcast_ref::<DemoError>() {
                    Some(known) => Some(known.clone()),
                    None => Some(DemoError::Unexpected(failure.to_string())),
                })
                .build()
        } else {
            builder.build()
        }
    }
}

/// Result of replaying a scenario
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub steps_run: usize,
    pub launched: Vec<(Generation, String)>,
    pub interrupted: bool,
    pub final_snapshot: TaskSnapshot<i64, DemoError>,
}

/// Replay every step of `config` against a fresh holder.
///
/// Cancelling `shutdown` cancels the holder and stops after the current step.
pub async fn run_scenario(
    config: &ScenarioConfig,
    shutdown: CancellationToken,
) -> Result<ScenarioReport> {
    let mut holder = config.build_holder();
    let mut launched = Vec::new();
    let mut steps_run = 0;
    let mut interrupted = false;

    for (index, step) in config.steps.iter().enumerate() {
        if shutdown.is_cancelled() {
            interrupted = true;
            break;
        }

        match step {
            Step::Start {
                label,
                delay_ms,
                outcome,
            } => {
                let delay = Duration::from_millis(*delay_ms);
                let outcome = outcome.clone();
                let generation = holder
                    .start_with(config.input, move |input, token| async move {
                        tokio::select! {
                            _ = token.cancelled() => bail!("operation cancelled"),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        outcome.resolve(input)
                    })
                    .with_context(|| format!("start step {index} ({label})"))?;
                launched.push((generation, label.clone()));
            }
            Step::Cancel => holder.cancel(),
            Step::Wait { ms } => {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => {}
                }
            }
            Step::Settle => {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = holder.settled() => {}
                }
            }
        }
        steps_run += 1;

        let snap = holder.snapshot();
        tracing::info!(
            holder = %holder.name(),
            step = index,
            state = ?snap.state(),
            generation = %snap.generation(),
            value = ?snap.value(),
            error = ?snap.error(),
            ending = ?snap.ending(),
            "step applied"
        );
    }

    if shutdown.is_cancelled() {
        interrupted = true;
        holder.cancel();
        tracing::warn!(holder = %holder.name(), "scenario interrupted; holder cancelled");
    }

    Ok(ScenarioReport {
        steps_run,
        launched,
        interrupted,
        final_snapshot: holder.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_outcomes() {
        assert_eq!(StepOutcome::Value { value: 3 }.resolve(10).unwrap(), 3);
        assert_eq!(StepOutcome::Double.resolve(21).unwrap(), 42);
        assert!(StepOutcome::Double.resolve(i64::MAX).is_err());

        let known = StepOutcome::Fail {
            error: FailureKind::Known,
            message: "quota".to_string(),
        }
        .resolve(0)
        .unwrap_err();
        assert_eq!(
            known.downcast_ref::<DemoError>(),
            Some(&DemoError::Rejected("quota".to_string()))
        );

        let foreign = StepOutcome::Fail {
            error: FailureKind::Foreign,
            message: "disk full".to_string(),
        }
        .resolve(0)
        .unwrap_err();
        assert!(foreign.downcast_ref::<DemoError>().is_none());
        assert_eq!(foreign.to_string(), "disk full");
    }

    #[test]
    fn test_parse_steps() {
        let config = ScenarioConfig::from_yaml_str(
            r#"
holder:
  name: demo
input: 21
steps:
  - action: start
    label: doubled
    delay_ms: 5
    outcome:
      kind: double
  - action: wait
    ms: 10
  - action: settle
  - action: cancel
"#,
        )
        .unwrap();

        assert_eq!(config.holder.name, "demo");
        assert_eq!(config.input, 21);
        assert!(!config.map_foreign_errors);
        assert_eq!(
            config.steps,
            vec![
                Step::Start {
                    label: "doubled".to_string(),
                    delay_ms: 5,
                    outcome: StepOutcome::Double,
                },
                Step::Wait { ms: 10 },
                Step::Settle,
                Step::Cancel,
            ]
        );
    }

    #[test]
    fn test_validation_rejects_empty_scenarios() {
        assert!(ScenarioConfig::from_yaml_str("steps: []\n").is_err());

        let err = ScenarioConfig::from_yaml_str(
            "steps:\n  - action: start\n    label: \"\"\n    outcome:\n      kind: double\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("label"));
    }
}
