use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use flappy_core::constants::FRAME_BUDGET_DEFAULT;
use flappy_core::{ConfigError, EvaluationSettings, FitnessPolicy, ProgressTracker, WorldConfig};
use serde::{Deserialize, Serialize};

use crate::optimizer::MutationSettings;

pub const DEFAULT_STUDY_SEED: u32 = 0xF1A9_0001;
pub const JOBS_ENV: &str = "FLAPPY_JOBS";

/// Everything a study sweep needs. Missing JSON fields fall back to the
/// defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub window_sizes: Vec<f64>,
    pub pipe_distances: Vec<f64>,
    pub target_scores: Vec<u32>,
    pub max_generations: u32,
    pub runs_per_config: u32,
    pub population_size: usize,
    pub frame_budget: u32,
    pub seed: u32,
    pub fitness: FitnessPolicy,
    /// Arena template; gap window and spacing are overwritten per cell.
    pub world: WorldConfig,
    pub mutation: MutationSettings,
    pub jobs: Option<usize>,
    /// Wall-clock budget per cell. Exceeding it aborts that cell only.
    pub cell_timeout_secs: Option<u64>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            window_sizes: vec![150.0],
            pipe_distances: vec![300.0, 400.0, 500.0, 600.0, 700.0],
            target_scores: vec![10, 20, 50, 100, 200],
            max_generations: 50,
            runs_per_config: 1,
            population_size: 50,
            frame_budget: FRAME_BUDGET_DEFAULT,
            seed: DEFAULT_STUDY_SEED,
            fitness: FitnessPolicy::default(),
            world: WorldConfig::default(),
            mutation: MutationSettings::default(),
            jobs: None,
            cell_timeout_secs: None,
        }
    }
}

impl StudyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("failed reading study config {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("failed parsing study config {}", path.display()))
    }

    /// Checks every cell the sweep would produce, so a bad combination fails
    /// before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_sizes.is_empty() {
            return Err(ConfigError::EmptySweep {
                field: "window_sizes",
            });
        }
        if self.pipe_distances.is_empty() {
            return Err(ConfigError::EmptySweep {
                field: "pipe_distances",
            });
        }
        if self.runs_per_config == 0 {
            return Err(ConfigError::ZeroCount {
                field: "runs_per_config",
            });
        }
        if self.population_size == 0 {
            return Err(ConfigError::ZeroCount {
                field: "population_size",
            });
        }
        if self.jobs == Some(0) {
            return Err(ConfigError::ZeroCount { field: "jobs" });
        }
        if self.cell_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroCount {
                field: "cell_timeout_secs",
            });
        }
        ProgressTracker::new(&self.target_scores, self.max_generations)?;
        self.mutation.validate()?;
        for window in &self.window_sizes {
            for distance in &self.pipe_distances {
                self.evaluation_settings(*window, *distance).validate()?;
            }
        }
        Ok(())
    }

    pub fn evaluation_settings(&self, window: f64, distance: f64) -> EvaluationSettings {
        EvaluationSettings {
            world: WorldConfig {
                gap_window: window,
                spacing: distance,
                ..self.world.clone()
            },
            fitness: self.fitness,
            frame_budget: self.frame_budget,
            ..EvaluationSettings::default()
        }
    }

    /// Targets sorted ascending without duplicates, as the tracker keys them.
    pub fn sorted_targets(&self) -> Vec<u32> {
        let mut targets = self.target_scores.clone();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    pub fn cell_count(&self) -> usize {
        self.window_sizes.len() * self.pipe_distances.len() * self.runs_per_config as usize
    }
}

/// Worker count from `FLAPPY_JOBS`; unset, unparsable or zero means "let
/// rayon decide".
pub fn jobs_from_env() -> Option<usize> {
    env::var(JOBS_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_study() {
        let config = StudyConfig::default();
        assert_eq!(config.window_sizes, vec![150.0]);
        assert_eq!(config.pipe_distances.len(), 5);
        assert_eq!(config.target_scores, vec![10, 20, 50, 100, 200]);
        assert_eq!(config.max_generations, 50);
        assert_eq!(config.population_size, 50);
        assert_eq!(config.cell_count(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StudyConfig =
            serde_json::from_str(r#"{ "pipe_distances": [250], "target_scores": [3, 1, 3] }"#)
                .expect("parse");
        assert_eq!(config.pipe_distances, vec![250.0]);
        assert_eq!(config.window_sizes, vec![150.0]);
        assert_eq!(config.sorted_targets(), vec![1, 3]);
        assert_eq!(config.world, WorldConfig::default());
    }

    #[test]
    fn bad_sweeps_are_rejected() {
        let empty = StudyConfig {
            window_sizes: Vec::new(),
            ..StudyConfig::default()
        };
        assert_eq!(
            empty.validate(),
            Err(ConfigError::EmptySweep {
                field: "window_sizes"
            })
        );

        let negative = StudyConfig {
            pipe_distances: vec![400.0, -1.0],
            ..StudyConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::NonPositive {
                field: "spacing",
                ..
            })
        ));

        let no_targets = StudyConfig {
            target_scores: Vec::new(),
            ..StudyConfig::default()
        };
        assert_eq!(no_targets.validate(), Err(ConfigError::EmptyTargets));

        let zero_jobs = StudyConfig {
            jobs: Some(0),
            ..StudyConfig::default()
        };
        assert!(zero_jobs.validate().is_err());
    }

    #[test]
    fn mutation_settings_are_checked_up_front() {
        let config: StudyConfig =
            serde_json::from_str(r#"{ "mutation": { "mutation_rate": 1.5 } }"#).expect("parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "mutation.mutation_rate",
                ..
            })
        ));
    }

    #[test]
    fn malformed_agent_mask_is_rejected() {
        let config: StudyConfig = serde_json::from_str(
            r#"{ "world": { "agent_shape": { "kind": "mask", "width": 16, "height": 16, "bits": [true] } } }"#,
        )
        .expect("parse");
        assert_eq!(
            config.validate(),
            Err(ConfigError::MaskSize {
                expected: 256,
                actual: 1
            })
        );
    }

    #[test]
    fn per_cell_settings_override_gap_and_spacing() {
        let config = StudyConfig::default();
        let settings = config.evaluation_settings(120.0, 650.0);
        assert_eq!(settings.world.gap_window, 120.0);
        assert_eq!(settings.world.spacing, 650.0);
        assert_eq!(settings.frame_budget, config.frame_budget);
        assert_eq!(settings.world.frame_rate, config.world.frame_rate);
    }
}
