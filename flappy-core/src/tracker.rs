//! First-generation-reached bookkeeping for a set of target scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Running,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Target score to the first generation whose best met it.
    pub generations_to_reach: BTreeMap<u32, Option<u32>>,
    pub current_generation: u32,
    pub best_score: u32,
    pub finished: bool,
    /// Every target was reached.
    pub completed: bool,
    pub aborted: bool,
}

#[derive(Clone, Debug)]
pub struct ProgressTracker {
    ceiling: u32,
    record: ProgressRecord,
}

impl ProgressTracker {
    /// Targets are sorted and deduplicated. The ceiling is the generation at
    /// which tracking stops even if targets remain.
    pub fn new(targets: &[u32], ceiling: u32) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }
        if targets.contains(&0) {
            return Err(ConfigError::ZeroTarget);
        }
        if ceiling == 0 {
            return Err(ConfigError::ZeroGenerationCeiling);
        }
        Ok(Self {
            ceiling,
            record: ProgressRecord {
                generations_to_reach: targets.iter().map(|target| (*target, None)).collect(),
                current_generation: 0,
                best_score: 0,
                finished: false,
                completed: false,
                aborted: false,
            },
        })
    }

    /// Folds in one generation's best score. Ignored once finished.
    pub fn update(&mut self, generation: u32, best_score: u32) -> TrackerState {
        if self.record.finished {
            return TrackerState::Finished;
        }

        let record = &mut self.record;
        record.current_generation = generation;
        record.best_score = record.best_score.max(best_score);
        let best = record.best_score;
        for (_, reached) in record
            .generations_to_reach
            .iter_mut()
            .take_while(|(target, _)| **target <= best)
        {
            reached.get_or_insert(generation);
        }

        record.completed = record
            .generations_to_reach
            .values()
            .all(|reached| reached.is_some());
        if record.completed || generation >= self.ceiling {
            record.finished = true;
        }
        self.state()
    }

    /// Forces the tracker to finish without reaching its targets.
    pub fn abort(&mut self) {
        if !self.record.finished {
            self.record.finished = true;
            self.record.aborted = true;
        }
    }

    pub fn state(&self) -> TrackerState {
        if self.record.finished {
            TrackerState::Finished
        } else {
            TrackerState::Running
        }
    }

    pub fn is_finished(&self) -> bool {
        self.record.finished
    }

    pub fn generation_reached(&self, target: u32) -> Option<u32> {
        self.record
            .generations_to_reach
            .get(&target)
            .copied()
            .flatten()
    }

    pub fn results(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn into_results(self) -> ProgressRecord {
        self.record
    }
}
