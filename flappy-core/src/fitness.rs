use serde::{Deserialize, Serialize};

use crate::constants::{ALIVE_REWARD, COLLISION_PENALTY, PIPE_REWARD};
use crate::error::{require_non_negative, ConfigError};
use crate::world::{AgentId, TickEvents};

/// Reward magnitudes applied per tick. The penalty is stored as a positive
/// magnitude and subtracted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessPolicy {
    pub alive_reward: f64,
    pub pipe_reward: f64,
    pub collision_penalty: f64,
}

impl Default for FitnessPolicy {
    fn default() -> Self {
        Self {
            alive_reward: ALIVE_REWARD,
            pipe_reward: PIPE_REWARD,
            collision_penalty: COLLISION_PENALTY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitnessDelta {
    pub agent: AgentId,
    pub delta: f64,
}

impl FitnessPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("alive_reward", self.alive_reward)?;
        require_non_negative("pipe_reward", self.pipe_reward)?;
        require_non_negative("collision_penalty", self.collision_penalty)?;
        Ok(())
    }

    /// Maps one tick to fitness changes.
    ///
    /// `alive_at_start` earns the survival reward, `survivors` (the roster
    /// after the tick) share the reward for every cleared obstacle, and each
    /// death in `events` is penalized once.
    pub fn tick_deltas(
        &self,
        alive_at_start: &[AgentId],
        survivors: &[AgentId],
        events: &TickEvents,
    ) -> Vec<FitnessDelta> {
        let mut deltas =
            Vec::with_capacity(alive_at_start.len() + survivors.len() + events.deaths.len());

        if self.alive_reward != 0.0 {
            deltas.extend(alive_at_start.iter().map(|agent| FitnessDelta {
                agent: *agent,
                delta: self.alive_reward,
            }));
        }

        if events.cleared > 0 && self.pipe_reward != 0.0 {
            let reward = self.pipe_reward * events.cleared as f64;
            deltas.extend(survivors.iter().map(|agent| FitnessDelta {
                agent: *agent,
                delta: reward,
            }));
        }

        deltas.extend(events.deaths.iter().map(|death| FitnessDelta {
            agent: death.agent,
            delta: -self.collision_penalty,
        }));

        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Death, DeathCause};

    fn total_for(deltas: &[FitnessDelta], agent: AgentId) -> f64 {
        deltas
            .iter()
            .filter(|d| d.agent == agent)
            .map(|d| d.delta)
            .sum()
    }

    #[test]
    fn cleared_reward_goes_to_survivors_only() {
        let policy = FitnessPolicy::default();
        let events = TickEvents {
            frame: 10,
            cleared: 1,
            recycled: 0,
            deaths: vec![Death {
                agent: AgentId(2),
                cause: DeathCause::Obstacle,
            }],
        };
        let deltas = policy.tick_deltas(
            &[AgentId(0), AgentId(1), AgentId(2)],
            &[AgentId(0), AgentId(1)],
            &events,
        );

        assert!((total_for(&deltas, AgentId(0)) - 5.1).abs() < 1e-12);
        assert!((total_for(&deltas, AgentId(1)) - 5.1).abs() < 1e-12);
        assert!((total_for(&deltas, AgentId(2)) - (0.1 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn quiet_tick_only_pays_survival() {
        let policy = FitnessPolicy {
            alive_reward: 0.5,
            pipe_reward: 3.0,
            collision_penalty: 2.0,
        };
        let deltas = policy.tick_deltas(&[AgentId(4)], &[AgentId(4)], &TickEvents::default());
        assert_eq!(
            deltas,
            vec![FitnessDelta {
                agent: AgentId(4),
                delta: 0.5
            }]
        );
    }

    #[test]
    fn negative_magnitudes_are_rejected() {
        let policy = FitnessPolicy {
            collision_penalty: -1.0,
            ..FitnessPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
