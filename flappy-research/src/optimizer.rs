//! Population search plugged into the harness.
//!
//! The harness only needs [`Optimizer`]: hand out a population, take it back
//! scored, breed the next one. [`MutationOptimizer`] is a small elitist
//! baseline over [`LinearPolicy`] so studies can run without an external
//! search library.

use anyhow::{anyhow, Context, Result};
use flappy_core::constants::{ARENA_HEIGHT, OBSERVATION_LEN};
use flappy_core::error::{require_in_range, require_non_negative, require_positive};
use flappy_core::{ConfigError, DecisionPolicy, Member, Observation};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub trait Optimizer {
    type Policy: DecisionPolicy;

    /// Current population. The evaluator writes fitness into it in place.
    fn population(&mut self) -> Result<&mut [Member<Self::Policy>]>;

    /// Fitness is final for the current population; produce the next one.
    fn advance(&mut self) -> Result<()>;

    /// No further generations will be requested.
    fn stop(&mut self);
}

/// Single linear unit squashed with `tanh`. Inputs are scaled by the arena
/// height so every weight sees values of similar magnitude.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicy {
    pub weights: [f64; OBSERVATION_LEN],
    pub bias: f64,
}

impl LinearPolicy {
    pub fn random<R: Rng>(rng: &mut R, range: f64) -> Self {
        let mut weights = [0.0; OBSERVATION_LEN];
        for weight in &mut weights {
            *weight = rng.gen_range(-range..=range);
        }
        Self {
            weights,
            bias: rng.gen_range(-range..=range),
        }
    }
}

impl DecisionPolicy for LinearPolicy {
    fn decide(&self, observation: &Observation) -> f64 {
        let inputs = observation.to_array();
        let sum: f64 = self
            .weights
            .iter()
            .zip(inputs.iter())
            .map(|(weight, input)| weight * input / ARENA_HEIGHT)
            .sum();
        (sum + self.bias).tanh()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationSettings {
    /// Share of the population copied unchanged into the next generation.
    pub elite_fraction: f64,
    /// Per-parameter mutation probability.
    pub mutation_rate: f64,
    /// Standard deviation of the mutation noise.
    pub mutation_power: f64,
    /// Parameters are kept within `[-weight_range, weight_range]`.
    pub weight_range: f64,
}

impl MutationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_in_range("mutation.elite_fraction", self.elite_fraction, 0.0, 1.0)?;
        require_in_range("mutation.mutation_rate", self.mutation_rate, 0.0, 1.0)?;
        require_non_negative("mutation.mutation_power", self.mutation_power)?;
        require_positive("mutation.weight_range", self.weight_range)?;
        Ok(())
    }
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            elite_fraction: 0.2,
            mutation_rate: 0.8,
            mutation_power: 0.5,
            weight_range: 30.0,
        }
    }
}

#[derive(Debug)]
pub struct MutationOptimizer {
    rng: SmallRng,
    settings: MutationSettings,
    members: Vec<Member<LinearPolicy>>,
    next_id: u64,
    generation: u32,
    stopped: bool,
}

impl MutationOptimizer {
    pub fn new(population_size: usize, seed: u64, settings: MutationSettings) -> Result<Self> {
        if population_size == 0 {
            return Err(anyhow!("population size must be >= 1"));
        }
        settings.validate().context("invalid mutation settings")?;

        let mut rng = SmallRng::seed_from_u64(seed);
        let members = (0..population_size as u64)
            .map(|id| Member::new(id, LinearPolicy::random(&mut rng, 1.0)))
            .collect();
        Ok(Self {
            rng,
            settings,
            members,
            next_id: population_size as u64,
            generation: 1,
            stopped: false,
        })
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn best(&self) -> Option<&Member<LinearPolicy>> {
        self.members
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    fn gaussian(&mut self) -> f64 {
        let u1 = self.rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let u2 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn mutate(&mut self, policy: &mut LinearPolicy) {
        let MutationSettings {
            mutation_rate,
            mutation_power,
            weight_range,
            ..
        } = self.settings;
        for index in 0..=OBSERVATION_LEN {
            if self.rng.gen::<f64>() >= mutation_rate {
                continue;
            }
            let noise = self.gaussian() * mutation_power;
            let slot = if index < OBSERVATION_LEN {
                &mut policy.weights[index]
            } else {
                &mut policy.bias
            };
            *slot = (*slot + noise).clamp(-weight_range, weight_range);
        }
    }
}

impl Optimizer for MutationOptimizer {
    type Policy = LinearPolicy;

    fn population(&mut self) -> Result<&mut [Member<LinearPolicy>]> {
        if self.stopped {
            return Err(anyhow!("optimizer was stopped"));
        }
        Ok(&mut self.members)
    }

    fn advance(&mut self) -> Result<()> {
        if self.stopped {
            return Err(anyhow!("optimizer was stopped"));
        }
        if let Some(member) = self.members.iter().find(|m| !m.fitness.is_finite()) {
            return Err(anyhow!(
                "member {} has non-finite fitness {}",
                member.id,
                member.fitness
            ));
        }

        let mut ranked = std::mem::take(&mut self.members);
        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness).then(a.id.cmp(&b.id)));

        let size = ranked.len();
        let elites = ((size as f64 * self.settings.elite_fraction).ceil() as usize).clamp(1, size);
        let parent_pool = (size / 2).max(elites);

        let mut next = Vec::with_capacity(size);
        for elite in ranked.iter().take(elites) {
            next.push(Member::new(elite.id, elite.policy.clone()));
        }
        while next.len() < size {
            // Binary tournament within the better half.
            let a = self.rng.gen_range(0..parent_pool);
            let b = self.rng.gen_range(0..parent_pool);
            let parent = &ranked[a.min(b)];
            let mut policy = parent.policy.clone();
            self.mutate(&mut policy);
            next.push(Member::new(self.next_id, policy));
            self.next_id += 1;
        }

        self.members = next;
        self.generation += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flappy_core::{evaluate_generation, EvaluationSettings};

    #[test]
    fn same_seed_same_population() {
        let a = MutationOptimizer::new(8, 11, MutationSettings::default()).expect("valid");
        let b = MutationOptimizer::new(8, 11, MutationSettings::default()).expect("valid");
        assert_eq!(a.members, b.members);
        let c = MutationOptimizer::new(8, 12, MutationSettings::default()).expect("valid");
        assert_ne!(a.members, c.members);
    }

    #[test]
    fn advance_keeps_size_and_the_elite() {
        let mut optimizer =
            MutationOptimizer::new(10, 3, MutationSettings::default()).expect("valid");
        let population = optimizer.population().expect("running");
        for (index, member) in population.iter_mut().enumerate() {
            member.fitness = index as f64;
        }
        let best = population[9].clone();

        optimizer.advance().expect("advance");
        let population = optimizer.population().expect("running");
        assert_eq!(population.len(), 10);
        assert_eq!(population[0].id, best.id);
        assert_eq!(population[0].policy, best.policy);
        assert!(population.iter().all(|member| member.fitness == 0.0));
        assert_eq!(optimizer.generation(), 2);
    }

    #[test]
    fn stopped_optimizer_refuses_work() {
        let mut optimizer =
            MutationOptimizer::new(4, 1, MutationSettings::default()).expect("valid");
        optimizer.stop();
        assert!(optimizer.is_stopped());
        assert!(optimizer.population().is_err());
        assert!(optimizer.advance().is_err());
    }

    #[test]
    fn non_finite_fitness_is_an_error() {
        let mut optimizer =
            MutationOptimizer::new(4, 1, MutationSettings::default()).expect("valid");
        optimizer.population().expect("running")[2].fitness = f64::NAN;
        assert!(optimizer.advance().is_err());
    }

    #[test]
    fn bad_settings_are_rejected() {
        assert!(MutationOptimizer::new(0, 1, MutationSettings::default()).is_err());
        let settings = MutationSettings {
            mutation_rate: 1.5,
            ..MutationSettings::default()
        };
        assert!(MutationOptimizer::new(4, 1, settings).is_err());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange {
                field: "mutation.mutation_rate",
                ..
            })
        ));
        let flat = MutationSettings {
            weight_range: 0.0,
            ..MutationSettings::default()
        };
        assert!(flat.validate().is_err());
        assert!(MutationSettings::default().validate().is_ok());
    }

    #[test]
    fn plugs_into_the_evaluator() {
        let mut optimizer =
            MutationOptimizer::new(16, 5, MutationSettings::default()).expect("valid");
        let settings = EvaluationSettings::default();
        for generation in 0..3 {
            let population = optimizer.population().expect("running");
            evaluate_generation(population, &settings, generation).expect("valid");
            assert!(population.iter().all(|member| member.fitness.is_finite()));
            optimizer.advance().expect("advance");
        }
        assert_eq!(optimizer.generation(), 4);
        assert!(optimizer.best().is_some());
    }
}
