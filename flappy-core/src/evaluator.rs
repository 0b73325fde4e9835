//! One generation: every population member flies its own agent through a
//! single shared obstacle field until extinction or the frame budget.

use serde::{Deserialize, Serialize};

use crate::constants::{FRAME_BUDGET_DEFAULT, JUMP_THRESHOLD, OBSERVATION_LEN};
use crate::error::{require_positive, ConfigError};
use crate::fitness::FitnessPolicy;
use crate::physics::Obstacle;
use crate::world::{Agent, AgentId, World, WorldConfig};

/// Inputs handed to a decision policy each tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub height: f64,
    pub to_gap_top: f64,
    pub to_gap_bottom: f64,
    pub to_leading_edge: f64,
    pub to_trailing_edge: f64,
}

impl Observation {
    pub fn new(agent: &Agent, obstacle: &Obstacle) -> Self {
        let y = agent.body.y;
        let x = agent.body.x;
        Self {
            height: y,
            to_gap_top: (y - obstacle.gap_top).abs(),
            to_gap_bottom: (y - obstacle.gap_bottom).abs(),
            to_leading_edge: obstacle.x - x,
            to_trailing_edge: obstacle.trailing_edge() - x,
        }
    }

    pub fn to_array(&self) -> [f64; OBSERVATION_LEN] {
        [
            self.height,
            self.to_gap_top,
            self.to_gap_bottom,
            self.to_leading_edge,
            self.to_trailing_edge,
        ]
    }
}

/// Externally supplied controller. Outputs above the evaluator's threshold
/// trigger a jump.
pub trait DecisionPolicy {
    fn decide(&self, observation: &Observation) -> f64;
}

impl<F> DecisionPolicy for F
where
    F: Fn(&Observation) -> f64,
{
    fn decide(&self, observation: &Observation) -> f64 {
        self(observation)
    }
}

/// Policy that always answers the same value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantPolicy(pub f64);

impl DecisionPolicy for ConstantPolicy {
    fn decide(&self, _observation: &Observation) -> f64 {
        self.0
    }
}

/// One population entry: identifier, policy and the fitness accumulator the
/// evaluator writes into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Member<P> {
    pub id: u64,
    pub policy: P,
    pub fitness: f64,
}

impl<P> Member<P> {
    pub fn new(id: u64, policy: P) -> Self {
        Self {
            id,
            policy,
            fitness: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub world: WorldConfig,
    pub fitness: FitnessPolicy,
    pub frame_budget: u32,
    pub jump_threshold: f64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            fitness: FitnessPolicy::default(),
            frame_budget: FRAME_BUDGET_DEFAULT,
            jump_threshold: JUMP_THRESHOLD,
        }
    }
}

impl EvaluationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.world.validate()?;
        self.fitness.validate()?;
        if self.frame_budget == 0 {
            return Err(ConfigError::ZeroCount {
                field: "frame_budget",
            });
        }
        if !self.jump_threshold.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "jump_threshold",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Extinction,
    FrameBudget,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// Obstacles cleared by the roster as a whole.
    pub score: u32,
    pub frames: u32,
    pub survivors: usize,
    pub deaths: usize,
    pub termination: Termination,
    pub best_fitness: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickCheckpoint {
    pub frame: u32,
    pub score: u32,
    pub alive: usize,
    pub rng_state: u32,
    pub agent_ys: Vec<f64>,
    pub obstacle_xs: Vec<f64>,
}

/// Runs one generation. Each member's fitness is reset and then accumulated
/// in place; the returned outcome carries the realized score.
pub fn evaluate_generation<P: DecisionPolicy>(
    members: &mut [Member<P>],
    settings: &EvaluationSettings,
    seed: u32,
) -> Result<GenerationOutcome, ConfigError> {
    let mut run = Run::new(members, settings, seed)?;
    while run.tick().is_none() {}
    Ok(run.outcome())
}

/// Same as [`evaluate_generation`] but also records a checkpoint at frame 0,
/// every `every` frames, and at the final frame.
pub fn evaluate_with_checkpoints<P: DecisionPolicy>(
    members: &mut [Member<P>],
    settings: &EvaluationSettings,
    seed: u32,
    every: u32,
) -> Result<(GenerationOutcome, Vec<TickCheckpoint>), ConfigError> {
    require_positive("checkpoint interval", every as f64)?;
    let mut run = Run::new(members, settings, seed)?;
    let mut checkpoints = vec![run.checkpoint()];
    loop {
        let done = run.tick();
        let frame = run.world.frame();
        if done.is_some() {
            if checkpoints.last().map(|c| c.frame) != Some(frame) {
                checkpoints.push(run.checkpoint());
            }
            break;
        }
        if frame % every == 0 {
            checkpoints.push(run.checkpoint());
        }
    }
    Ok((run.outcome(), checkpoints))
}

/// Per-generation run state. Lives only for one evaluation call.
struct Run<'a, P> {
    world: World,
    members: &'a mut [Member<P>],
    settings: &'a EvaluationSettings,
    score: u32,
    deaths: usize,
    termination: Option<Termination>,
    alive_buf: Vec<AgentId>,
    jump_buf: Vec<AgentId>,
}

impl<'a, P: DecisionPolicy> Run<'a, P> {
    fn new(
        members: &'a mut [Member<P>],
        settings: &'a EvaluationSettings,
        seed: u32,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut world = World::new(settings.world.clone(), seed)?;
        for (index, member) in members.iter_mut().enumerate() {
            member.fitness = 0.0;
            world.spawn_agent(AgentId(index));
        }
        Ok(Self {
            world,
            settings,
            score: 0,
            deaths: 0,
            termination: None,
            alive_buf: Vec::with_capacity(members.len()),
            jump_buf: Vec::with_capacity(members.len()),
            members,
        })
    }

    /// Advances one frame. Returns the termination once the run is over.
    fn tick(&mut self) -> Option<Termination> {
        if let Some(done) = self.termination {
            return Some(done);
        }
        if self.world.is_empty() {
            self.termination = Some(Termination::Extinction);
            return self.termination;
        }
        if self.world.frame() >= self.settings.frame_budget {
            self.termination = Some(Termination::FrameBudget);
            return self.termination;
        }

        self.jump_buf.clear();
        for agent in self.world.agents() {
            let Some(obstacle) = self.world.next_obstacle(agent.body.x) else {
                continue;
            };
            let observation = Observation::new(agent, obstacle);
            let output = self.members[agent.id.0].policy.decide(&observation);
            if output > self.settings.jump_threshold {
                self.jump_buf.push(agent.id);
            }
        }
        for id in &self.jump_buf {
            self.world.jump(*id);
        }

        self.alive_buf.clear();
        self.alive_buf
            .extend(self.world.agents().iter().map(|agent| agent.id));

        let events = self.world.step();
        self.score += events.cleared;
        self.deaths += events.deaths.len();

        let survivors: Vec<AgentId> = self.world.agents().iter().map(|agent| agent.id).collect();
        for delta in self
            .settings
            .fitness
            .tick_deltas(&self.alive_buf, &survivors, &events)
        {
            self.members[delta.agent.0].fitness += delta.delta;
        }

        if self.world.is_empty() {
            self.termination = Some(Termination::Extinction);
        } else if self.world.frame() >= self.settings.frame_budget {
            self.termination = Some(Termination::FrameBudget);
        }
        self.termination
    }

    fn checkpoint(&self) -> TickCheckpoint {
        TickCheckpoint {
            frame: self.world.frame(),
            score: self.score,
            alive: self.world.agents().len(),
            rng_state: self.world.rng_state(),
            agent_ys: self.world.agents().iter().map(|a| a.body.y).collect(),
            obstacle_xs: self.world.obstacles().map(|o| o.x).collect(),
        }
    }

    fn outcome(&self) -> GenerationOutcome {
        GenerationOutcome {
            score: self.score,
            frames: self.world.frame(),
            survivors: self.world.agents().len(),
            deaths: self.deaths,
            termination: self.termination.unwrap_or(Termination::FrameBudget),
            best_fitness: self
                .members
                .iter()
                .map(|member| member.fitness)
                .reduce(f64::max)
                .unwrap_or(0.0),
        }
    }
}
