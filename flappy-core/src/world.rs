use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::{
    AGENT_HEIGHT, AGENT_START_X, AGENT_START_Y, AGENT_WIDTH, CEILING_HEIGHT, FALL_TERMINAL_PER_S,
    FIRST_OBSTACLE_X, FLOOR_HEIGHT, FRAME_RATE, GAP_TOP_RANGE, GAP_WINDOW, GRAVITY_PER_S2,
    JUMP_IMPULSE_PER_S, OBSTACLE_COUNT, OBSTACLE_SEGMENT_HEIGHT, OBSTACLE_SPACING, OBSTACLE_WIDTH,
    RISE_TERMINAL_PER_S, SCROLL_SPEED_PER_S,
};
use crate::error::{require_non_negative, require_positive, ConfigError};
use crate::physics::{self, AgentBody, FrameRates, Obstacle};
use crate::rng::SeededRng;
use crate::shape::Occupancy;

/// Immutable arena parameters for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub frame_rate: f64,
    /// Horizontal scroll, px/s.
    pub scroll_speed: f64,
    /// Vertical gap between the top and bottom segment, px.
    pub gap_window: f64,
    /// Distance between consecutive obstacles' leading edges, px.
    pub spacing: f64,
    /// Agents whose bottom edge reaches this y are out of bounds.
    pub floor_height: f64,
    /// Agents whose top edge goes above this y are out of bounds.
    pub ceiling_height: f64,
    pub gravity: f64,
    pub fall_terminal: f64,
    pub rise_terminal: f64,
    pub jump_impulse: f64,
    pub obstacle_count: usize,
    pub first_obstacle_x: f64,
    pub obstacle_width: f64,
    pub obstacle_segment_height: f64,
    /// Gap-top draw range `[min, max)`, whole pixels.
    pub gap_top_range: (i32, i32),
    pub agent_start_x: f64,
    pub agent_start_y: f64,
    pub agent_shape: Occupancy,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            frame_rate: FRAME_RATE,
            scroll_speed: SCROLL_SPEED_PER_S,
            gap_window: GAP_WINDOW,
            spacing: OBSTACLE_SPACING,
            floor_height: FLOOR_HEIGHT,
            ceiling_height: CEILING_HEIGHT,
            gravity: GRAVITY_PER_S2,
            fall_terminal: FALL_TERMINAL_PER_S,
            rise_terminal: RISE_TERMINAL_PER_S,
            jump_impulse: JUMP_IMPULSE_PER_S,
            obstacle_count: OBSTACLE_COUNT,
            first_obstacle_x: FIRST_OBSTACLE_X,
            obstacle_width: OBSTACLE_WIDTH,
            obstacle_segment_height: OBSTACLE_SEGMENT_HEIGHT,
            gap_top_range: GAP_TOP_RANGE,
            agent_start_x: AGENT_START_X,
            agent_start_y: AGENT_START_Y,
            agent_shape: Occupancy::bounding_box(AGENT_WIDTH, AGENT_HEIGHT),
        }
    }
}

impl WorldConfig {
    /// Default arena with the two swept difficulty parameters replaced.
    pub fn with_gap(gap_window: f64, spacing: f64) -> Self {
        Self {
            gap_window,
            spacing,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("frame_rate", self.frame_rate)?;
        require_non_negative("scroll_speed", self.scroll_speed)?;
        require_positive("gap_window", self.gap_window)?;
        require_positive("spacing", self.spacing)?;
        require_positive("obstacle_width", self.obstacle_width)?;
        require_non_negative("obstacle_segment_height", self.obstacle_segment_height)?;
        require_non_negative("fall_terminal", self.fall_terminal)?;
        require_non_negative("rise_terminal (negated)", -self.rise_terminal)?;
        for (field, value) in [
            ("gravity", self.gravity),
            ("jump_impulse", self.jump_impulse),
            ("first_obstacle_x", self.first_obstacle_x),
            ("agent_start_x", self.agent_start_x),
            ("agent_start_y", self.agent_start_y),
            ("floor_height", self.floor_height),
            ("ceiling_height", self.ceiling_height),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field });
            }
        }
        if self.floor_height <= self.ceiling_height {
            return Err(ConfigError::FloorBelowCeiling {
                floor: self.floor_height,
                ceiling: self.ceiling_height,
            });
        }
        if self.obstacle_count == 0 {
            return Err(ConfigError::ZeroCount {
                field: "obstacle_count",
            });
        }
        let (min, max) = self.gap_top_range;
        if max <= min {
            return Err(ConfigError::EmptyGapRange { min, max });
        }
        require_positive("agent width", self.agent_shape.width())?;
        require_positive("agent height", self.agent_shape.height())?;
        self.agent_shape.validate()?;
        Ok(())
    }
}

/// Index of the population member an agent plays for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub body: AgentBody,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Obstacle,
    Floor,
    Ceiling,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    pub agent: AgentId,
    pub cause: DeathCause,
}

/// Everything that happened during one [`World::step`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickEvents {
    pub frame: u32,
    /// Obstacles newly cleared this tick; each counts once regardless of how
    /// many agents are alive.
    pub cleared: u32,
    pub recycled: u32,
    pub deaths: Vec<Death>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
    pub tilt: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub frame: u32,
    pub rng_state: u32,
    pub agents: Vec<AgentSnapshot>,
    pub obstacles: Vec<Obstacle>,
}

/// One arena: a recycled obstacle field plus the live agent roster.
#[derive(Clone, Debug)]
pub struct World {
    config: WorldConfig,
    rates: FrameRates,
    rng: SeededRng,
    obstacles: VecDeque<Obstacle>,
    agents: Vec<Agent>,
    frame: u32,
    next_obstacle_id: u64,
}

impl World {
    pub fn new(config: WorldConfig, seed: u32) -> Result<Self, ConfigError> {
        config.validate()?;
        let rates = FrameRates::from_config(&config);
        let mut world = Self {
            obstacles: VecDeque::with_capacity(config.obstacle_count),
            agents: Vec::new(),
            rates,
            rng: SeededRng::new(seed),
            frame: 0,
            next_obstacle_id: 0,
            config,
        };
        for i in 0..world.config.obstacle_count {
            let x = world.config.first_obstacle_x + i as f64 * world.config.spacing;
            let obstacle = world.create_obstacle(x);
            world.obstacles.push_back(obstacle);
        }
        Ok(world)
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn rates(&self) -> &FrameRates {
        &self.rates
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn rng_state(&self) -> u32 {
        self.rng.state()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn obstacles(&self) -> impl ExactSizeIterator<Item = &Obstacle> + '_ {
        self.obstacles.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Adds an agent at the configured start state.
    pub fn spawn_agent(&mut self, id: AgentId) {
        self.agents.push(Agent {
            id,
            body: AgentBody::new(self.config.agent_start_x, self.config.agent_start_y),
        });
    }

    /// External jump input. Returns false when the agent is not alive.
    pub fn jump(&mut self, id: AgentId) -> bool {
        match self.agents.iter_mut().find(|agent| agent.id == id) {
            Some(agent) => {
                physics::jump(&mut agent.body, &self.rates);
                true
            }
            None => false,
        }
    }

    /// Closest obstacle whose trailing edge is still ahead of `x`. Falls back
    /// to the rightmost obstacle if every one is behind.
    pub fn next_obstacle(&self, x: f64) -> Option<&Obstacle> {
        self.obstacles
            .iter()
            .filter(|obstacle| obstacle.trailing_edge() > x)
            .min_by(|a, b| a.trailing_edge().total_cmp(&b.trailing_edge()))
            .or_else(|| {
                self.obstacles
                    .iter()
                    .max_by(|a, b| a.x.total_cmp(&b.x))
            })
    }

    pub fn step(&mut self) -> TickEvents {
        self.frame += 1;

        for agent in &mut self.agents {
            physics::advance_agent(&mut agent.body, &self.rates);
        }
        for obstacle in &mut self.obstacles {
            physics::advance_obstacle(obstacle, &self.rates);
        }

        let cleared = self.mark_cleared();
        let recycled = self.recycle();
        let deaths = self.collect_deaths();
        if !deaths.is_empty() {
            self.agents
                .retain(|agent| !deaths.iter().any(|death| death.agent == agent.id));
        }

        TickEvents {
            frame: self.frame,
            cleared,
            recycled,
            deaths,
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            frame: self.frame,
            rng_state: self.rng.state(),
            agents: self
                .agents
                .iter()
                .map(|agent| AgentSnapshot {
                    id: agent.id,
                    x: agent.body.x,
                    y: agent.body.y,
                    velocity: agent.body.velocity,
                    tilt: physics::tilt(agent.body.velocity, self.rates.scroll),
                })
                .collect(),
            obstacles: self.obstacles.iter().copied().collect(),
        }
    }

    fn create_obstacle(&mut self, x: f64) -> Obstacle {
        let (min, max) = self.config.gap_top_range;
        let gap_top = self.rng.next_range(min, max) as f64;
        let id = self.next_obstacle_id;
        self.next_obstacle_id += 1;
        Obstacle {
            id,
            x,
            width: self.config.obstacle_width,
            gap_top,
            gap_bottom: gap_top + self.config.gap_window,
            segment_height: self.config.obstacle_segment_height,
            passed: false,
        }
    }

    fn mark_cleared(&mut self) -> u32 {
        let Some(rear_x) = self
            .agents
            .iter()
            .map(|agent| agent.body.x)
            .min_by(|a, b| a.total_cmp(b))
        else {
            return 0;
        };

        let mut cleared = 0;
        for obstacle in &mut self.obstacles {
            if !obstacle.passed && obstacle.trailing_edge() < rear_x {
                obstacle.passed = true;
                cleared += 1;
            }
        }
        cleared
    }

    fn recycle(&mut self) -> u32 {
        let mut recycled = 0;
        // Obstacles stay sorted by x, so anything off-field is at the front.
        while self
            .obstacles
            .front()
            .is_some_and(|obstacle| obstacle.trailing_edge() < 0.0)
        {
            let Some(removed) = self.obstacles.pop_front() else {
                break;
            };
            let max_x = self
                .obstacles
                .iter()
                .map(|obstacle| obstacle.x)
                .fold(removed.x, f64::max);
            let replacement = self.create_obstacle(max_x + self.config.spacing);
            self.obstacles.push_back(replacement);
            recycled += 1;
        }
        recycled
    }

    /// First phase of roster removal: scan an unchanged roster and report who
    /// died. The caller removes them afterwards.
    fn collect_deaths(&self) -> Vec<Death> {
        let shape = &self.config.agent_shape;
        let mut deaths = Vec::new();
        for agent in &self.agents {
            let bounds = shape.bounds(agent.body.x, agent.body.y);
            let hit = self.obstacles.iter().any(|obstacle| {
                obstacle.span().overlaps_horizontally(&bounds)
                    && (shape.overlaps_rect(agent.body.x, agent.body.y, &obstacle.top_segment())
                        || shape.overlaps_rect(
                            agent.body.x,
                            agent.body.y,
                            &obstacle.bottom_segment(),
                        ))
            });
            let cause = if hit {
                Some(DeathCause::Obstacle)
            } else if bounds.bottom() >= self.config.floor_height {
                Some(DeathCause::Floor)
            } else if bounds.y < self.config.ceiling_height {
                Some(DeathCause::Ceiling)
            } else {
                None
            };
            if let Some(cause) = cause {
                deaths.push(Death {
                    agent: agent.id,
                    cause,
                });
            }
        }
        deaths
    }
}
