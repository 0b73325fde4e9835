//! Default arena geometry and physics rates.
//!
//! Rates are expressed per second (or per second squared) and converted to
//! per-frame deltas by [`crate::physics::FrameRates`].

// Arena
pub const ARENA_WIDTH: f64 = 600.0;
pub const ARENA_HEIGHT: f64 = 800.0;
pub const FLOOR_HEIGHT: f64 = 730.0;
pub const CEILING_HEIGHT: f64 = 0.0;
pub const FRAME_RATE: f64 = 60.0;

// Agent
pub const AGENT_START_X: f64 = 50.0;
pub const AGENT_START_Y: f64 = 200.0;
pub const AGENT_WIDTH: f64 = 34.0;
pub const AGENT_HEIGHT: f64 = 24.0;

// Agent rates (px/s, px/s^2)
pub const GRAVITY_PER_S2: f64 = 4_500.0;
pub const FALL_TERMINAL_PER_S: f64 = 600.0;
pub const RISE_TERMINAL_PER_S: f64 = -960.0;
pub const JUMP_IMPULSE_PER_S: f64 = -960.0;

// Obstacles
pub const SCROLL_SPEED_PER_S: f64 = 450.0;
pub const OBSTACLE_WIDTH: f64 = 52.0;
pub const OBSTACLE_SEGMENT_HEIGHT: f64 = 320.0;
pub const OBSTACLE_COUNT: usize = 3;
pub const FIRST_OBSTACLE_X: f64 = 700.0;
pub const GAP_WINDOW: f64 = 200.0;
pub const OBSTACLE_SPACING: f64 = 400.0;
/// Gap-top draw range, `[min, max)` in whole pixels.
pub const GAP_TOP_RANGE: (i32, i32) = (50, 450);

// Evaluation
pub const JUMP_THRESHOLD: f64 = 0.5;
pub const FRAME_BUDGET_DEFAULT: u32 = 10_000;

// Fitness
pub const ALIVE_REWARD: f64 = 0.1;
pub const PIPE_REWARD: f64 = 5.0;
pub const COLLISION_PENALTY: f64 = 1.0;

/// Number of inputs in an [`crate::evaluator::Observation`].
pub const OBSERVATION_LEN: usize = 5;
