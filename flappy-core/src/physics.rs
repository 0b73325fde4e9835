//! Per-tick update rules for agents and obstacles.
//!
//! Every rate is stored per second in [`WorldConfig`] and divided by the frame
//! rate here, so velocities below are in px/frame and gravity in px/frame^2.
//! Agent displacement uses the exact kinematic solution over the tick (split
//! at the instant a terminal velocity is reached), which keeps the real-time
//! trajectory independent of the frame rate.

use serde::{Deserialize, Serialize};

use crate::shape::Rect;
use crate::world::WorldConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRates {
    pub gravity: f64,
    pub fall_terminal: f64,
    pub rise_terminal: f64,
    pub jump_impulse: f64,
    pub scroll: f64,
}

impl FrameRates {
    pub fn from_config(config: &WorldConfig) -> Self {
        let fps = config.frame_rate;
        Self {
            gravity: config.gravity / (fps * fps),
            fall_terminal: config.fall_terminal / fps,
            rise_terminal: config.rise_terminal / fps,
            jump_impulse: config.jump_impulse / fps,
            scroll: config.scroll_speed / fps,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentBody {
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
}

impl AgentBody {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            velocity: 0.0,
        }
    }
}

/// Pipe pair. `x` is the leading (left) edge; the solid segments sit above
/// `gap_top` and below `gap_bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u64,
    pub x: f64,
    pub width: f64,
    pub gap_top: f64,
    pub gap_bottom: f64,
    pub segment_height: f64,
    pub passed: bool,
}

impl Obstacle {
    #[inline]
    pub fn trailing_edge(&self) -> f64 {
        self.x + self.width
    }

    pub fn top_segment(&self) -> Rect {
        Rect::new(
            self.x,
            self.gap_top - self.segment_height,
            self.width,
            self.segment_height,
        )
    }

    pub fn bottom_segment(&self) -> Rect {
        Rect::new(self.x, self.gap_bottom, self.width, self.segment_height)
    }

    pub fn span(&self) -> Rect {
        Rect::new(
            self.x,
            self.gap_top - self.segment_height,
            self.width,
            self.gap_bottom - self.gap_top + 2.0 * self.segment_height,
        )
    }
}

/// Applies one frame of gravity, clamps to the terminal velocities and moves
/// the agent by the distance actually covered during the frame.
///
/// The displacement is exact rather than a plain `y += velocity` step, so even
/// at 60 fps the first frame from rest lands at 200.625, not 201.25.
pub fn advance_agent(body: &mut AgentBody, rates: &FrameRates) {
    let v0 = body.velocity.clamp(rates.rise_terminal, rates.fall_terminal);
    let g = rates.gravity;
    let unclamped = v0 + g;

    let cap = if unclamped > rates.fall_terminal {
        Some(rates.fall_terminal)
    } else if unclamped < rates.rise_terminal {
        Some(rates.rise_terminal)
    } else {
        None
    };

    let (velocity, displacement) = match cap {
        None => (unclamped, v0 + 0.5 * g),
        Some(cap) => {
            // Fraction of the frame spent accelerating before the cap.
            let t = if g != 0.0 {
                ((cap - v0) / g).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (cap, v0 * t + 0.5 * g * t * t + cap * (1.0 - t))
        }
    };

    body.velocity = velocity;
    body.y += displacement;
}

/// Resets vertical velocity to the jump impulse.
pub fn jump(body: &mut AgentBody, rates: &FrameRates) {
    body.velocity = rates.jump_impulse;
}

pub fn advance_obstacle(obstacle: &mut Obstacle, rates: &FrameRates) {
    obstacle.x -= rates.scroll;
}

/// Display tilt in radians, `-atan(vy / vx)`. `atan2` keeps it defined when
/// the world does not scroll.
pub fn tilt(velocity: f64, scroll: f64) -> f64 {
    if velocity == 0.0 && scroll == 0.0 {
        return 0.0;
    }
    -velocity.atan2(scroll)
}
