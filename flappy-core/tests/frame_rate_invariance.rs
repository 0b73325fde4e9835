use std::collections::HashMap;

use flappy_core::world::{AgentId, World, WorldConfig};

const TOLERANCE: f64 = 1e-6;

fn config_at(fps: f64) -> WorldConfig {
    WorldConfig {
        frame_rate: fps,
        ..WorldConfig::default()
    }
}

#[test]
fn agent_trajectory_matches_at_double_frame_rate() {
    // Obstacles far away so the agent only meets gravity and the floor.
    let far = |fps| WorldConfig {
        first_obstacle_x: 50_000.0,
        ..config_at(fps)
    };
    let mut slow = World::new(far(60.0), 3).expect("valid");
    let mut fast = World::new(far(120.0), 3).expect("valid");
    for world in [&mut slow, &mut fast] {
        world.spawn_agent(AgentId(0));
        assert!(world.jump(AgentId(0)));
    }

    // One real second: rise, apex, fall, and time at terminal velocity.
    for frame in 1..=60 {
        slow.step();
        fast.step();
        fast.step();
        let a = slow.agents()[0].body;
        let b = fast.agents()[0].body;
        assert!(
            (a.y - b.y).abs() < TOLERANCE,
            "frame {frame}: {} vs {}",
            a.y,
            b.y
        );
        // Velocities are per frame, so the faster world's is half as large.
        assert!((a.velocity - 2.0 * b.velocity).abs() < TOLERANCE);
    }
}

#[test]
fn floor_is_reached_at_the_same_real_time() {
    let mut death_times = Vec::new();
    for fps in [60.0, 120.0, 240.0] {
        let mut world = World::new(
            WorldConfig {
                first_obstacle_x: 50_000.0,
                ..config_at(fps)
            },
            1,
        )
        .expect("valid");
        world.spawn_agent(AgentId(0));
        while !world.is_empty() {
            world.step();
        }
        death_times.push(world.frame() as f64 / fps);
    }
    // Discrete detection may lag by at most one frame of the slowest rate.
    for time in &death_times {
        assert!((time - death_times[0]).abs() <= 1.0 / 60.0, "{death_times:?}");
    }
}

#[test]
fn obstacles_scroll_and_recycle_consistently() {
    let mut slow = World::new(config_at(60.0), 42).expect("valid");
    let mut fast = World::new(config_at(120.0), 42).expect("valid");

    for _ in 0..600 {
        slow.step();
        fast.step();
        fast.step();

        let by_id: HashMap<u64, (f64, f64)> = fast
            .obstacles()
            .map(|obstacle| (obstacle.id, (obstacle.x, obstacle.gap_top)))
            .collect();
        for obstacle in slow.obstacles() {
            // Recycling may happen one fine frame apart; compare the shared ones.
            if let Some((x, gap_top)) = by_id.get(&obstacle.id) {
                assert!((obstacle.x - x).abs() < TOLERANCE, "obstacle {}", obstacle.id);
                assert_eq!(obstacle.gap_top, *gap_top);
            }
        }
    }
}
