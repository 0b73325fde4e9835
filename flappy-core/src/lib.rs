pub mod constants;
pub mod error;
pub mod evaluator;
pub mod fitness;
pub mod physics;
pub mod rng;
pub mod shape;
pub mod tracker;
pub mod world;

pub use error::ConfigError;
pub use evaluator::{
    evaluate_generation, evaluate_with_checkpoints, ConstantPolicy, DecisionPolicy,
    EvaluationSettings, GenerationOutcome, Member, Observation, Termination, TickCheckpoint,
};
pub use fitness::FitnessPolicy;
pub use rng::{derive_seed, SeededRng};
pub use tracker::{ProgressRecord, ProgressTracker, TrackerState};
pub use world::{AgentId, TickEvents, World, WorldConfig, WorldSnapshot};
