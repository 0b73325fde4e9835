use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use flappy_core::{
    derive_seed, evaluate_generation, EvaluationSettings, ProgressRecord, ProgressTracker,
    Termination,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::StudyConfig;
use crate::optimizer::{MutationOptimizer, Optimizer};
use crate::util::{format_param, seed_to_hex};

/// One (window, distance, run) unit of the sweep. `index` is its position in
/// sweep order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSpec {
    pub index: usize,
    pub window_size: f64,
    pub pipe_distance: f64,
    pub run_number: u32,
}

impl CellSpec {
    /// Depends only on the study seed and the cell parameters, never on
    /// scheduling.
    pub fn seed(&self, study_seed: u32) -> u32 {
        let seed = derive_seed(study_seed, self.window_size.to_bits());
        let seed = derive_seed(seed, self.pipe_distance.to_bits());
        derive_seed(seed, self.run_number as u64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Optimizer,
    Evaluation,
    Panic,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimizer => "optimizer",
            Self::Evaluation => "evaluation",
            Self::Panic => "panic",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CellFailure {
    fn new(kind: FailureKind, err: impl std::fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Ok,
    Failed,
    Aborted,
}

impl CellStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u32,
    pub score: u32,
    pub frames: u32,
    pub survivors: usize,
    pub termination: Termination,
    pub best_fitness: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    pub cell: CellSpec,
    pub seed: u32,
    pub status: CellStatus,
    pub failure: Option<CellFailure>,
    pub record: ProgressRecord,
    pub generations: Vec<GenerationSummary>,
    pub elapsed_ms: u64,
}

/// Sweep order: window sizes outermost, then distances, then runs.
pub fn enumerate_cells(config: &StudyConfig) -> Vec<CellSpec> {
    let mut cells = Vec::with_capacity(config.cell_count());
    for window_size in &config.window_sizes {
        for pipe_distance in &config.pipe_distances {
            for run_number in 1..=config.runs_per_config {
                cells.push(CellSpec {
                    index: cells.len(),
                    window_size: *window_size,
                    pipe_distance: *pipe_distance,
                    run_number,
                });
            }
        }
    }
    cells
}

/// Factory for the bundled baseline optimizer.
pub fn baseline_optimizer(
    _cell: &CellSpec,
    seed: u32,
    config: &StudyConfig,
) -> Result<MutationOptimizer> {
    MutationOptimizer::new(config.population_size, seed as u64, config.mutation)
}

/// Runs every cell of the sweep and returns one result per cell in sweep
/// order. Only configuration problems are errors; cell failures are
/// reported in their result.
pub fn run_study<O, F>(config: &StudyConfig, factory: F) -> Result<Vec<CellResult>>
where
    O: Optimizer,
    F: Fn(&CellSpec, u32, &StudyConfig) -> Result<O> + Sync,
{
    config.validate().context("invalid study config")?;
    let cells = enumerate_cells(config);

    tracing::info!(
        "starting study: cells={} windows={:?} distances={:?} runs={} population={} max_generations={} seed={} jobs={}",
        cells.len(),
        config.window_sizes,
        config.pipe_distances,
        config.runs_per_config,
        config.population_size,
        config.max_generations,
        seed_to_hex(config.seed),
        config
            .jobs
            .map(|jobs| jobs.to_string())
            .unwrap_or_else(|| "auto".to_string())
    );

    let run_one = |cell: &CellSpec| run_cell(config, *cell, &factory);

    let mut results: Vec<CellResult> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| cells.par_iter().map(run_one).collect())
    } else {
        cells.par_iter().map(run_one).collect()
    };
    results.sort_by_key(|result| result.cell.index);

    let failed = results
        .iter()
        .filter(|result| result.status == CellStatus::Failed)
        .count();
    if failed > 0 {
        tracing::warn!("study finished with {} failed cell(s)", failed);
    }
    Ok(results)
}

/// Runs one cell to completion. Never fails: optimizer errors, evaluation
/// errors and panics all become a failed result.
pub fn run_cell<O, F>(config: &StudyConfig, cell: CellSpec, factory: &F) -> CellResult
where
    O: Optimizer,
    F: Fn(&CellSpec, u32, &StudyConfig) -> Result<O>,
{
    let started = Instant::now();
    let seed = cell.seed(config.seed);
    let settings = config.evaluation_settings(cell.window_size, cell.pipe_distance);
    let mut generations = Vec::new();

    let mut tracker = match ProgressTracker::new(&config.target_scores, config.max_generations) {
        Ok(tracker) => tracker,
        Err(err) => {
            return CellResult {
                cell,
                seed,
                status: CellStatus::Failed,
                failure: Some(CellFailure::new(FailureKind::Evaluation, err)),
                record: empty_record(config),
                generations,
                elapsed_ms: 0,
            };
        }
    };

    let deadline = config.cell_timeout_secs.map(Duration::from_secs);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        drive_cell(
            &cell,
            seed,
            config,
            &settings,
            factory,
            &mut tracker,
            &mut generations,
            started,
            deadline,
        )
    }));

    let (status, failure) = match outcome {
        Ok(Ok(())) if tracker.results().aborted => (CellStatus::Aborted, None),
        Ok(Ok(())) => (CellStatus::Ok, None),
        Ok(Err(failure)) => (CellStatus::Failed, Some(failure)),
        Err(payload) => (
            CellStatus::Failed,
            Some(CellFailure {
                kind: FailureKind::Panic,
                message: panic_message(payload.as_ref()),
            }),
        ),
    };

    let record = tracker.into_results();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &failure {
        Some(failure) => tracing::warn!(
            "cell failed: window={} distance={} run={} kind={} error={}",
            format_param(cell.window_size),
            format_param(cell.pipe_distance),
            cell.run_number,
            failure.kind.as_str(),
            failure.message
        ),
        None => tracing::info!(
            "cell done: window={} distance={} run={} status={} best={} generations={} completed={} elapsed_ms={}",
            format_param(cell.window_size),
            format_param(cell.pipe_distance),
            cell.run_number,
            status.as_str(),
            record.best_score,
            record.current_generation,
            record.completed,
            elapsed_ms
        ),
    }

    CellResult {
        cell,
        seed,
        status,
        failure,
        record,
        generations,
        elapsed_ms,
    }
}

#[allow(clippy::too_many_arguments)]
fn drive_cell<O, F>(
    cell: &CellSpec,
    seed: u32,
    config: &StudyConfig,
    settings: &EvaluationSettings,
    factory: &F,
    tracker: &mut ProgressTracker,
    generations: &mut Vec<GenerationSummary>,
    started: Instant,
    deadline: Option<Duration>,
) -> Result<(), CellFailure>
where
    O: Optimizer,
    F: Fn(&CellSpec, u32, &StudyConfig) -> Result<O>,
{
    let mut optimizer =
        factory(cell, seed, config).map_err(|err| CellFailure::new(FailureKind::Optimizer, err))?;

    let mut generation = 0u32;
    while !tracker.is_finished() {
        generation += 1;
        let population = optimizer
            .population()
            .map_err(|err| CellFailure::new(FailureKind::Optimizer, err))?;
        let outcome = evaluate_generation(population, settings, derive_seed(seed, generation as u64))
            .map_err(|err| CellFailure::new(FailureKind::Evaluation, err))?;

        tracing::info!(
            "gen={} best={} window={} distance={} run={}",
            generation,
            outcome.score,
            format_param(cell.window_size),
            format_param(cell.pipe_distance),
            cell.run_number
        );
        generations.push(GenerationSummary {
            generation,
            score: outcome.score,
            frames: outcome.frames,
            survivors: outcome.survivors,
            termination: outcome.termination,
            best_fitness: outcome.best_fitness,
        });

        let before: Vec<Option<u32>> = tracker
            .results()
            .generations_to_reach
            .values()
            .copied()
            .collect();
        tracker.update(generation, outcome.score);
        for ((target, reached), was) in tracker.results().generations_to_reach.iter().zip(before) {
            if was.is_none() && reached.is_some() {
                tracing::debug!(
                    "target {} reached at generation {} (window={} distance={})",
                    target,
                    generation,
                    format_param(cell.window_size),
                    format_param(cell.pipe_distance)
                );
            }
        }

        if tracker.is_finished() {
            break;
        }
        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            tracing::warn!(
                "cell timed out after generation {}: window={} distance={} run={}",
                generation,
                format_param(cell.window_size),
                format_param(cell.pipe_distance),
                cell.run_number
            );
            tracker.abort();
            break;
        }
        optimizer
            .advance()
            .map_err(|err| CellFailure::new(FailureKind::Optimizer, err))?;
    }

    optimizer.stop();
    Ok(())
}

fn empty_record(config: &StudyConfig) -> ProgressRecord {
    ProgressRecord {
        generations_to_reach: config
            .sorted_targets()
            .into_iter()
            .map(|target| (target, None))
            .collect(),
        current_generation: 0,
        best_score: 0,
        finished: true,
        completed: false,
        aborted: false,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "cell panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> StudyConfig {
        StudyConfig {
            window_sizes: vec![150.0, 200.0],
            pipe_distances: vec![300.0, 500.0],
            runs_per_config: 2,
            target_scores: vec![1, 2],
            max_generations: 3,
            population_size: 6,
            frame_budget: 600,
            ..StudyConfig::default()
        }
    }

    #[test]
    fn cells_enumerate_in_sweep_order() {
        let cells = enumerate_cells(&small_config());
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0].window_size, 150.0);
        assert_eq!(cells[0].pipe_distance, 300.0);
        assert_eq!(cells[0].run_number, 1);
        assert_eq!(cells[1].run_number, 2);
        assert_eq!(cells[2].pipe_distance, 500.0);
        assert_eq!(cells[4].window_size, 200.0);
        assert!(cells.iter().enumerate().all(|(i, cell)| cell.index == i));
    }

    #[test]
    fn cell_seeds_depend_on_parameters_not_position() {
        let cells = enumerate_cells(&small_config());
        let moved = CellSpec {
            index: 99,
            ..cells[3]
        };
        assert_eq!(cells[3].seed(7), moved.seed(7));
        let mut seeds: Vec<u32> = cells.iter().map(|cell| cell.seed(7)).collect();
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), cells.len());
        assert_ne!(cells[0].seed(7), cells[0].seed(8));
    }

    #[test]
    fn cell_stops_at_the_generation_ceiling() {
        let config = small_config();
        let cell = enumerate_cells(&config)[0];
        let result = run_cell(&config, cell, &baseline_optimizer);
        assert_eq!(result.status, CellStatus::Ok);
        assert!(result.record.finished);
        assert!(result.record.current_generation <= 3);
        assert_eq!(
            result.generations.len() as u32,
            result.record.current_generation
        );
    }

    #[test]
    fn panics_become_failed_cells() {
        let config = small_config();
        let cell = enumerate_cells(&config)[0];
        let factory = |_: &CellSpec, _: u32, _: &StudyConfig| -> Result<MutationOptimizer> {
            panic!("factory exploded")
        };
        let result = run_cell(&config, cell, &factory);
        assert_eq!(result.status, CellStatus::Failed);
        let failure = result.failure.expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.message, "factory exploded");
    }

    #[test]
    fn factory_errors_are_optimizer_failures() {
        let config = small_config();
        let cell = enumerate_cells(&config)[0];
        let factory = |_: &CellSpec, _: u32, _: &StudyConfig| -> Result<MutationOptimizer> {
            Err(anyhow::anyhow!("no optimizer today"))
        };
        let result = run_cell(&config, cell, &factory);
        assert_eq!(result.status, CellStatus::Failed);
        assert_eq!(
            result.failure.map(|failure| failure.kind),
            Some(FailureKind::Optimizer)
        );
        assert_eq!(result.record.current_generation, 0);
    }
}
