use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flappy_core::{evaluate_generation, ConstantPolicy, Member};
use flappy_research::config::{jobs_from_env, StudyConfig};
use flappy_research::harness::{baseline_optimizer, run_cell, run_study, CellSpec};
use flappy_research::optimizer::{MutationOptimizer, Optimizer};
use flappy_research::report::{results_csv, write_study, ResultRow};
use flappy_research::util::{format_param, parse_f64_csv, parse_seed, parse_u32_csv, seed_to_hex};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flappy-research")]
#[command(
    about = "Sweeps obstacle gap and spacing and measures how many generations a population needs to reach target scores"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full window x distance x run sweep and write results
    Study {
        #[command(flatten)]
        overrides: ConfigArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run a single sweep cell and print its result row
    Cell {
        #[command(flatten)]
        overrides: ConfigArgs,
        #[arg(long, default_value_t = 150.0)]
        window: f64,
        #[arg(long, default_value_t = 400.0)]
        distance: f64,
        #[arg(long, default_value_t = 1)]
        run: u32,
    },
    /// Evaluate one generation of a fixed policy and print the outcome
    Scenario {
        #[arg(long, value_enum, default_value_t = ScenarioPolicy::Never)]
        policy: ScenarioPolicy,
        #[arg(long, default_value_t = 150.0)]
        window: f64,
        #[arg(long, default_value_t = 400.0)]
        distance: f64,
        #[arg(long, default_value = "0xF1A90001")]
        seed: String,
        #[arg(long, default_value_t = 1)]
        population: usize,
        #[arg(long, default_value_t = 10_000)]
        frame_budget: u32,
    },
    /// Print the default study config as JSON
    DefaultConfig {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Study config source plus per-field overrides.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON study config; omitted fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Comma-separated gap windows, px
    #[arg(long)]
    window_sizes: Option<String>,
    /// Comma-separated obstacle spacings, px
    #[arg(long)]
    pipe_distances: Option<String>,
    /// Comma-separated target scores
    #[arg(long)]
    targets: Option<String>,
    #[arg(long)]
    max_generations: Option<u32>,
    #[arg(long)]
    runs: Option<u32>,
    #[arg(long)]
    population: Option<usize>,
    #[arg(long)]
    frame_budget: Option<u32>,
    #[arg(long)]
    seed: Option<String>,
    /// Worker threads; falls back to FLAPPY_JOBS, then rayon's default
    #[arg(long)]
    jobs: Option<usize>,
    #[arg(long)]
    cell_timeout_secs: Option<u64>,
}

impl ConfigArgs {
    fn resolve(self) -> Result<StudyConfig> {
        let mut config = match &self.config {
            Some(path) => StudyConfig::load(path)?,
            None => StudyConfig::default(),
        };
        if let Some(raw) = &self.window_sizes {
            config.window_sizes = parse_f64_csv(raw, "window size")?;
        }
        if let Some(raw) = &self.pipe_distances {
            config.pipe_distances = parse_f64_csv(raw, "pipe distance")?;
        }
        if let Some(raw) = &self.targets {
            config.target_scores = parse_u32_csv(raw, "target score")?;
        }
        if let Some(value) = self.max_generations {
            config.max_generations = value;
        }
        if let Some(value) = self.runs {
            config.runs_per_config = value;
        }
        if let Some(value) = self.population {
            config.population_size = value;
        }
        if let Some(value) = self.frame_budget {
            config.frame_budget = value;
        }
        if let Some(raw) = &self.seed {
            config.seed = parse_seed(raw)?;
        }
        if let Some(value) = self.cell_timeout_secs {
            config.cell_timeout_secs = Some(value);
        }
        config.jobs = self.jobs.or(config.jobs).or_else(jobs_from_env);
        config.validate().context("invalid study config")?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioPolicy {
    /// Never jumps
    Never,
    /// Jumps every frame
    Always,
    /// Untrained members of the baseline optimizer
    Baseline,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Study { overrides, out_dir } => {
            let config = overrides.resolve()?;
            let out_dir = out_dir
                .unwrap_or_else(|| PathBuf::from(format!("studies/{}", timestamp_suffix())));

            let results = run_study(&config, baseline_optimizer)?;
            let report = write_study(&out_dir, &config, results)?;

            println!("cells={}", report.summary.cell_count);
            println!("failed={}", report.summary.failed_cells);
            println!("aborted={}", report.summary.aborted_cells);
            println!("seed={}", seed_to_hex(config.seed));
            println!(
                "jobs={}",
                config
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("results={}", report.results_csv.display());
            println!("aggregates={}", report.aggregates_csv.display());
            println!("summary={}", report.summary_json.display());
            println!("combinations:");
            for aggregate in &report.summary.aggregates {
                println!(
                    "  W={} D={}  runs={} completed={:.0}% mean_best={:.1} max_best={} mean_generations={:.1}",
                    format_param(aggregate.window_size),
                    format_param(aggregate.pipe_distance),
                    aggregate.runs,
                    aggregate.completion_rate * 100.0,
                    aggregate.mean_best_score,
                    aggregate.max_best_score,
                    aggregate.mean_generations,
                );
            }
        }
        Commands::Cell {
            overrides,
            window,
            distance,
            run,
        } => {
            if run == 0 {
                return Err(anyhow!("--run must be >= 1"));
            }
            let mut config = overrides.resolve()?;
            config.window_sizes = vec![window];
            config.pipe_distances = vec![distance];
            config.validate().context("invalid cell parameters")?;

            let cell = CellSpec {
                index: 0,
                window_size: window,
                pipe_distance: distance,
                run_number: run,
            };
            let result = run_cell(&config, cell, &baseline_optimizer);
            let row = ResultRow::from(&result);
            print!("{}", results_csv(&[row], &config.sorted_targets()));
            println!("status={}", result.status.as_str());
            println!("elapsed_ms={}", result.elapsed_ms);
            if let Some(failure) = &result.failure {
                return Err(anyhow!(
                    "cell failed ({}): {}",
                    failure.kind.as_str(),
                    failure.message
                ));
            }
        }
        Commands::Scenario {
            policy,
            window,
            distance,
            seed,
            population,
            frame_budget,
        } => {
            if population == 0 {
                return Err(anyhow!("--population must be >= 1"));
            }
            let seed = parse_seed(&seed)?;
            let config = StudyConfig {
                frame_budget,
                population_size: population,
                ..StudyConfig::default()
            };
            let settings = config.evaluation_settings(window, distance);

            let outcome = match policy {
                ScenarioPolicy::Never | ScenarioPolicy::Always => {
                    let output = if matches!(policy, ScenarioPolicy::Always) {
                        1.0
                    } else {
                        0.0
                    };
                    let mut members: Vec<Member<ConstantPolicy>> = (0..population as u64)
                        .map(|id| Member::new(id, ConstantPolicy(output)))
                        .collect();
                    evaluate_generation(&mut members, &settings, seed)?
                }
                ScenarioPolicy::Baseline => {
                    let mut optimizer =
                        MutationOptimizer::new(population, seed as u64, config.mutation)?;
                    evaluate_generation(optimizer.population()?, &settings, seed)?
                }
            };

            println!("policy={policy:?}");
            println!("window={}", format_param(window));
            println!("distance={}", format_param(distance));
            println!("seed={}", seed_to_hex(seed));
            println!("frames={}", outcome.frames);
            println!("score={}", outcome.score);
            println!("survivors={}", outcome.survivors);
            println!("deaths={}", outcome.deaths);
            println!("termination={:?}", outcome.termination);
            println!("best_fitness={:.3}", outcome.best_fitness);
        }
        Commands::DefaultConfig { output } => {
            let encoded = serde_json::to_vec_pretty(&StudyConfig::default())?;
            if let Some(path) = output {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, encoded)
                    .with_context(|| format!("failed writing {}", path.display()))?;
                println!("wrote={}", path.display());
            } else {
                println!("{}", String::from_utf8_lossy(&encoded));
            }
        }
    }

    Ok(())
}

fn timestamp_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{now}")
}
