use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::StudyConfig;
use crate::harness::{CellResult, CellStatus};
use crate::util::{format_param, seed_to_hex};

/// Written for targets a cell never reached.
pub const NOT_REACHED: &str = "N/A";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub window_size: f64,
    pub pipe_distance: f64,
    pub run_number: u32,
    pub seed: u32,
    pub seed_hex: String,
    pub max_score_achieved: u32,
    pub total_generations: u32,
    pub completed: bool,
    pub status: CellStatus,
    pub error: Option<String>,
    pub generations_to: BTreeMap<u32, Option<u32>>,
}

impl From<&CellResult> for ResultRow {
    fn from(result: &CellResult) -> Self {
        Self {
            window_size: result.cell.window_size,
            pipe_distance: result.cell.pipe_distance,
            run_number: result.cell.run_number,
            seed: result.seed,
            seed_hex: seed_to_hex(result.seed),
            max_score_achieved: result.record.best_score,
            total_generations: result.record.current_generation,
            completed: result.record.completed,
            status: result.status,
            error: result
                .failure
                .as_ref()
                .map(|failure| format!("{}: {}", failure.kind.as_str(), failure.message)),
            generations_to: result.record.generations_to_reach.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetAggregate {
    pub target: u32,
    pub reached_runs: usize,
    /// Mean over runs that reached the target; `None` when none did.
    pub mean_generations: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinationAggregate {
    pub window_size: f64,
    pub pipe_distance: f64,
    pub runs: usize,
    pub failed_runs: usize,
    pub completed_runs: usize,
    pub completion_rate: f64,
    pub mean_best_score: f64,
    pub max_best_score: u32,
    pub mean_generations: f64,
    pub targets: Vec<TargetAggregate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudySummary {
    pub generated_unix_s: u64,
    pub config: StudyConfig,
    pub cell_count: usize,
    pub failed_cells: usize,
    pub aborted_cells: usize,
    pub aggregates: Vec<CombinationAggregate>,
    pub rows: Vec<ResultRow>,
    pub cells: Vec<CellResult>,
}

#[derive(Clone, Debug)]
pub struct WrittenReport {
    pub results_csv: PathBuf,
    pub aggregates_csv: PathBuf,
    pub summary_json: PathBuf,
    pub summary: StudySummary,
}

pub fn rows(results: &[CellResult]) -> Vec<ResultRow> {
    results.iter().map(ResultRow::from).collect()
}

/// Groups rows by (window, distance) in first-seen order.
pub fn aggregate(rows: &[ResultRow], targets: &[u32]) -> Vec<CombinationAggregate> {
    let mut groups: Vec<((f64, f64), Vec<&ResultRow>)> = Vec::new();
    for row in rows {
        let key = (row.window_size, row.pipe_distance);
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|((window_size, pipe_distance), group)| {
            let runs = group.len();
            let failed_runs = group
                .iter()
                .filter(|row| row.status == CellStatus::Failed)
                .count();
            let completed_runs = group.iter().filter(|row| row.completed).count();
            let sum_best: u64 = group.iter().map(|row| row.max_score_achieved as u64).sum();
            let sum_generations: u64 = group.iter().map(|row| row.total_generations as u64).sum();
            let max_best_score = group
                .iter()
                .map(|row| row.max_score_achieved)
                .max()
                .unwrap_or_default();

            let targets = targets
                .iter()
                .map(|target| {
                    let reached: Vec<u32> = group
                        .iter()
                        .filter_map(|row| row.generations_to.get(target).copied().flatten())
                        .collect();
                    TargetAggregate {
                        target: *target,
                        reached_runs: reached.len(),
                        mean_generations: (!reached.is_empty()).then(|| {
                            reached.iter().map(|g| *g as f64).sum::<f64>() / reached.len() as f64
                        }),
                    }
                })
                .collect();

            CombinationAggregate {
                window_size,
                pipe_distance,
                runs,
                failed_runs,
                completed_runs,
                completion_rate: completed_runs as f64 / runs as f64,
                mean_best_score: sum_best as f64 / runs as f64,
                max_best_score,
                mean_generations: sum_generations as f64 / runs as f64,
                targets,
            }
        })
        .collect()
}

/// Writes `results.csv`, `aggregates.csv` and `summary.json` into `out_dir`.
pub fn write_study(
    out_dir: &Path,
    config: &StudyConfig,
    results: Vec<CellResult>,
) -> Result<WrittenReport> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating {}", out_dir.display()))?;

    let targets = config.sorted_targets();
    let rows = rows(&results);
    let aggregates = aggregate(&rows, &targets);

    let results_csv = out_dir.join("results.csv");
    write_results_csv(&results_csv, &rows, &targets)?;
    let aggregates_csv = out_dir.join("aggregates.csv");
    write_aggregates_csv(&aggregates_csv, &aggregates, &targets)?;

    let summary = StudySummary {
        generated_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        config: config.clone(),
        cell_count: rows.len(),
        failed_cells: rows
            .iter()
            .filter(|row| row.status == CellStatus::Failed)
            .count(),
        aborted_cells: rows
            .iter()
            .filter(|row| row.status == CellStatus::Aborted)
            .count(),
        aggregates,
        rows,
        cells: results,
    };
    let summary_json = out_dir.join("summary.json");
    fs::write(
        &summary_json,
        serde_json::to_vec_pretty(&summary).context("failed to serialize summary json")?,
    )
    .with_context(|| format!("failed writing {}", summary_json.display()))?;

    Ok(WrittenReport {
        results_csv,
        aggregates_csv,
        summary_json,
        summary,
    })
}

pub fn results_csv(rows: &[ResultRow], targets: &[u32]) -> String {
    let mut csv = String::from(
        "window_size,pipe_distance,run_number,seed,max_score_achieved,total_generations,completed,status,error",
    );
    for target in targets {
        csv.push_str(&format!(",generations_to_{target}"));
    }
    csv.push('\n');

    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}",
            format_param(row.window_size),
            format_param(row.pipe_distance),
            row.run_number,
            row.seed_hex,
            row.max_score_achieved,
            row.total_generations,
            row.completed,
            row.status.as_str(),
            csv_field(row.error.as_deref().unwrap_or(""))
        ));
        for target in targets {
            match row.generations_to.get(target).copied().flatten() {
                Some(generation) => csv.push_str(&format!(",{generation}")),
                None => csv.push_str(&format!(",{NOT_REACHED}")),
            }
        }
        csv.push('\n');
    }
    csv
}

fn write_results_csv(path: &Path, rows: &[ResultRow], targets: &[u32]) -> Result<()> {
    fs::write(path, results_csv(rows, targets))
        .with_context(|| format!("failed writing {}", path.display()))
}

fn write_aggregates_csv(path: &Path, rows: &[CombinationAggregate], targets: &[u32]) -> Result<()> {
    let mut csv = String::from(
        "window_size,pipe_distance,runs,failed_runs,completed_runs,completion_rate,mean_best_score,max_best_score,mean_generations",
    );
    for target in targets {
        csv.push_str(&format!(",reached_{target},mean_generations_to_{target}"));
    }
    csv.push('\n');

    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{:.4},{:.2},{},{:.2}",
            format_param(row.window_size),
            format_param(row.pipe_distance),
            row.runs,
            row.failed_runs,
            row.completed_runs,
            row.completion_rate,
            row.mean_best_score,
            row.max_best_score,
            row.mean_generations
        ));
        for target in &row.targets {
            match target.mean_generations {
                Some(mean) => csv.push_str(&format!(",{},{mean:.2}", target.reached_runs)),
                None => csv.push_str(&format!(",{},{NOT_REACHED}", target.reached_runs)),
            }
        }
        csv.push('\n');
    }
    fs::write(path, csv).with_context(|| format!("failed writing {}", path.display()))
}

/// Quotes a free-text field when it would break the row.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(distance: f64, best: u32, reached: &[(u32, Option<u32>)]) -> ResultRow {
        ResultRow {
            window_size: 150.0,
            pipe_distance: distance,
            run_number: 1,
            seed: 1,
            seed_hex: seed_to_hex(1),
            max_score_achieved: best,
            total_generations: 50,
            completed: reached.iter().all(|(_, generation)| generation.is_some()),
            status: CellStatus::Ok,
            error: None,
            generations_to: reached.iter().copied().collect(),
        }
    }

    #[test]
    fn unreached_targets_use_the_sentinel() {
        let rows = vec![row(300.0, 12, &[(10, Some(4)), (20, None)])];
        let csv = results_csv(&rows, &[10, 20]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("window_size,pipe_distance,run_number,seed,max_score_achieved,total_generations,completed,status,error,generations_to_10,generations_to_20")
        );
        assert_eq!(lines.next(), Some("150,300,1,0x00000001,12,50,false,ok,,4,N/A"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn error_text_is_quoted() {
        let mut failed = row(300.0, 0, &[(10, None)]);
        failed.status = CellStatus::Failed;
        failed.error = Some("panic: bad \"thing\", twice".to_string());
        let csv = results_csv(&[failed], &[10]);
        assert!(csv.contains(",failed,\"panic: bad \"\"thing\"\", twice\",N/A"));
    }

    #[test]
    fn aggregates_average_only_reaching_runs() {
        let rows = vec![
            row(300.0, 30, &[(10, Some(4)), (20, Some(9))]),
            row(300.0, 12, &[(10, Some(6)), (20, None)]),
            row(500.0, 2, &[(10, None), (20, None)]),
        ];
        let aggregates = aggregate(&rows, &[10, 20]);
        assert_eq!(aggregates.len(), 2);

        let first = &aggregates[0];
        assert_eq!(first.pipe_distance, 300.0);
        assert_eq!(first.runs, 2);
        assert_eq!(first.completed_runs, 1);
        assert_eq!(first.completion_rate, 0.5);
        assert_eq!(first.mean_best_score, 21.0);
        assert_eq!(first.max_best_score, 30);
        assert_eq!(first.targets[0].mean_generations, Some(5.0));
        assert_eq!(first.targets[1].reached_runs, 1);
        assert_eq!(first.targets[1].mean_generations, Some(9.0));

        let second = &aggregates[1];
        assert_eq!(second.targets[0].reached_runs, 0);
        assert_eq!(second.targets[0].mean_generations, None);
    }
}
