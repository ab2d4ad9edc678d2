//! Hotspot / churn pipeline.
//!
//! Frequency and churn per file, temporally decayed hotspot scores, rework
//! ratios, and the churn Pareto distribution.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{FileChange, FileMetrics, HotspotReport, ParetoBucket};
use crate::pipelines::numeric::{decay_weight, min_max};

const PARETO_THRESHOLDS: [u8; 3] = [50, 80, 90];

struct FileAccumulator {
    commits: FxHashSet<String>,
    churn: u64,
    weighted_churn: f64,
    weighted_frequency: f64,
    timestamps: Vec<DateTime<Utc>>,
}

impl FileAccumulator {
    fn new() -> Self {
        Self {
            commits: FxHashSet::default(),
            churn: 0,
            weighted_churn: 0.0,
            weighted_frequency: 0.0,
            timestamps: Vec::new(),
        }
    }
}

pub fn analyze(
    changes: &[FileChange],
    repo_path: &str,
    window_days: u32,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
    config: &AnalysisConfig,
) -> HotspotReport {
    let mut acc: FxHashMap<String, FileAccumulator> = FxHashMap::default();
    let mut all_commits: FxHashSet<&str> = FxHashSet::default();

    for c in changes {
        all_commits.insert(&c.commit_id);
        let entry = acc
            .entry(c.path.clone())
            .or_insert_with(FileAccumulator::new);
        let age_days = (to_date - c.timestamp).num_seconds() as f64 / 86_400.0;
        let weight = decay_weight(age_days, config.churn_half_life_days);
        entry.churn += c.churn();
        entry.weighted_churn += c.churn() as f64 * weight;
        if entry.commits.insert(c.commit_id.clone()) {
            entry.weighted_frequency += weight;
            entry.timestamps.push(c.timestamp);
        }
    }

    // Zero-churn files carry no hotspot signal.
    acc.retain(|_, a| a.churn > 0);

    let mut paths: Vec<String> = acc.keys().cloned().collect();
    paths.sort();

    let weighted_churns: Vec<f64> = paths.iter().map(|p| acc[p].weighted_churn).collect();
    let weighted_freqs: Vec<f64> = paths.iter().map(|p| acc[p].weighted_frequency).collect();
    let churn_norm = min_max(&weighted_churns);
    let freq_norm = min_max(&weighted_freqs);

    let mut files: Vec<FileMetrics> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let a = &acc[path];
            FileMetrics {
                path: path.clone(),
                frequency: a.commits.len() as u64,
                churn: a.churn,
                hotspot_score: churn_norm[i] * freq_norm[i],
                rework_ratio: rework_ratio(&a.timestamps, config.rework_window_days),
            }
        })
        .collect();

    files.sort_by(|a, b| {
        b.hotspot_score
            .partial_cmp(&a.hotspot_score)
            .expect("finite score")
            .then_with(|| a.path.cmp(&b.path))
    });

    let pareto = pareto_buckets(&files);
    debug!(files = files.len(), commits = all_commits.len(), "hotspot pipeline done");

    HotspotReport {
        repo_path: repo_path.to_string(),
        window_days,
        from_date,
        to_date,
        total_commits: all_commits.len(),
        files,
        pareto,
    }
}

/// Fraction of a file's commits that lie within the rework window of another
/// commit on the same path. Falls back to `(f - 1) / f` when the stream
/// carries no usable timestamps.
fn rework_ratio(timestamps: &[DateTime<Utc>], window_days: f64) -> f64 {
    let f = timestamps.len();
    if f <= 1 {
        return 0.0;
    }
    if timestamps.iter().all(|t| t.timestamp() == 0) {
        return (f as f64 - 1.0) / f as f64;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    let window_secs = (window_days * 86_400.0) as i64;
    let mut rework = 0usize;
    for (i, t) in sorted.iter().enumerate() {
        let near_prev = i > 0 && (*t - sorted[i - 1]).num_seconds() <= window_secs;
        let near_next =
            i + 1 < sorted.len() && (sorted[i + 1] - *t).num_seconds() <= window_secs;
        if near_prev || near_next {
            rework += 1;
        }
    }
    rework as f64 / f as f64
}

/// Incremental file counts needed to cover 50 / 80 / 90 % of total churn.
pub fn pareto_buckets(files: &[FileMetrics]) -> Vec<ParetoBucket> {
    let total: u64 = files.iter().map(|f| f.churn).sum();
    if total == 0 {
        return Vec::new();
    }
    let mut by_churn: Vec<&FileMetrics> = files.iter().collect();
    by_churn.sort_by(|a, b| b.churn.cmp(&a.churn).then_with(|| a.path.cmp(&b.path)));

    let mut buckets = Vec::new();
    let mut cumulative: u64 = 0;
    let mut idx = 0usize;
    let mut prev_count = 0usize;
    for &threshold in &PARETO_THRESHOLDS {
        let target = total as f64 * threshold as f64 / 100.0;
        while idx < by_churn.len() && (cumulative as f64) < target {
            cumulative += by_churn[idx].churn;
            idx += 1;
        }
        buckets.push(ParetoBucket {
            threshold_pct: threshold,
            file_count: idx - prev_count,
            cumulative_count: idx,
        });
        prev_count = idx;
    }
    buckets
}
