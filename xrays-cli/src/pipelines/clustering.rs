//! Commit clustering engine.
//!
//! K-Means++ over normalized per-commit feature vectors, silhouette-driven
//! auto-k, centroid labeling, and first-half/second-half drift. The engine is
//! deterministic for a given seed; randomness comes from a self-contained
//! xorshift64* generator rather than an external source.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{
    ClusterDrift, ClusterLabel, ClusterSummary, ClusteringReport, CommitFeatures, CommitSummary,
    DriftTrend, FileChange,
};
use crate::pipelines::numeric::euclidean;

const MAX_ITERATIONS: usize = 100;
const DRIFT_STABLE_PCT: f64 = 5.0;

/// Deterministic xorshift64* generator.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform float in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

/// Roll the change stream up into one [`CommitSummary`] per commit, ordered
/// by timestamp then id.
pub fn summarize_commits(changes: &[FileChange]) -> Vec<CommitSummary> {
    struct Acc {
        author: String,
        timestamp: DateTime<Utc>,
        files: rustc_hash::FxHashSet<String>,
        added: u64,
        deleted: u64,
    }

    let mut commits: FxHashMap<String, Acc> = FxHashMap::default();
    for c in changes {
        let acc = commits.entry(c.commit_id.clone()).or_insert(Acc {
            author: c.author.clone(),
            timestamp: c.timestamp,
            files: rustc_hash::FxHashSet::default(),
            added: 0,
            deleted: 0,
        });
        acc.files.insert(c.path.clone());
        acc.added += c.added_lines;
        acc.deleted += c.deleted_lines;
    }

    let mut summaries: Vec<CommitSummary> = commits
        .into_iter()
        .map(|(commit_id, acc)| CommitSummary {
            commit_id,
            author: acc.author,
            timestamp: acc.timestamp,
            file_count: acc.files.len(),
            total_added: acc.added,
            total_deleted: acc.deleted,
            add_ratio: CommitSummary::add_ratio_of(acc.added, acc.deleted),
        })
        .collect();
    summaries.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.commit_id.cmp(&b.commit_id))
    });
    summaries
}

/// Feature vector per commit: [file_count, total_churn, add_ratio].
pub fn extract_commit_features(changes: &[FileChange]) -> Vec<CommitFeatures> {
    summarize_commits(changes)
        .into_iter()
        .map(|s| CommitFeatures {
            file_count: s.file_count,
            total_churn: s.total_added + s.total_deleted,
            add_ratio: s.add_ratio,
            commit_id: s.commit_id,
            timestamp: s.timestamp,
        })
        .collect()
}

/// Min-max normalize each feature dimension to [0, 1].
pub fn normalize_features(features: &[CommitFeatures]) -> Vec<Vec<f64>> {
    let raw: Vec<Vec<f64>> = features
        .iter()
        .map(|f| vec![f.file_count as f64, f.total_churn as f64, f.add_ratio])
        .collect();
    if raw.is_empty() {
        return raw;
    }
    let dims = raw[0].len();
    let mut out = vec![vec![0.0; dims]; raw.len()];
    for d in 0..dims {
        let lo = raw.iter().map(|r| r[d]).fold(f64::INFINITY, f64::min);
        let hi = raw.iter().map(|r| r[d]).fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;
        if range > 0.0 {
            for (i, row) in raw.iter().enumerate() {
                out[i][d] = (row[d] - lo) / range;
            }
        }
    }
    out
}

/// Lloyd's algorithm with K-Means++ seeding. Returns (centroids, assignments).
pub fn kmeans(points: &[Vec<f64>], k: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<usize>) {
    let n = points.len();
    if n == 0 || k == 0 {
        return (Vec::new(), Vec::new());
    }
    let k = k.min(n);
    let dims = points[0].len();

    let mut centroids = seed_plus_plus(points, k, seed);
    let mut assignments = vec![0usize; n];

    for iteration in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let nearest = nearest_centroid(p, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed && iteration > 0 {
            break;
        }
        for (ci, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = points
                .iter()
                .zip(&assignments)
                .filter(|(_, &a)| a == ci)
                .map(|(p, _)| p)
                .collect();
            if members.is_empty() {
                continue; // keep the previous centroid
            }
            for d in 0..dims {
                centroid[d] = members.iter().map(|m| m[d]).sum::<f64>() / members.len() as f64;
            }
        }
    }

    (centroids, assignments)
}

/// K-Means++: first centroid uniform, each next proportional to the squared
/// distance to the nearest chosen one.
fn seed_plus_plus(points: &[Vec<f64>], k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = XorShift64::new(seed);
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.next_below(points.len())].clone());

    while centroids.len() < k {
        let dists_sq: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| {
                        let d = euclidean(p, c);
                        d * d
                    })
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = dists_sq.iter().sum();
        if total <= 0.0 {
            // All remaining points coincide with a centroid.
            centroids.push(points[rng.next_below(points.len())].clone());
            continue;
        }
        let mut target = rng.next_f64() * total;
        let mut chosen = points.len() - 1;
        for (i, d) in dists_sq.iter().enumerate() {
            target -= d;
            if target <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(points[chosen].clone());
    }
    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = euclidean(point, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Mean silhouette coefficient; 0.0 when fewer than two effective clusters.
pub fn silhouette_score(points: &[Vec<f64>], assignments: &[usize]) -> f64 {
    let n = points.len();
    if n == 0 {
        return 0.0;
    }
    let mut clusters: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for (i, &a) in assignments.iter().enumerate() {
        clusters.entry(a).or_default().push(i);
    }
    if clusters.len() <= 1 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = &clusters[&assignments[i]];
        let a_i = if own.len() <= 1 {
            0.0
        } else {
            own.iter()
                .filter(|&&j| j != i)
                .map(|&j| euclidean(&points[i], &points[j]))
                .sum::<f64>()
                / (own.len() - 1) as f64
        };

        let mut b_i = f64::INFINITY;
        for (&c, members) in &clusters {
            if c == assignments[i] {
                continue;
            }
            let mean: f64 = members
                .iter()
                .map(|&j| euclidean(&points[i], &points[j]))
                .sum::<f64>()
                / members.len() as f64;
            b_i = b_i.min(mean);
        }
        if !b_i.is_finite() {
            b_i = 0.0;
        }

        let denom = a_i.max(b_i);
        total += if denom == 0.0 { 0.0 } else { (b_i - a_i) / denom };
    }
    total / n as f64
}

/// Pick k in [k_min, k_max] with the highest silhouette; ties go to the
/// smaller k.
pub fn auto_select_k(points: &[Vec<f64>], config: &AnalysisConfig) -> usize {
    let n = points.len();
    if n <= config.k_min {
        return config.k_min.min(n.max(1));
    }
    let mut best_k = config.k_min;
    let mut best_score = f64::NEG_INFINITY;
    for k in config.k_min..=config.k_max.min(n) {
        let (_, assignments) = kmeans(points, k, config.kmeans_seed);
        let score = silhouette_score(points, &assignments);
        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }
    best_k
}

/// Label a cluster from its centroid position in normalized feature space.
pub fn label_centroid(file_count: f64, churn: f64, add_ratio: f64) -> ClusterLabel {
    if add_ratio < 0.4 && churn >= 0.5 {
        ClusterLabel::Refactoring
    } else if add_ratio > 0.7 && file_count >= 0.5 {
        ClusterLabel::Feature
    } else if file_count < 0.3 && churn < 0.3 && (0.4..=0.7).contains(&add_ratio) {
        ClusterLabel::Bugfix
    } else if churn < 0.3 && file_count < 0.3 {
        ClusterLabel::Config
    } else {
        ClusterLabel::Mixed
    }
}

pub fn analyze(
    changes: &[FileChange],
    repo_path: &str,
    window_days: u32,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
    config: &AnalysisConfig,
) -> ClusteringReport {
    let commits = extract_commit_features(changes);
    let points = normalize_features(&commits);

    if commits.is_empty() {
        return ClusteringReport {
            repo_path: repo_path.to_string(),
            window_days,
            from_date,
            to_date,
            total_commits: 0,
            k: 0,
            silhouette: 0.0,
            clusters: Vec::new(),
            drift: Vec::new(),
        };
    }

    let k = auto_select_k(&points, config);
    let (centroids, assignments) = kmeans(&points, k, config.kmeans_seed);
    let silhouette = silhouette_score(&points, &assignments);

    // Denormalized centroid coordinates for reporting.
    let file_counts: Vec<f64> = commits.iter().map(|c| c.file_count as f64).collect();
    let churns: Vec<f64> = commits.iter().map(|c| c.total_churn as f64).collect();
    let (fc_lo, fc_hi) = bounds(&file_counts);
    let (ch_lo, ch_hi) = bounds(&churns);

    let mut clusters: Vec<ClusterSummary> = centroids
        .iter()
        .enumerate()
        .map(|(id, c)| {
            let size = assignments.iter().filter(|&&a| a == id).count();
            ClusterSummary {
                id,
                size,
                label: label_centroid(c[0], c[1], c[2]),
                centroid_file_count: fc_lo + c[0] * (fc_hi - fc_lo),
                centroid_total_churn: ch_lo + c[1] * (ch_hi - ch_lo),
                centroid_add_ratio: denorm_add_ratio(&commits, c[2]),
            }
        })
        .collect();

    let labels: FxHashMap<usize, ClusterLabel> =
        clusters.iter().map(|c| (c.id, c.label)).collect();
    let midpoint = from_date + (to_date - from_date) / 2;
    let drift = compute_drift(&commits, &assignments, &labels, midpoint);

    clusters.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.id.cmp(&b.id)));
    debug!(k, silhouette, commits = commits.len(), "clustering pipeline done");

    ClusteringReport {
        repo_path: repo_path.to_string(),
        window_days,
        from_date,
        to_date,
        total_commits: commits.len(),
        k,
        silhouette,
        clusters,
        drift,
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if lo.is_finite() {
        (lo, hi)
    } else {
        (0.0, 0.0)
    }
}

fn denorm_add_ratio(commits: &[CommitFeatures], normalized: f64) -> f64 {
    let (lo, hi) = bounds(&commits.iter().map(|c| c.add_ratio).collect::<Vec<_>>());
    lo + normalized * (hi - lo)
}

/// Per-cluster share of commits in each half of the window; |drift| below
/// 5 percentage points reads as stable.
fn compute_drift(
    commits: &[CommitFeatures],
    assignments: &[usize],
    labels: &FxHashMap<usize, ClusterLabel>,
    midpoint: DateTime<Utc>,
) -> Vec<ClusterDrift> {
    let mut first: FxHashMap<usize, usize> = FxHashMap::default();
    let mut second: FxHashMap<usize, usize> = FxHashMap::default();
    for (commit, &cluster) in commits.iter().zip(assignments) {
        if commit.timestamp < midpoint {
            *first.entry(cluster).or_insert(0) += 1;
        } else {
            *second.entry(cluster).or_insert(0) += 1;
        }
    }
    let total_first: usize = first.values().sum();
    let total_second: usize = second.values().sum();

    let mut cluster_ids: Vec<usize> = labels.keys().cloned().collect();
    cluster_ids.sort_unstable();

    let mut rows: Vec<ClusterDrift> = cluster_ids
        .into_iter()
        .map(|c| {
            let f_pct = if total_first > 0 {
                *first.get(&c).unwrap_or(&0) as f64 / total_first as f64 * 100.0
            } else {
                0.0
            };
            let s_pct = if total_second > 0 {
                *second.get(&c).unwrap_or(&0) as f64 / total_second as f64 * 100.0
            } else {
                0.0
            };
            let drift = s_pct - f_pct;
            let trend = if drift.abs() < DRIFT_STABLE_PCT {
                DriftTrend::Stable
            } else if drift > 0.0 {
                DriftTrend::Growing
            } else {
                DriftTrend::Shrinking
            };
            ClusterDrift {
                label: labels[&c],
                first_half_pct: f_pct,
                second_half_pct: s_pct,
                drift,
                trend,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.drift
            .abs()
            .partial_cmp(&a.drift.abs())
            .expect("finite drift")
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn change(commit: &str, path: &str, day: i64, added: u64, deleted: u64) -> FileChange {
        FileChange {
            commit_id: commit.to_string(),
            author: "Alice".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).unwrap(),
            path: path.to_string(),
            added_lines: added,
            deleted_lines: deleted,
        }
    }

    #[test]
    fn commit_features_aggregate_per_commit() {
        let changes = vec![
            change("c1", "a.py", 0, 10, 5),
            change("c1", "b.py", 0, 20, 5),
            change("c2", "a.py", 1, 0, 0),
        ];
        let summaries = summarize_commits(&changes);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].total_added, 30);
        assert_eq!(summaries[0].total_deleted, 10);
        assert_eq!(summaries[0].author, "Alice");

        let features = extract_commit_features(&changes);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].file_count, 2);
        assert_eq!(features[0].total_churn, 40);
        assert!((features[0].add_ratio - 0.75).abs() < 1e-9);
        // Zero churn gets the neutral add ratio.
        assert_eq!(features[1].add_ratio, 0.5);
    }

    #[test]
    fn kmeans_is_reproducible_for_a_seed() {
        let points: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i % 3) as f64, (i / 3) as f64 * 0.1, 0.5])
            .collect();
        let (c1, a1) = kmeans(&points, 3, 42);
        let (c2, a2) = kmeans(&points, 3, 42);
        assert_eq!(c1, c2);
        assert_eq!(a1, a2);
    }

    #[test]
    fn every_point_lands_on_its_nearest_centroid() {
        let points: Vec<Vec<f64>> = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.05, 0.0, 0.0],
            vec![1.0, 1.0, 1.0],
            vec![0.95, 1.0, 1.0],
            vec![0.0, 1.0, 0.5],
            vec![0.05, 0.95, 0.5],
        ];
        let (centroids, assignments) = kmeans(&points, 3, 42);
        for (p, &a) in points.iter().zip(&assignments) {
            assert_eq!(nearest_centroid(p, &centroids), a);
        }
    }

    #[test]
    fn auto_k_finds_three_separated_centers() {
        let mut points = Vec::new();
        for i in 0..8 {
            let jitter = i as f64 * 0.004;
            points.push(vec![0.0 + jitter, 0.0, 0.0]);
            points.push(vec![1.0 - jitter, 1.0, 0.0]);
            points.push(vec![0.5, 1.0 - jitter, 1.0]);
        }
        let config = AnalysisConfig::default();
        assert_eq!(auto_select_k(&points, &config), 3);
    }

    #[test]
    fn auto_k_on_k_distinct_positions_selects_k() {
        let points = vec![
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.5],
            vec![0.0, 1.0, 1.0],
            vec![1.0, 1.0, 0.2],
        ];
        let config = AnalysisConfig::default();
        assert_eq!(auto_select_k(&points, &config), 4);
    }

    #[test]
    fn centroid_labels_follow_the_rules() {
        assert_eq!(label_centroid(0.2, 0.9, 0.1), ClusterLabel::Refactoring);
        assert_eq!(label_centroid(0.9, 0.6, 0.9), ClusterLabel::Feature);
        assert_eq!(label_centroid(0.1, 0.1, 0.5), ClusterLabel::Bugfix);
        assert_eq!(label_centroid(0.1, 0.1, 0.2), ClusterLabel::Config);
        assert_eq!(label_centroid(0.5, 0.5, 0.5), ClusterLabel::Mixed);
    }

    #[test]
    fn drift_splits_window_at_midpoint() {
        let mut changes = Vec::new();
        // First half: small single-file commits. Second half: wide commits.
        for i in 0..6 {
            changes.push(change(&format!("s{i}"), "a.py", i, 2, 0));
        }
        for i in 0..6 {
            for f in 0..5 {
                changes.push(change(
                    &format!("w{i}"),
                    &format!("f{f}.py"),
                    20 + i,
                    40,
                    10,
                ));
            }
        }
        let from = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let to = Utc.timestamp_opt(1_700_000_000 + 26 * 86_400, 0).unwrap();
        let report = analyze(&changes, "/repo", 26, from, to, &AnalysisConfig::default());

        assert!(report.k >= 2);
        assert!(!report.drift.is_empty());
        let growing = report
            .drift
            .iter()
            .any(|d| matches!(d.trend, DriftTrend::Growing));
        let shrinking = report
            .drift
            .iter()
            .any(|d| matches!(d.trend, DriftTrend::Shrinking));
        assert!(growing && shrinking);
    }
}
