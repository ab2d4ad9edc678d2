//! Temporal coupling + PAIN pipeline.
//!
//! Co-change Jaccard over commit sets, lift-filtered pairs, and the per-file
//! PAIN composite (Size x Distance x Volatility).

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::models::{CouplingPair, CouplingReport, FileChange, FilePain};
use crate::pipelines::numeric::min_max;

const LIFT_TOLERANCE: f64 = 1e-9;

pub fn analyze(
    changes: &[FileChange],
    repo_path: &str,
    window_days: u32,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
) -> CouplingReport {
    // Intern paths; commits reference files through the interned id.
    let mut path_ids: FxHashMap<&str, usize> = FxHashMap::default();
    let mut paths: Vec<&str> = Vec::new();
    let mut commit_files: FxHashMap<&str, FxHashSet<usize>> = FxHashMap::default();
    let mut churn: FxHashMap<usize, u64> = FxHashMap::default();

    for c in changes {
        let id = *path_ids.entry(c.path.as_str()).or_insert_with(|| {
            paths.push(c.path.as_str());
            paths.len() - 1
        });
        commit_files.entry(&c.commit_id).or_default().insert(id);
        *churn.entry(id).or_insert(0) += c.churn();
    }

    let total_commits = commit_files.len();
    let mut commits_per_file: Vec<usize> = vec![0; paths.len()];
    let mut shared: FxHashMap<(usize, usize), usize> = FxHashMap::default();

    for files in commit_files.values() {
        let mut ids: Vec<usize> = files.iter().cloned().collect();
        ids.sort_unstable();
        for &id in &ids {
            commits_per_file[id] += 1;
        }
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                *shared.entry((ids[i], ids[j])).or_insert(0) += 1;
            }
        }
    }

    let mut pairs: Vec<CouplingPair> = shared
        .into_iter()
        .filter(|&(_, count)| count >= 2)
        .filter_map(|((a, b), count)| {
            let union = commits_per_file[a] + commits_per_file[b] - count;
            let lift = if total_commits > 0 {
                count as f64 * total_commits as f64
                    / (commits_per_file[a] as f64 * commits_per_file[b] as f64)
            } else {
                0.0
            };
            if lift + LIFT_TOLERANCE < 1.0 {
                return None;
            }
            let (file_a, file_b) = if paths[a] < paths[b] {
                (paths[a], paths[b])
            } else {
                (paths[b], paths[a])
            };
            Some(CouplingPair {
                file_a: file_a.to_string(),
                file_b: file_b.to_string(),
                shared_commits: count,
                union_commits: union,
                jaccard: count as f64 / union as f64,
                support: count as f64 / total_commits as f64,
                lift,
            })
        })
        .collect();

    pairs.sort_by(|a, b| {
        b.jaccard
            .partial_cmp(&a.jaccard)
            .expect("finite jaccard")
            .then_with(|| a.file_a.cmp(&b.file_a))
            .then_with(|| a.file_b.cmp(&b.file_b))
    });

    let file_pain = pain_scores(&paths, &churn, &commits_per_file, &pairs);
    debug!(pairs = pairs.len(), files = paths.len(), "coupling pipeline done");

    CouplingReport {
        repo_path: repo_path.to_string(),
        window_days,
        from_date,
        to_date,
        total_commits,
        pairs,
        file_pain,
    }
}

/// PAIN = norm(Size) * norm(Distance) * norm(Volatility), where Distance is
/// the mean Jaccard over kept pairs involving the file (0 if isolated).
fn pain_scores(
    paths: &[&str],
    churn: &FxHashMap<usize, u64>,
    commits_per_file: &[usize],
    pairs: &[CouplingPair],
) -> Vec<FilePain> {
    if paths.is_empty() {
        return Vec::new();
    }

    let mut distance_sum: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
    for p in pairs {
        let a = distance_sum.entry(p.file_a.as_str()).or_insert((0.0, 0));
        a.0 += p.jaccard;
        a.1 += 1;
        let b = distance_sum.entry(p.file_b.as_str()).or_insert((0.0, 0));
        b.0 += p.jaccard;
        b.1 += 1;
    }

    let mut order: Vec<usize> = (0..paths.len()).collect();
    order.sort_by(|&a, &b| paths[a].cmp(paths[b]));

    let sizes: Vec<f64> = order
        .iter()
        .map(|&id| churn.get(&id).copied().unwrap_or(0) as f64)
        .collect();
    let volatilities: Vec<f64> = order.iter().map(|&id| commits_per_file[id] as f64).collect();
    let distances: Vec<f64> = order
        .iter()
        .map(|&id| {
            distance_sum
                .get(paths[id])
                .map(|(sum, n)| sum / *n as f64)
                .unwrap_or(0.0)
        })
        .collect();

    let size_norm = min_max(&sizes);
    let vol_norm = min_max(&volatilities);
    let dist_norm = min_max(&distances);

    let mut rows: Vec<FilePain> = order
        .iter()
        .enumerate()
        .map(|(i, &id)| FilePain {
            path: paths[id].to_string(),
            size_norm: size_norm[i],
            distance_norm: dist_norm[i],
            volatility_norm: vol_norm[i],
            pain: size_norm[i] * dist_norm[i] * vol_norm[i],
        })
        .collect();

    rows.sort_by(|a, b| {
        b.pain
            .partial_cmp(&a.pain)
            .expect("finite pain")
            .then_with(|| a.path.cmp(&b.path))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn change(commit: &str, path: &str, added: u64) -> FileChange {
        FileChange {
            commit_id: commit.to_string(),
            author: "Alice".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            path: path.to_string(),
            added_lines: added,
            deleted_lines: 0,
        }
    }

    fn run(changes: &[FileChange]) -> CouplingReport {
        let from = Utc.timestamp_opt(1_699_900_000, 0).unwrap();
        let to = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        analyze(changes, "/repo", 90, from, to)
    }

    /// Five commits touching both m.py and n.py plus one touching only
    /// m.py: shared 5, union 6, jaccard 5/6.
    #[test]
    fn co_changed_pair_survives() {
        let mut changes = Vec::new();
        for i in 0..5 {
            changes.push(change(&format!("c{i}"), "m.py", 10));
            changes.push(change(&format!("c{i}"), "n.py", 10));
        }
        changes.push(change("c-solo", "m.py", 10));

        let report = run(&changes);
        assert_eq!(report.total_commits, 6);
        assert_eq!(report.pairs.len(), 1);
        let pair = &report.pairs[0];
        assert_eq!((pair.file_a.as_str(), pair.file_b.as_str()), ("m.py", "n.py"));
        assert_eq!(pair.shared_commits, 5);
        assert_eq!(pair.union_commits, 6);
        assert!((pair.jaccard - 0.8333).abs() < 0.001);
        assert!((pair.support - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn pairs_are_canonical_and_irreflexive() {
        let changes = vec![
            change("c1", "z.py", 5),
            change("c1", "a.py", 5),
            change("c2", "z.py", 5),
            change("c2", "a.py", 5),
        ];
        let report = run(&changes);
        for p in &report.pairs {
            assert!(p.file_a < p.file_b);
        }
    }

    #[test]
    fn single_shared_commit_is_filtered() {
        let changes = vec![
            change("c1", "a.py", 5),
            change("c1", "b.py", 5),
            change("c2", "a.py", 5),
            change("c3", "b.py", 5),
        ];
        let report = run(&changes);
        assert!(report.pairs.is_empty());
    }

    #[test]
    fn negatively_associated_pair_is_filtered_by_lift() {
        // a and b co-occur once out of many independent commits each:
        // shared 2, but far below independence.
        let mut changes = Vec::new();
        for i in 0..10 {
            changes.push(change(&format!("a{i}"), "a.py", 5));
        }
        for i in 0..10 {
            changes.push(change(&format!("b{i}"), "b.py", 5));
        }
        changes.push(change("ab1", "a.py", 5));
        changes.push(change("ab1", "b.py", 5));
        changes.push(change("ab2", "a.py", 5));
        changes.push(change("ab2", "b.py", 5));
        // lift = 2 * 22 / (12 * 12) = 0.31 < 1
        let report = run(&changes);
        assert!(report.pairs.is_empty());
    }

    #[test]
    fn pain_is_product_of_normalized_parts() {
        let mut changes = Vec::new();
        // hub.py: big, volatile, coupled with both others
        for i in 0..4 {
            changes.push(change(&format!("c{i}"), "hub.py", 50));
            changes.push(change(&format!("c{i}"), "spoke.py", 5));
        }
        changes.push(change("c9", "leaf.py", 1));

        let report = run(&changes);
        for row in &report.file_pain {
            assert!(row.pain >= 0.0 && row.pain <= 1.0);
            let product = row.size_norm * row.distance_norm * row.volatility_norm;
            assert!((row.pain - product).abs() < 1e-12);
        }
        assert_eq!(report.file_pain[0].path, "hub.py");
        // Isolated file has zero coupling distance.
        let leaf = report.file_pain.iter().find(|r| r.path == "leaf.py").unwrap();
        assert_eq!(leaf.distance_norm, 0.0);
        assert_eq!(leaf.pain, 0.0);
    }

    #[test]
    fn empty_input_degrades_to_zero_report() {
        let report = run(&[]);
        assert!(report.pairs.is_empty());
        assert!(report.file_pain.is_empty());
        assert_eq!(report.total_commits, 0);
    }
}
