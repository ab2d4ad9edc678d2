//! Knowledge distribution pipeline.
//!
//! Author entropy per file (KDI), knowledge islands, and the repo-level
//! Developer Risk Index in both its Gini and minimum-authors forms.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{AuthorContribution, FileChange, FileKnowledge, KnowledgeReport};
use crate::pipelines::numeric::{decay_weight, gini, shannon_entropy};

struct AuthorAccumulator {
    churn: u64,
    weighted_churn: f64,
}

pub fn analyze(
    changes: &[FileChange],
    repo_path: &str,
    window_days: u32,
    from_date: DateTime<Utc>,
    to_date: DateTime<Utc>,
    config: &AnalysisConfig,
) -> KnowledgeReport {
    // path -> author -> contribution
    let mut per_file: FxHashMap<String, FxHashMap<String, AuthorAccumulator>> =
        FxHashMap::default();
    let mut per_author: FxHashMap<String, f64> = FxHashMap::default();
    let mut per_author_raw: FxHashMap<String, u64> = FxHashMap::default();
    let mut all_commits: FxHashSet<&str> = FxHashSet::default();

    for c in changes {
        all_commits.insert(&c.commit_id);
        let age_days = (to_date - c.timestamp).num_seconds() as f64 / 86_400.0;
        let weight = decay_weight(age_days, config.knowledge_half_life_days);
        let weighted = c.churn() as f64 * weight;

        let entry = per_file
            .entry(c.path.clone())
            .or_default()
            .entry(c.author.clone())
            .or_insert(AuthorAccumulator {
                churn: 0,
                weighted_churn: 0.0,
            });
        entry.churn += c.churn();
        entry.weighted_churn += weighted;

        *per_author.entry(c.author.clone()).or_insert(0.0) += weighted;
        *per_author_raw.entry(c.author.clone()).or_insert(0) += c.churn();
    }

    let mut files: Vec<FileKnowledge> = per_file
        .into_iter()
        .map(|(path, authors)| file_knowledge(path, authors, config))
        .collect();

    files.sort_by(|a, b| {
        b.kdi
            .partial_cmp(&a.kdi)
            .expect("finite kdi")
            .then_with(|| a.path.cmp(&b.path))
    });

    let island_count = files.iter().filter(|f| f.is_island).count();
    let author_totals: Vec<f64> = per_author.values().cloned().collect();
    let dri = gini(&author_totals);
    let dri_min_authors = min_authors_for_half(&per_author_raw);

    debug!(
        files = files.len(),
        authors = per_author.len(),
        islands = island_count,
        "knowledge pipeline done"
    );

    KnowledgeReport {
        repo_path: repo_path.to_string(),
        window_days,
        from_date,
        to_date,
        total_commits: all_commits.len(),
        dri,
        dri_min_authors,
        island_count,
        files,
    }
}

fn file_knowledge(
    path: String,
    authors: FxHashMap<String, AuthorAccumulator>,
    config: &AnalysisConfig,
) -> FileKnowledge {
    let mut contributions: Vec<AuthorContribution> = authors
        .into_iter()
        .map(|(author, acc)| AuthorContribution {
            author,
            churn: acc.churn,
            weighted_churn: acc.weighted_churn,
        })
        .collect();
    contributions.sort_by(|a, b| {
        b.weighted_churn
            .partial_cmp(&a.weighted_churn)
            .expect("finite churn")
            .then_with(|| a.author.cmp(&b.author))
    });

    let total: f64 = contributions.iter().map(|a| a.weighted_churn).sum();
    let shares: Vec<f64> = if total > 0.0 {
        contributions
            .iter()
            .map(|a| a.weighted_churn / total)
            .collect()
    } else {
        // All-zero churn: treat contributions as even.
        let n = contributions.len().max(1) as f64;
        vec![1.0 / n; contributions.len()]
    };

    let n_authors = contributions.len();
    let kdi = if n_authors >= 2 {
        1.0 - shannon_entropy(&shares) / (n_authors as f64).log2()
    } else {
        1.0
    };

    let primary_author = contributions
        .first()
        .map(|a| a.author.clone())
        .unwrap_or_default();
    let primary_pct = shares.first().copied().unwrap_or(0.0);

    FileKnowledge {
        path,
        primary_author,
        primary_pct,
        kdi,
        is_island: primary_pct > config.island_threshold,
        authors: contributions,
    }
}

/// Legacy DRI: the minimum number of authors whose combined churn reaches
/// half of the repository's total.
fn min_authors_for_half(per_author: &FxHashMap<String, u64>) -> usize {
    let total: u64 = per_author.values().sum();
    if total == 0 {
        return 0;
    }
    let mut churns: Vec<u64> = per_author.values().cloned().collect();
    churns.sort_unstable_by(|a, b| b.cmp(a));
    let mut cumulative = 0u64;
    for (i, churn) in churns.iter().enumerate() {
        cumulative += churn;
        if cumulative as f64 >= total as f64 / 2.0 {
            return i + 1;
        }
    }
    churns.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn change(commit: &str, author: &str, path: &str, added: u64) -> FileChange {
        FileChange {
            commit_id: commit.to_string(),
            author: author.to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            path: path.to_string(),
            added_lines: added,
            deleted_lines: 0,
        }
    }

    fn run(changes: &[FileChange]) -> KnowledgeReport {
        let from = Utc.timestamp_opt(1_699_900_000, 0).unwrap();
        let to = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        analyze(changes, "/repo", 90, from, to, &AnalysisConfig::default())
    }

    /// Alice 900 lines vs Bob 100 lines: a knowledge island with the
    /// entropy-derived KDI of a 0.9 / 0.1 split.
    #[test]
    fn dominant_author_forms_island() {
        let report = run(&[
            change("c1", "Alice", "x.py", 900),
            change("c2", "Bob", "x.py", 100),
        ]);

        let x = &report.files[0];
        assert!((x.primary_pct - 0.9).abs() < 1e-9);
        assert_eq!(x.primary_author, "Alice");
        assert!(x.is_island);
        assert!((x.kdi - 0.531).abs() < 0.001);
        assert_eq!(report.island_count, 1);
    }

    #[test]
    fn single_author_kdi_is_one() {
        let report = run(&[change("c1", "Alice", "solo.py", 10)]);
        assert_eq!(report.files[0].kdi, 1.0);
        assert_eq!(report.files[0].author_count(), 1);
    }

    #[test]
    fn equal_churn_kdi_is_zero() {
        let report = run(&[
            change("c1", "Alice", "x.py", 50),
            change("c2", "Bob", "x.py", 50),
            change("c3", "Carol", "x.py", 50),
        ]);
        assert!(report.files[0].kdi.abs() < 1e-12);
        assert!(!report.files[0].is_island);
    }

    #[test]
    fn dri_reflects_author_imbalance() {
        let balanced = run(&[
            change("c1", "Alice", "a.py", 100),
            change("c2", "Bob", "b.py", 100),
        ]);
        assert!(balanced.dri.abs() < 1e-12);
        assert_eq!(balanced.dri_min_authors, 1);

        let skewed = run(&[
            change("c1", "Alice", "a.py", 990),
            change("c2", "Bob", "b.py", 5),
            change("c3", "Carol", "c.py", 5),
        ]);
        assert!(skewed.dri > 0.5);
        assert_eq!(skewed.dri_min_authors, 1);
    }

    #[test]
    fn empty_input_degrades_to_zero_report() {
        let report = run(&[]);
        assert!(report.files.is_empty());
        assert_eq!(report.dri, 0.0);
        assert_eq!(report.dri_min_authors, 0);
        assert_eq!(report.island_count, 0);
    }
}
