//! Developer-experience overlay.
//!
//! A composite over the hotspot, knowledge, coupling, clustering, and
//! complexity reports: throughput, feedback, focus, per-file cognitive load,
//! and the weighted DX score. All weights are surfaced on the report.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{
    ClusterLabel, ClusteringReport, ComplexityReport, CouplingReport, DXReport,
    FileCognitiveLoad, HotspotReport, KnowledgeReport,
};
use crate::pipelines::numeric::min_max;

/// Cluster-label weights for throughput; the divisor is the maximum weight.
fn label_weight(label: ClusterLabel) -> f64 {
    match label {
        ClusterLabel::Feature => 1.0,
        ClusterLabel::Refactoring => 0.8,
        ClusterLabel::Bugfix => 0.5,
        ClusterLabel::Mixed => 0.5,
        ClusterLabel::Config => 0.3,
    }
}

const MAX_LABEL_WEIGHT: f64 = 1.0;

const COMPLEXITY_WEIGHT: f64 = 0.35;
const COORDINATION_WEIGHT: f64 = 0.25;
const KNOWLEDGE_WEIGHT: f64 = 0.25;
const CHANGE_RATE_WEIGHT: f64 = 0.15;

#[allow(clippy::too_many_arguments)]
pub fn analyze(
    hotspots: &HotspotReport,
    knowledge: &KnowledgeReport,
    coupling: &CouplingReport,
    clustering: &ClusteringReport,
    complexity: &ComplexityReport,
    densities: &FxHashMap<String, f64>,
    config: &AnalysisConfig,
) -> DXReport {
    let throughput = compute_throughput(clustering);
    let feedback = compute_feedback(hotspots, densities);
    let focus = compute_focus(clustering);
    let files = cognitive_load_per_file(hotspots, knowledge, coupling, complexity);
    let cognitive_load = if files.is_empty() {
        0.0
    } else {
        files.iter().map(|f| f.composite_load).sum::<f64>() / files.len() as f64
    };

    let w = config.dx_weights;
    let dx_score =
        w[0] * throughput + w[1] * feedback + w[2] * focus + w[3] * (1.0 - cognitive_load);

    debug!(throughput, feedback, focus, cognitive_load, dx_score, "dx overlay done");

    DXReport {
        repo_path: hotspots.repo_path.clone(),
        window_days: hotspots.window_days,
        from_date: hotspots.from_date,
        to_date: hotspots.to_date,
        total_commits: hotspots.total_commits,
        total_files: files.len(),
        throughput,
        feedback,
        focus,
        cognitive_load,
        dx_score,
        weights: w,
        files,
    }
}

/// Weighted share of commit clusters, bounded to [0, 1] by the maximum
/// label weight.
fn compute_throughput(clustering: &ClusteringReport) -> f64 {
    let total: usize = clustering.clusters.iter().map(|c| c.size).sum();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = clustering
        .clusters
        .iter()
        .map(|c| label_weight(c.label) * c.size as f64 / total as f64)
        .sum();
    (weighted / MAX_LABEL_WEIGHT).clamp(0.0, 1.0)
}

/// mean(density) * (1 - mean(rework)): fast iteration with little churn-back.
fn compute_feedback(hotspots: &HotspotReport, densities: &FxHashMap<String, f64>) -> f64 {
    if hotspots.files.is_empty() {
        return 0.0;
    }
    let density_mean: f64 = hotspots
        .files
        .iter()
        .map(|f| densities.get(&f.path).copied().unwrap_or(0.0))
        .sum::<f64>()
        / hotspots.files.len() as f64;
    let rework_mean: f64 = hotspots
        .files
        .iter()
        .map(|f| f.rework_ratio)
        .sum::<f64>()
        / hotspots.files.len() as f64;
    (density_mean * (1.0 - rework_mean)).clamp(0.0, 1.0)
}

/// Feature share of non-mixed commits; neutral 0.5 when nothing qualifies.
fn compute_focus(clustering: &ClusteringReport) -> f64 {
    let mut feature = 0usize;
    let mut denominator = 0usize;
    for c in &clustering.clusters {
        if matches!(c.label, ClusterLabel::Mixed) {
            continue;
        }
        denominator += c.size;
        if matches!(c.label, ClusterLabel::Feature) {
            feature += c.size;
        }
    }
    if denominator == 0 {
        0.5
    } else {
        feature as f64 / denominator as f64
    }
}

/// 0.35 complexity + 0.25 coordination + 0.25 knowledge + 0.15 change rate,
/// each min-max-normalized over the union of files the four sources mention.
fn cognitive_load_per_file(
    hotspots: &HotspotReport,
    knowledge: &KnowledgeReport,
    coupling: &CouplingReport,
    complexity: &ComplexityReport,
) -> Vec<FileCognitiveLoad> {
    let mut paths: Vec<String> = Vec::new();
    let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
    for p in hotspots
        .files
        .iter()
        .map(|f| f.path.as_str())
        .chain(knowledge.files.iter().map(|f| f.path.as_str()))
        .chain(coupling.file_pain.iter().map(|f| f.path.as_str()))
        .chain(complexity.functions.iter().map(|f| f.file.as_str()))
    {
        if seen.insert(p, ()).is_none() {
            paths.push(p.to_string());
        }
    }
    if paths.is_empty() {
        return Vec::new();
    }
    paths.sort();

    // Per-file mean cyclomatic complexity.
    let mut cx_sum: FxHashMap<&str, (u64, usize)> = FxHashMap::default();
    for f in &complexity.functions {
        let e = cx_sum.entry(f.file.as_str()).or_insert((0, 0));
        e.0 += f.cyclomatic;
        e.1 += 1;
    }
    let hot_map: FxHashMap<&str, _> = hotspots
        .files
        .iter()
        .map(|f| (f.path.as_str(), f))
        .collect();
    let know_map: FxHashMap<&str, f64> = knowledge
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.kdi))
        .collect();
    let pain_map: FxHashMap<&str, f64> = coupling
        .file_pain
        .iter()
        .map(|f| (f.path.as_str(), f.distance_norm))
        .collect();

    let raw_complexity: Vec<f64> = paths
        .iter()
        .map(|p| {
            cx_sum
                .get(p.as_str())
                .map(|(sum, n)| *sum as f64 / *n as f64)
                .unwrap_or(0.0)
        })
        .collect();
    let raw_coordination: Vec<f64> = paths
        .iter()
        .map(|p| pain_map.get(p.as_str()).copied().unwrap_or(0.0))
        .collect();
    let raw_knowledge: Vec<f64> = paths
        .iter()
        .map(|p| know_map.get(p.as_str()).copied().unwrap_or(0.0))
        .collect();
    let raw_change_rate: Vec<f64> = paths
        .iter()
        .map(|p| {
            hot_map
                .get(p.as_str())
                .map(|f| f.frequency as f64)
                .unwrap_or(0.0)
        })
        .collect();

    let cx = min_max(&raw_complexity);
    let co = min_max(&raw_coordination);
    let kn = min_max(&raw_knowledge);
    let cr = min_max(&raw_change_rate);

    let mut rows: Vec<FileCognitiveLoad> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| FileCognitiveLoad {
            path: path.clone(),
            complexity_score: cx[i],
            coordination_score: co[i],
            knowledge_score: kn[i],
            change_rate_score: cr[i],
            composite_load: COMPLEXITY_WEIGHT * cx[i]
                + COORDINATION_WEIGHT * co[i]
                + KNOWLEDGE_WEIGHT * kn[i]
                + CHANGE_RATE_WEIGHT * cr[i],
        })
        .collect();
    rows.sort_by(|a, b| {
        b.composite_load
            .partial_cmp(&a.composite_load)
            .expect("finite load")
            .then_with(|| a.path.cmp(&b.path))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterSummary, FileMetrics, FunctionComplexity};
    use chrono::{TimeZone, Utc};

    fn empty_reports() -> (HotspotReport, KnowledgeReport, CouplingReport, ClusteringReport, ComplexityReport)
    {
        let from = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let to = Utc.timestamp_opt(1_700_100_000, 0).unwrap();
        (
            HotspotReport {
                repo_path: "/repo".into(),
                window_days: 90,
                from_date: from,
                to_date: to,
                total_commits: 0,
                files: vec![],
                pareto: vec![],
            },
            KnowledgeReport {
                repo_path: "/repo".into(),
                window_days: 90,
                from_date: from,
                to_date: to,
                total_commits: 0,
                dri: 0.0,
                dri_min_authors: 0,
                island_count: 0,
                files: vec![],
            },
            CouplingReport {
                repo_path: "/repo".into(),
                window_days: 90,
                from_date: from,
                to_date: to,
                total_commits: 0,
                pairs: vec![],
                file_pain: vec![],
            },
            ClusteringReport {
                repo_path: "/repo".into(),
                window_days: 90,
                from_date: from,
                to_date: to,
                total_commits: 0,
                k: 0,
                silhouette: 0.0,
                clusters: vec![],
                drift: vec![],
            },
            ComplexityReport {
                repo_path: "/repo".into(),
                tree_ref: None,
                total_files: 0,
                total_functions: 0,
                avg_complexity: 0.0,
                max_complexity: 0,
                high_complexity_count: 0,
                complexity_threshold: 10,
                functions: vec![],
            },
        )
    }

    fn cluster(id: usize, size: usize, label: ClusterLabel) -> ClusterSummary {
        ClusterSummary {
            id,
            size,
            label,
            centroid_file_count: 1.0,
            centroid_total_churn: 10.0,
            centroid_add_ratio: 0.5,
        }
    }

    #[test]
    fn throughput_is_weighted_cluster_share() {
        let (_, _, _, mut clustering, _) = empty_reports();
        clustering.clusters = vec![
            cluster(0, 6, ClusterLabel::Feature),
            cluster(1, 4, ClusterLabel::Config),
        ];
        // 0.6 * 1.0 + 0.4 * 0.3 = 0.72
        assert!((compute_throughput(&clustering) - 0.72).abs() < 1e-9);
    }

    #[test]
    fn focus_excludes_mixed_and_defaults_to_neutral() {
        let (_, _, _, mut clustering, _) = empty_reports();
        clustering.clusters = vec![
            cluster(0, 3, ClusterLabel::Feature),
            cluster(1, 3, ClusterLabel::Bugfix),
            cluster(2, 10, ClusterLabel::Mixed),
        ];
        assert!((compute_focus(&clustering) - 0.5).abs() < 1e-9);

        clustering.clusters = vec![cluster(0, 10, ClusterLabel::Mixed)];
        assert_eq!(compute_focus(&clustering), 0.5);
    }

    #[test]
    fn cognitive_load_uses_documented_weights() {
        let (mut hot, mut know, coup, _, mut cx) = empty_reports();
        hot.files = vec![
            FileMetrics {
                path: "a.py".into(),
                frequency: 10,
                churn: 100,
                hotspot_score: 1.0,
                rework_ratio: 0.2,
            },
            FileMetrics {
                path: "b.py".into(),
                frequency: 1,
                churn: 5,
                hotspot_score: 0.0,
                rework_ratio: 0.0,
            },
        ];
        know.files = vec![crate::models::FileKnowledge {
            path: "a.py".into(),
            authors: vec![],
            primary_author: "Alice".into(),
            primary_pct: 1.0,
            kdi: 1.0,
            is_island: true,
        }];
        cx.functions = vec![FunctionComplexity {
            file: "a.py".into(),
            name: "f".into(),
            line: 1,
            cyclomatic: 9,
            cognitive: 4,
            max_nesting: 2,
            branches: 3,
            except_paths: 0,
            length: 20,
        }];

        let rows = cognitive_load_per_file(&hot, &know, &coup, &cx);
        assert_eq!(rows.len(), 2);
        let a = &rows[0];
        assert_eq!(a.path, "a.py");
        // a.py is the maximum on complexity, knowledge, and change rate;
        // coordination is flat (all zero).
        let expected = 0.35 + 0.25 * 0.0 + 0.25 + 0.15;
        assert!((a.composite_load - expected).abs() < 1e-9);
    }

    #[test]
    fn dx_score_combines_components_with_weights() {
        let (hot, know, coup, mut clustering, cx) = empty_reports();
        clustering.clusters = vec![cluster(0, 10, ClusterLabel::Feature)];
        let densities = FxHashMap::default();
        let report = analyze(
            &hot,
            &know,
            &coup,
            &clustering,
            &cx,
            &densities,
            &AnalysisConfig::default(),
        );
        // throughput 1.0, feedback 0.0 (no files), focus 1.0, load 0.0
        let expected = 0.3 * 1.0 + 0.25 * 0.0 + 0.25 * 1.0 + 0.2 * 1.0;
        assert!((report.dx_score - expected).abs() < 1e-9);
        assert!(report.dx_score >= 0.0 && report.dx_score <= 1.0);
    }
}
