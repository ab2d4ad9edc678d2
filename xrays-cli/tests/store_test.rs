//! Run store: round-trip fidelity, comparison semantics, lookup misses.

mod common;

use common::{days_ago, TestRepo};
use xrays::error::XraysError;
use xrays::git::{Git2History, Git2Source};
use xrays::models::DeltaStatus;
use xrays::orchestrator::Orchestrator;
use xrays::store::RunStore;

const MODULE_PY: &str = r#"
class Ledger:
    def __init__(self):
        self.entries = []

    def post(self, entry):
        if entry.amount != 0:
            self.entries.append(entry)

    def balance(self):
        total = 0
        for entry in self.entries:
            total += entry.amount
        return total
"#;

fn analyzed_repo() -> (TestRepo, tempfile::TempDir) {
    let repo = TestRepo::new();
    repo.commit("Alice", days_ago(45), &[("ledger.py", MODULE_PY)]);
    for i in 0..5 {
        let body = format!("{MODULE_PY}\n# rev {i}\n");
        repo.commit("Alice", days_ago(40 - i * 3), &[("ledger.py", &body)]);
    }
    repo.commit("Bob", days_ago(12), &[("util.py", "import ledger\n\nx = 1\n")]);
    let db_dir = tempfile::tempdir().unwrap();
    (repo, db_dir)
}

#[test]
fn persisted_run_reads_back_equal_by_value() {
    let (repo, db_dir) = analyzed_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();

    let (run, bundle) = orchestrator
        .run_and_store(&store, 90, None)
        .unwrap();

    let (loaded_run, loaded_bundle) = store.get_bundle(&run.run_id).unwrap();
    assert_eq!(loaded_run, run);
    assert_eq!(loaded_bundle, bundle);
}

#[test]
fn listing_orders_runs_newest_first() {
    let (repo, db_dir) = analyzed_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();

    let (first, _) = orchestrator.run_and_store(&store, 90, None).unwrap();
    let (second, _) = orchestrator.run_and_store(&store, 30, None).unwrap();

    assert_eq!(store.list_repos().unwrap(), vec!["/repo".to_string()]);
    let runs = store.list_runs("/repo").unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, second.run_id);
    assert_eq!(runs[1].run_id, first.run_id);
}

#[test]
fn missing_run_is_a_typed_miss() {
    let db_dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();
    let err = store.get_run("no-such-run").unwrap_err();
    assert!(matches!(err, XraysError::NotFound(_)));
    let err = store.compare("a", "b").unwrap_err();
    assert!(matches!(err, XraysError::NotFound(_)));
}

#[test]
fn self_comparison_is_all_unchanged() {
    let (repo, db_dir) = analyzed_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();

    let (run, _) = orchestrator.run_and_store(&store, 90, None).unwrap();
    let comparison = store.compare(&run.run_id, &run.run_id).unwrap();

    let sections = [
        &comparison.hotspots,
        &comparison.knowledge,
        &comparison.pain,
        &comparison.effort,
        &comparison.complexity,
        &comparison.anemic,
        &comparison.god_classes,
        &comparison.cognitive,
    ];
    assert!(sections.iter().any(|rows| !rows.is_empty()));
    for rows in sections {
        for row in rows.iter() {
            assert_eq!(row.status, DeltaStatus::Unchanged, "row {}", row.key);
            assert_eq!(row.delta, 0.0);
        }
    }
}

#[test]
fn cooled_hotspot_reads_as_improved_between_snapshots() {
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use xrays::models::*;

    fn snapshot(run_id: &str, started_offset_min: i64, score: f64) -> (Run, AnalysisBundle) {
        let from = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let to = from + Duration::days(90);
        let started = to + Duration::minutes(started_offset_min);
        let files = vec![FileMetrics {
            path: "big.py".into(),
            frequency: 4,
            churn: 200,
            hotspot_score: score,
            rework_ratio: 0.5,
        }];
        let hotspots = HotspotReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_commits: 4,
            pareto: xrays::pipelines::hotspots::pareto_buckets(&files),
            files,
        };
        let empty_knowledge = KnowledgeReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_commits: 4,
            dri: 0.0,
            dri_min_authors: 0,
            island_count: 0,
            files: vec![],
        };
        let empty_coupling = CouplingReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_commits: 4,
            pairs: vec![],
            file_pain: vec![],
        };
        let empty_anemic = AnemicReport {
            repo_path: "/repo".into(),
            tree_ref: None,
            total_files: 0,
            total_classes: 0,
            anemic_count: 0,
            average_ams: 0.0,
            ams_threshold: 0.5,
            classes: vec![],
        };
        let empty_complexity = ComplexityReport {
            repo_path: "/repo".into(),
            tree_ref: None,
            total_files: 0,
            total_functions: 0,
            avg_complexity: 0.0,
            max_complexity: 0,
            high_complexity_count: 0,
            complexity_threshold: 10,
            functions: vec![],
        };
        let empty_god = GodClassReport {
            repo_path: "/repo".into(),
            tree_ref: None,
            total_classes: 0,
            flagged_count: 0,
            worst_gcs: 0.0,
            gcs_threshold: 0.6,
            classes: vec![],
        };
        let empty_clustering = ClusteringReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_commits: 4,
            k: 0,
            silhouette: 0.0,
            clusters: vec![],
            drift: vec![],
        };
        let empty_effort = EffortReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_files: 0,
            r_squared: 0.0,
            alpha: 0.0,
            coefficients: BTreeMap::new(),
            files: vec![],
        };
        let empty_dx = DXReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: from,
            to_date: to,
            total_commits: 4,
            total_files: 0,
            throughput: 0.0,
            feedback: 0.0,
            focus: 0.5,
            cognitive_load: 0.0,
            dx_score: 0.5,
            weights: [0.3, 0.25, 0.25, 0.2],
            files: vec![],
        };

        let run = Run {
            run_id: run_id.into(),
            repo_path: "/repo".into(),
            window_days: 90,
            started_at: started,
            ended_at: started,
            from_date: from,
            to_date: to,
            total_commits: 4,
            first_commit_date: Some(from),
            last_commit_date: Some(to),
            tree_ref: None,
            hotspot_file_count: 1,
            dri: 0.0,
            dri_min_authors: 0,
            island_count: 0,
            coupling_pair_count: 0,
            anemic_total_classes: 0,
            anemic_count: 0,
            anemic_average_ams: 0.0,
            ams_threshold: 0.5,
            complexity_total_functions: 0,
            complexity_avg: 0.0,
            complexity_max: 0,
            complexity_high_count: 0,
            complexity_threshold: 10,
            god_class_total: 0,
            god_class_flagged: 0,
            gcs_threshold: 0.6,
            clustering_k: 0,
            clustering_silhouette: 0.0,
            effort_total_files: 0,
            effort_r_squared: 0.0,
            effort_alpha: 0.0,
            dx_score: 0.5,
            dx_throughput: 0.0,
            dx_feedback: 0.0,
            dx_focus: 0.5,
            dx_cognitive_load: 0.0,
            effort_coefficients: BTreeMap::new(),
            dx_weights: [0.3, 0.25, 0.25, 0.2],
        };
        let bundle = AnalysisBundle {
            empty_window: false,
            hotspots,
            knowledge: empty_knowledge,
            coupling: empty_coupling,
            anemic: empty_anemic,
            complexity: empty_complexity,
            god_classes: empty_god,
            clustering: empty_clustering,
            effort: empty_effort,
            dx: empty_dx,
        };
        (run, bundle)
    }

    let db_dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();

    let (run_a, bundle_a) = snapshot("run-a", 0, 0.9);
    let (run_b, bundle_b) = snapshot("run-b", 60, 0.3);
    store.save(&run_a, &bundle_a).unwrap();
    store.save(&run_b, &bundle_b).unwrap();

    let comparison = store.compare("run-a", "run-b").unwrap();
    let big = comparison
        .hotspots
        .iter()
        .find(|r| r.key == "big.py")
        .unwrap();
    assert_eq!(big.status, DeltaStatus::Improved);
    assert!((big.delta - (-0.6)).abs() < 1e-9);

    // Comparison order follows started_at even when ids are swapped.
    let swapped = store.compare("run-b", "run-a").unwrap();
    assert_eq!(swapped.run_a, "run-a");
    assert_eq!(swapped.run_b, "run-b");
}

#[test]
fn file_leaving_the_window_reads_as_removed() {
    let (repo, db_dir) = analyzed_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");
    let store = RunStore::open(&db_dir.path().join("runs.db")).unwrap();

    // A wide window sees the ledger.py burst; a narrow one sees only the
    // late util.py commit, so ledger.py cools down between snapshots.
    let (run_a, bundle_a) = orchestrator.run_and_store(&store, 90, None).unwrap();
    let (run_b, bundle_b) = orchestrator.run_and_store(&store, 15, None).unwrap();

    let hot_a = bundle_a
        .hotspots
        .files
        .iter()
        .find(|f| f.path == "ledger.py")
        .unwrap()
        .hotspot_score;
    assert!(hot_a > 0.0);
    assert!(bundle_b
        .hotspots
        .files
        .iter()
        .all(|f| f.path != "ledger.py"));

    let comparison = store.compare(&run_a.run_id, &run_b.run_id).unwrap();
    let ledger = comparison
        .hotspots
        .iter()
        .find(|r| r.key == "ledger.py")
        .unwrap();
    assert_eq!(ledger.status, DeltaStatus::Removed);
    assert_eq!(comparison.run_a, run_a.run_id);
    assert_eq!(comparison.run_b, run_b.run_id);
}
