//! End-to-end engine tests over real throwaway repositories.

mod common;

use common::{days_ago, TestRepo};
use xrays::git::{Git2History, Git2Source};
use xrays::orchestrator::Orchestrator;

const ANEMIC_PY: &str = r#"
class Order:
    def __init__(self, total):
        self.total = total
        self.status = "new"

    def get_total(self):
        return self.total

    def set_status(self, status):
        self.status = status
"#;

const BUSY_PY: &str = r#"
import order


def dispatch(items):
    shipped = []
    for item in items:
        if item.ready and item.total > 0:
            shipped.append(item)
        elif item.backordered:
            continue
    return shipped


class Dispatcher:
    def __init__(self):
        self.queue = []

    def push(self, item):
        if item is not None:
            self.queue.append(item)

    def drain(self):
        out = []
        while self.queue:
            out.append(self.queue.pop())
        return out
"#;

fn populated_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.commit("Alice", days_ago(60), &[("order.py", ANEMIC_PY)]);
    for i in 0..6 {
        let body = format!("{BUSY_PY}\n# rev {i}\n");
        repo.commit("Alice", days_ago(50 - i * 4), &[("dispatch.py", &body)]);
    }
    repo.commit(
        "Bob",
        days_ago(20),
        &[("order.py", &format!("{ANEMIC_PY}\n# touched\n"))],
    );
    repo.commit(
        "Bob",
        days_ago(10),
        &[
            ("dispatch.py", &format!("{BUSY_PY}\n# pair\n")),
            ("order.py", &format!("{ANEMIC_PY}\n# pair\n")),
        ],
    );
    repo
}

#[test]
fn full_run_respects_declared_ranges() {
    let repo = populated_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");

    let (run, bundle) = orchestrator.run_all(90, None).unwrap();

    assert!(!bundle.empty_window);
    assert_eq!(bundle.hotspots.total_commits, 9);

    for f in &bundle.hotspots.files {
        assert!(f.hotspot_score.is_finite());
        assert!((0.0..=1.0).contains(&f.hotspot_score));
        assert!((0.0..=1.0).contains(&f.rework_ratio));
    }
    let bucketed: usize = bundle.hotspots.pareto.iter().map(|b| b.file_count).sum();
    assert!(bucketed <= bundle.hotspots.files.len());

    for f in &bundle.knowledge.files {
        assert!((0.0..=1.0).contains(&f.kdi));
        assert!((0.0..=1.0).contains(&f.primary_pct));
    }
    assert!((0.0..=1.0).contains(&bundle.knowledge.dri));

    for p in &bundle.coupling.pairs {
        assert!(p.file_a < p.file_b);
        assert!((0.0..=1.0).contains(&p.jaccard));
        assert!(p.shared_commits >= 2);
    }
    for f in &bundle.coupling.file_pain {
        assert!((0.0..=1.0).contains(&f.pain));
    }

    for c in &bundle.anemic.classes {
        assert!((0.0..=1.0).contains(&c.ams));
    }
    // Order is a getter/setter bag: flagged as anemic.
    let order = bundle
        .anemic
        .classes
        .iter()
        .find(|c| c.name == "Order")
        .unwrap();
    assert!(order.ams > 0.5);
    // dispatch.py imports order.
    assert_eq!(order.touch_count, 1);

    for f in &bundle.complexity.functions {
        assert!(f.cyclomatic >= 1);
        assert!(f.length >= 1);
    }
    assert!(bundle.complexity.total_functions >= 5);

    for c in &bundle.god_classes.classes {
        assert!((0.0..=1.0).contains(&c.gcs));
        assert!((0.0..=1.0).contains(&c.tcc));
    }

    for f in &bundle.effort.files {
        assert!((0.0..=1.0).contains(&f.rei));
    }

    assert!((0.0..=1.0).contains(&bundle.dx.dx_score));
    assert!((0.0..=1.0).contains(&bundle.dx.throughput));
    assert!((0.0..=1.0).contains(&bundle.dx.cognitive_load));

    assert_eq!(run.total_commits, 9);
    assert_eq!(run.hotspot_file_count, bundle.hotspots.files.len());
    assert_eq!(run.dx_score, bundle.dx.dx_score);
}

#[test]
fn empty_window_degrades_to_zero_reports() {
    let repo = TestRepo::new();
    // One commit far outside any reasonable window.
    repo.commit("Alice", 1_000_000_000, &[("old.py", "x = 1\n")]);

    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");

    let (_, bundle) = orchestrator.run_all(30, None).unwrap();
    assert!(bundle.empty_window);
    assert!(bundle.hotspots.files.is_empty());
    assert!(bundle.coupling.pairs.is_empty());
    assert_eq!(bundle.clustering.k, 0);
    assert_eq!(bundle.effort.total_files, 0);
    assert_eq!(bundle.dx.total_commits, 0);
    // The tree still gets analyzed even when history is out of window.
    assert!(bundle.complexity.total_functions == 0);
}

#[test]
fn window_anchored_at_ref_sees_only_older_commits() {
    let repo = TestRepo::new();
    repo.commit("Alice", days_ago(40), &[("a.py", "x = 1\n")]);
    let anchor = repo.commit("Alice", days_ago(30), &[("a.py", "x = 2\n")]);
    repo.commit("Alice", days_ago(5), &[("b.py", "y = 1\n")]);

    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");

    let (_, bundle) = orchestrator.run_all(90, Some(&anchor)).unwrap();
    assert_eq!(bundle.hotspots.total_commits, 2);
    assert!(bundle.hotspots.files.iter().all(|f| f.path == "a.py"));
}

#[test]
fn hotspot_comparison_counts_statuses() {
    let repo = TestRepo::new();
    // Early burst on big.py, later burst on other.py.
    for i in 0..5 {
        let body = format!("x = {i}\n");
        repo.commit("Alice", days_ago(80 - i), &[("big.py", &body)]);
    }
    let from_ref = repo.commit("Alice", days_ago(74), &[("big.py", "x = 99\n")]);
    for i in 0..5 {
        let body = format!("y = {i}\n");
        repo.commit("Bob", days_ago(20 - i), &[("other.py", &body)]);
    }
    let to_ref = repo.commit("Bob", days_ago(14), &[("other.py", "y = 99\n")]);

    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();
    let orchestrator = Orchestrator::new(&history, &source, "/repo");

    let report = orchestrator
        .compare_hotspots(30, &from_ref, &to_ref)
        .unwrap();
    assert_eq!(
        report.new_count
            + report.removed_count
            + report.improved_count
            + report.degraded_count
            + report
                .files
                .iter()
                .filter(|f| f.status == xrays::models::DeltaStatus::Unchanged)
                .count(),
        report.files.len()
    );
    // big.py churn happened only in the first window.
    let big = report.files.iter().find(|f| f.path == "big.py").unwrap();
    assert_eq!(big.status, xrays::models::DeltaStatus::Removed);
    let other = report.files.iter().find(|f| f.path == "other.py").unwrap();
    assert_eq!(other.status, xrays::models::DeltaStatus::New);
}

#[test]
fn cancelled_run_never_completes() {
    let repo = populated_repo();
    let history = Git2History::open(repo.dir.path()).unwrap();
    let source = Git2Source::open(repo.dir.path()).unwrap();

    let cancel = xrays::orchestrator::CancelToken::new();
    cancel.cancel();
    let orchestrator =
        Orchestrator::new(&history, &source, "/repo").with_cancel(cancel);
    let err = orchestrator.run_all(90, None).unwrap_err();
    assert!(matches!(err, xrays::error::XraysError::Cancelled));
}
