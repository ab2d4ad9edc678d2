//! Text renderers for the analysis reports.
//!
//! Fixed-width tables, top-20 truncation with a trailing count, one renderer
//! per report. Everything returns a String so tests can snapshot output.

use console::style;

use crate::models::{
    AnemicReport, ClusteringReport, ComplexityReport, CouplingReport, DXReport, EffortReport,
    GodClassReport, HotspotComparison, HotspotReport, KnowledgeReport, RepoSummary, Run,
};

const MAX_ROWS: usize = 20;
const MAX_PATH: usize = 60;

fn header(title: &str) -> String {
    format!("{}\n\n", style(format!("--- {title} ---")).bold())
}

fn clip(path: &str, width: usize) -> String {
    if path.len() > width {
        format!("...{}", &path[path.len() - (width - 3)..])
    } else {
        path.to_string()
    }
}

fn path_width<'a>(paths: impl Iterator<Item = &'a str>) -> usize {
    paths.map(|p| p.len()).max().unwrap_or(4).clamp(4, MAX_PATH)
}

fn more_line(total: usize, shown: usize, what: &str) -> String {
    if total > shown {
        format!("  ... and {} more {what}\n", total - shown)
    } else {
        String::new()
    }
}

pub fn render_summary(summary: &RepoSummary, snapshot: Option<(&str, &str)>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Repository:   {}\n", summary.repo_path));
    if let Some((reference, date)) = snapshot {
        out.push_str(&format!("Snapshot at:  {reference} ({date})\n"));
    }
    out.push_str(&format!("Commits:      {}\n", summary.commit_count));
    if let (Some(first), Some(last)) = (summary.first_commit_date, summary.last_commit_date) {
        out.push_str(&format!("First commit: {}\n", first.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("Last commit:  {}\n", last.format("%Y-%m-%d %H:%M:%S")));
    }
    out
}

pub fn render_hotspots(report: &HotspotReport) -> String {
    let mut out = header(&format!(
        "Hotspot Analysis (last {} days, {} commits)",
        report.window_days, report.total_commits
    ));
    if report.files.is_empty() {
        out.push_str("No file changes found in this window.\n");
        return out;
    }

    let width = path_width(report.files.iter().map(|f| f.path.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:>4}  {:>6}  {:>7}  {:>6}\n",
        "File", "Freq", "Churn", "Hotspot", "Rework"
    ));
    out.push_str(&"-".repeat(width + 30));
    out.push('\n');
    for f in report.files.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:>4}  {:>6}  {:>7.4}  {:>6.2}\n",
            clip(&f.path, width),
            f.frequency,
            f.churn,
            f.hotspot_score,
            f.rework_ratio
        ));
    }
    out.push_str(&more_line(report.files.len(), MAX_ROWS, "files"));

    if !report.pareto.is_empty() {
        out.push_str("\nEffort Distribution:\n");
        for bucket in &report.pareto {
            let pct = bucket.cumulative_count as f64 / report.files.len() as f64 * 100.0;
            out.push_str(&format!(
                "  {}% of churn is in {}/{} files ({pct:.0}%)\n",
                bucket.threshold_pct,
                bucket.cumulative_count,
                report.files.len()
            ));
        }
    }
    out
}

pub fn render_knowledge(report: &KnowledgeReport) -> String {
    let mut out = header(&format!(
        "Knowledge Analysis (last {} days, {} commits)",
        report.window_days, report.total_commits
    ));
    out.push_str(&format!(
        "Developer Risk Index: {:.4} (min authors for half the churn: {})\n",
        report.dri, report.dri_min_authors
    ));
    out.push_str(&format!("Knowledge Islands:    {}\n\n", report.island_count));

    if report.files.is_empty() {
        out.push_str("No file changes found in this window.\n");
        return out;
    }

    let width = path_width(report.files.iter().map(|f| f.path.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:>6}  {:<20}  {:>5}  {:>7}  {:>6}\n",
        "File", "KDI", "Primary Author", "Pct", "Authors", "Island"
    ));
    out.push_str(&"-".repeat(width + 54));
    out.push('\n');
    for f in report.files.iter().take(MAX_ROWS) {
        let author = clip(&f.primary_author, 20);
        out.push_str(&format!(
            "{:<width$}  {:>6.4}  {:<20}  {:>4.0}%  {:>7}  {:>6}\n",
            clip(&f.path, width),
            f.kdi,
            author,
            f.primary_pct * 100.0,
            f.author_count(),
            if f.is_island { "Yes" } else { "No" }
        ));
    }
    out.push_str(&more_line(report.files.len(), MAX_ROWS, "files"));
    out
}

pub fn render_coupling(report: &CouplingReport) -> String {
    let mut out = header(&format!(
        "Coupling Analysis (last {} days, {} commits)",
        report.window_days, report.total_commits
    ));
    if report.pairs.is_empty() {
        out.push_str("No coupling pairs found in this window.\n");
    } else {
        let wa = path_width(report.pairs.iter().map(|p| p.file_a.as_str())).min(40);
        let wb = path_width(report.pairs.iter().map(|p| p.file_b.as_str())).min(40);
        out.push_str(&format!(
            "{:<wa$}  {:<wb$}  {:>6}  {:>8}  {:>7}\n",
            "File A", "File B", "Shared", "Jaccard", "Support"
        ));
        out.push_str(&"-".repeat(wa + wb + 29));
        out.push('\n');
        for p in report.pairs.iter().take(MAX_ROWS) {
            out.push_str(&format!(
                "{:<wa$}  {:<wb$}  {:>6}  {:>8.4}  {:>7.4}\n",
                clip(&p.file_a, wa),
                clip(&p.file_b, wb),
                p.shared_commits,
                p.jaccard,
                p.support
            ));
        }
        out.push_str(&more_line(report.pairs.len(), MAX_ROWS, "pairs"));
    }

    out.push('\n');
    out.push_str(&header("PAIN Scores (Size x Distance x Volatility)"));
    if report.file_pain.is_empty() {
        out.push_str("No files found in this window.\n");
        return out;
    }
    let width = path_width(report.file_pain.iter().map(|f| f.path.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:>6}  {:>10}  {:>8}  {:>6}\n",
        "File", "Size", "Volatility", "Distance", "PAIN"
    ));
    out.push_str(&"-".repeat(width + 37));
    out.push('\n');
    for f in report.file_pain.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:>6.4}  {:>10.4}  {:>8.4}  {:>6.4}\n",
            clip(&f.path, width),
            f.size_norm,
            f.volatility_norm,
            f.distance_norm,
            f.pain
        ));
    }
    out.push_str(&more_line(report.file_pain.len(), MAX_ROWS, "files"));
    out
}

pub fn render_anemic(report: &AnemicReport) -> String {
    let mut out = header(&format!(
        "Anemia Analysis ({} classes in {} files)",
        report.total_classes, report.total_files
    ));
    out.push_str(&format!("Total classes:  {}\n", report.total_classes));
    out.push_str(&format!(
        "Anemic classes: {} (threshold {})\n",
        report.anemic_count, report.ams_threshold
    ));
    out.push_str(&format!("Average AMS:    {:.4}\n\n", report.average_ams));

    if report.classes.is_empty() {
        out.push_str("No classes found.\n");
        return out;
    }
    let width = path_width(report.classes.iter().map(|c| c.file.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:<24}  {:>6}  {:>8}  {:>6}  {:>5}\n",
        "File", "Class", "Fields", "Behavior", "AMS", "Touch"
    ));
    out.push_str(&"-".repeat(width + 60));
    out.push('\n');
    for c in report.classes.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:<24}  {:>6}  {:>8}  {:>6.4}  {:>5}\n",
            clip(&c.file, width),
            clip(&c.name, 24),
            c.fields,
            c.behavior_methods,
            c.ams,
            c.touch_count
        ));
    }
    out.push_str(&more_line(report.classes.len(), MAX_ROWS, "classes"));
    out
}

pub fn render_complexity(report: &ComplexityReport) -> String {
    let mut out = header(&format!(
        "Complexity Analysis ({} functions in {} files)",
        report.total_functions, report.total_files
    ));
    out.push_str(&format!(
        "High complexity: {} (above threshold {})\n",
        report.high_complexity_count, report.complexity_threshold
    ));
    out.push_str(&format!("Avg complexity:  {:.2}\n", report.avg_complexity));
    out.push_str(&format!("Max complexity:  {}\n\n", report.max_complexity));

    if report.functions.is_empty() {
        out.push_str("No functions found.\n");
        return out;
    }
    let width = path_width(report.functions.iter().map(|f| f.file.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:<28}  {:>4}  {:>4}  {:>9}  {:>9}  {:>6}\n",
        "File", "Function", "CC", "Cog", "Max Depth", "Branches", "Length"
    ));
    out.push_str(&"-".repeat(width + 73));
    out.push('\n');
    for f in report.functions.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:<28}  {:>4}  {:>4}  {:>9}  {:>9}  {:>6}\n",
            clip(&f.file, width),
            clip(&f.name, 28),
            f.cyclomatic,
            f.cognitive,
            f.max_nesting,
            f.branches,
            f.length
        ));
    }
    out.push_str(&more_line(report.functions.len(), MAX_ROWS, "functions"));
    out
}

pub fn render_god_classes(report: &GodClassReport) -> String {
    let mut out = header(&format!(
        "God Class Analysis ({} classes)",
        report.total_classes
    ));
    out.push_str(&format!(
        "Flagged: {} (threshold {})\n",
        report.flagged_count, report.gcs_threshold
    ));
    out.push_str(&format!("Worst GCS: {:.4}\n\n", report.worst_gcs));

    if report.classes.is_empty() {
        out.push_str("No classes found.\n");
        return out;
    }
    let width = path_width(report.classes.iter().map(|c| c.file.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:<24}  {:>7}  {:>6}  {:>4}  {:>6}  {:>6}  {:>7}\n",
        "File", "Class", "Methods", "Fields", "WMC", "TCC", "GCS", "Flagged"
    ));
    out.push_str(&"-".repeat(width + 71));
    out.push('\n');
    for c in report.classes.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:<24}  {:>7}  {:>6}  {:>4}  {:>6.4}  {:>6.4}  {:>7}\n",
            clip(&c.file, width),
            clip(&c.name, 24),
            c.method_count,
            c.field_count,
            c.wmc,
            c.tcc,
            c.gcs,
            if c.flagged { "Yes" } else { "No" }
        ));
    }
    out.push_str(&more_line(report.classes.len(), MAX_ROWS, "classes"));
    out
}

pub fn render_clustering(report: &ClusteringReport) -> String {
    let mut out = header(&format!(
        "Clustering Analysis (last {} days, {} commits)",
        report.window_days, report.total_commits
    ));
    if report.clusters.is_empty() {
        out.push_str("No commits found in this window.\n");
        return out;
    }
    out.push_str(&format!("Clusters:   {}\n", report.k));
    out.push_str(&format!("Silhouette: {:.4}\n\n", report.silhouette));

    out.push_str(&format!(
        "{:<13}  {:>4}  {:>9}  {:>9}  {:>9}\n",
        "Label", "Size", "Avg Files", "Avg Churn", "Add Ratio"
    ));
    out.push_str(&"-".repeat(52));
    out.push('\n');
    for c in &report.clusters {
        out.push_str(&format!(
            "{:<13}  {:>4}  {:>9.1}  {:>9.1}  {:>9.2}\n",
            c.label.to_string(),
            c.size,
            c.centroid_file_count,
            c.centroid_total_churn,
            c.centroid_add_ratio
        ));
    }

    if !report.drift.is_empty() {
        out.push('\n');
        out.push_str(&header("Cluster Drift (first half vs second half)"));
        out.push_str(&format!(
            "{:<13}  {:>8}  {:>8}  {:>6}  {:<10}\n",
            "Label", "1st Half", "2nd Half", "Drift", "Trend"
        ));
        out.push_str(&"-".repeat(53));
        out.push('\n');
        for d in &report.drift {
            out.push_str(&format!(
                "{:<13}  {:>7.1}%  {:>7.1}%  {:>+6.1}  {:<10}\n",
                d.label.to_string(),
                d.first_half_pct,
                d.second_half_pct,
                d.drift,
                d.trend.to_string()
            ));
        }
    }
    out
}

pub fn render_effort(report: &EffortReport) -> String {
    let mut out = header(&format!(
        "Effort Analysis (last {} days, {} files)",
        report.window_days, report.total_files
    ));
    out.push_str(&format!("Model R²: {:.4}\n", report.r_squared));
    out.push_str(&format!("Alpha:    {}\n\n", report.alpha));

    if report.files.is_empty() {
        out.push_str("No files found in this window.\n");
        return out;
    }
    let width = path_width(report.files.iter().map(|f| f.path.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:>6}  {:>6}  {:<25}\n",
        "File", "REI", "Proxy", "Top Factor"
    ));
    out.push_str(&"-".repeat(width + 43));
    out.push('\n');
    for f in report.files.iter().take(MAX_ROWS) {
        let top_factor = f
            .contributions
            .iter()
            .max_by(|a, b| {
                a.1.abs()
                    .partial_cmp(&b.1.abs())
                    .expect("finite contribution")
            })
            .map(|(name, _)| name.as_str())
            .unwrap_or("");
        out.push_str(&format!(
            "{:<width$}  {:>6.4}  {:>6.4}  {:<25}\n",
            clip(&f.path, width),
            f.rei,
            f.proxy_label,
            top_factor
        ));
    }
    out.push_str(&more_line(report.files.len(), MAX_ROWS, "files"));
    out
}

pub fn render_dx(report: &DXReport) -> String {
    let mut out = header(&format!(
        "Developer Experience Analysis (last {} days, {} commits, {} files)",
        report.window_days, report.total_commits, report.total_files
    ));
    out.push_str(&format!("DX Score: {:.4}\n\n", report.dx_score));
    out.push_str("Core Metrics:\n");
    out.push_str(&format!(
        "  Throughput:     {:.4}  (weighted commit rate)\n",
        report.throughput
    ));
    out.push_str(&format!(
        "  Feedback:       {:.4}  (iteration speed)\n",
        report.feedback
    ));
    out.push_str(&format!(
        "  Focus:          {:.4}  (feature vs toil)\n",
        report.focus
    ));
    out.push_str(&format!(
        "  Cognitive Load: {:.4}  (lower is better)\n",
        report.cognitive_load
    ));

    if report.files.is_empty() {
        return out;
    }
    out.push_str("\nTop Cognitive Load Files:\n");
    let shown = report.files.len().min(10);
    let width = path_width(report.files.iter().take(shown).map(|f| f.path.as_str())).min(40);
    out.push_str(&format!(
        "{:<width$}  {:>10}  {:>12}  {:>9}  {:>10}  {:>6}\n",
        "File", "Complexity", "Coordination", "Knowledge", "ChangeRate", "Load"
    ));
    out.push_str(&"-".repeat(width + 57));
    out.push('\n');
    for f in report.files.iter().take(10) {
        out.push_str(&format!(
            "{:<width$}  {:>10.4}  {:>12.4}  {:>9.4}  {:>10.4}  {:>6.4}\n",
            clip(&f.path, width),
            f.complexity_score,
            f.coordination_score,
            f.knowledge_score,
            f.change_rate_score,
            f.composite_load
        ));
    }
    out.push_str(&more_line(report.files.len(), 10, "files"));
    out
}

pub fn render_comparison(report: &HotspotComparison) -> String {
    let mut out = header(&format!(
        "Hotspot Comparison: {} -> {} ({}-day window)",
        report.from_ref, report.to_ref, report.window_days
    ));
    out.push_str(&format!(
        "From: {} ({}) - {} commits\n",
        report.from_ref,
        report.from_date.format("%Y-%m-%d %H:%M:%S"),
        report.from_total_commits
    ));
    out.push_str(&format!(
        "To:   {} ({}) - {} commits\n\n",
        report.to_ref,
        report.to_date.format("%Y-%m-%d %H:%M:%S"),
        report.to_total_commits
    ));
    out.push_str(&format!(
        "Summary: {} new, {} removed, {} improved, {} degraded\n\n",
        report.new_count, report.removed_count, report.improved_count, report.degraded_count
    ));

    if report.files.is_empty() {
        out.push_str("No file changes found in either snapshot.\n");
        return out;
    }
    let width = path_width(report.files.iter().map(|f| f.path.as_str()));
    out.push_str(&format!(
        "{:<width$}  {:>6}  {:>6}  {:>7}  {:<10}\n",
        "File", "From", "To", "Delta", "Status"
    ));
    out.push_str(&"-".repeat(width + 37));
    out.push('\n');
    for f in report.files.iter().take(MAX_ROWS) {
        out.push_str(&format!(
            "{:<width$}  {:>6.4}  {:>6.4}  {:>+7.4}  {:<10}\n",
            clip(&f.path, width),
            f.from_score,
            f.to_score,
            f.score_delta,
            f.status.to_string()
        ));
    }
    out.push_str(&more_line(report.files.len(), MAX_ROWS, "files"));
    out
}

pub fn render_runs_table(runs: &[Run]) -> String {
    if runs.is_empty() {
        return "No runs found.\n".to_string();
    }
    let mut out = format!(
        "{:<36}  {:<30}  {:<19}  {:>6}  {:>7}  {:>5}  {:>6}\n",
        "Run ID", "Repository", "Date", "Window", "Commits", "Files", "DX"
    );
    out.push_str(&"-".repeat(122));
    out.push('\n');
    for r in runs {
        out.push_str(&format!(
            "{:<36}  {:<30}  {:<19}  {:>6}  {:>7}  {:>5}  {:>6.4}\n",
            r.run_id,
            clip(&r.repo_path, 30),
            r.started_at.format("%Y-%m-%d %H:%M:%S"),
            r.window_days,
            r.total_commits,
            r.hotspot_file_count,
            r.dx_score
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileMetrics, ParetoBucket};
    use chrono::{TimeZone, Utc};

    #[test]
    fn hotspot_table_lists_files_and_pareto() {
        let report = HotspotReport {
            repo_path: "/repo".into(),
            window_days: 90,
            from_date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            to_date: Utc.timestamp_opt(1_700_100_000, 0).unwrap(),
            total_commits: 11,
            files: vec![
                FileMetrics {
                    path: "a.py".into(),
                    frequency: 10,
                    churn: 150,
                    hotspot_score: 1.0,
                    rework_ratio: 0.9,
                },
                FileMetrics {
                    path: "b.py".into(),
                    frequency: 1,
                    churn: 100,
                    hotspot_score: 0.0,
                    rework_ratio: 0.0,
                },
            ],
            pareto: vec![ParetoBucket {
                threshold_pct: 50,
                file_count: 1,
                cumulative_count: 1,
            }],
        };
        let text = render_hotspots(&report);
        assert!(text.contains("a.py"));
        assert!(text.contains("150"));
        assert!(text.contains("50% of churn is in 1/2 files"));
    }

    #[test]
    fn long_paths_are_clipped_from_the_left() {
        let long = "a/".repeat(40) + "file.py";
        let clipped = clip(&long, 20);
        assert_eq!(clipped.len(), 20);
        assert!(clipped.starts_with("..."));
        assert!(clipped.ends_with("file.py"));
    }

    #[test]
    fn empty_runs_table_reads_cleanly() {
        assert_eq!(render_runs_table(&[]), "No runs found.\n");
    }
}
