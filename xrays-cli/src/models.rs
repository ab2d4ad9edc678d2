//! Core data models for git-xrays
//!
//! Every record here is an immutable value type: created once per analysis,
//! never mutated. Reports are owned by the orchestrator during a run; the
//! run store owns the persisted copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single file's change within one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub commit_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub added_lines: u64,
    pub deleted_lines: u64,
}

impl FileChange {
    pub fn churn(&self) -> u64 {
        self.added_lines + self.deleted_lines
    }
}

/// Per-commit rollup derived from a group of [`FileChange`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub commit_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub file_count: usize,
    pub total_added: u64,
    pub total_deleted: u64,
    /// added / (added + deleted); 0.5 for zero-churn commits.
    pub add_ratio: f64,
}

impl CommitSummary {
    pub fn add_ratio_of(added: u64, deleted: u64) -> f64 {
        let total = added + deleted;
        if total == 0 {
            0.5
        } else {
            added as f64 / total as f64
        }
    }
}

/// Top-level facts about a repository, independent of any window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub repo_path: String,
    pub commit_count: u64,
    pub first_commit_date: Option<DateTime<Utc>>,
    pub last_commit_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Hotspots
// ---------------------------------------------------------------------------

/// Behavioral metrics for a single file within a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    /// Number of commits that touched this file.
    pub frequency: u64,
    /// Total lines added + deleted.
    pub churn: u64,
    /// minmax(weighted churn) * minmax(weighted frequency), in [0, 1].
    pub hotspot_score: f64,
    /// Fraction of commits within 14 days of another commit on the same path.
    pub rework_ratio: f64,
}

/// One step of the churn Pareto distribution.
///
/// `file_count` is incremental: the number of additional files needed to move
/// from the previous threshold to this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoBucket {
    pub threshold_pct: u8,
    pub file_count: usize,
    pub cumulative_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    /// Sorted by hotspot_score descending, then path ascending.
    pub files: Vec<FileMetrics>,
    pub pareto: Vec<ParetoBucket>,
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// A single author's contribution to a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorContribution {
    pub author: String,
    pub churn: u64,
    /// Churn with the 90-day half-life decay applied per change.
    pub weighted_churn: f64,
}

/// Knowledge distribution metrics for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileKnowledge {
    pub path: String,
    /// Sorted by weighted_churn descending.
    pub authors: Vec<AuthorContribution>,
    pub primary_author: String,
    pub primary_pct: f64,
    /// 1 - H / log2(N); 1.0 for a single author.
    pub kdi: f64,
    pub is_island: bool,
}

impl FileKnowledge {
    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    /// Gini coefficient of per-author weighted churn, in [0, 1].
    pub dri: f64,
    /// Legacy definition: minimum number of authors covering 50 % of churn.
    pub dri_min_authors: usize,
    pub island_count: usize,
    /// Sorted by kdi descending, then path ascending.
    pub files: Vec<FileKnowledge>,
}

// ---------------------------------------------------------------------------
// Coupling + PAIN
// ---------------------------------------------------------------------------

/// Temporal coupling between two files, `file_a < file_b` lexicographically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingPair {
    pub file_a: String,
    pub file_b: String,
    pub shared_commits: usize,
    pub union_commits: usize,
    pub jaccard: f64,
    pub support: f64,
    pub lift: f64,
}

/// PAIN composite for a single file: Size x Distance x Volatility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePain {
    pub path: String,
    pub size_norm: f64,
    pub distance_norm: f64,
    pub volatility_norm: f64,
    pub pain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    /// Sorted by jaccard descending.
    pub pairs: Vec<CouplingPair>,
    /// Sorted by pain descending.
    pub file_pain: Vec<FilePain>,
}

// ---------------------------------------------------------------------------
// AST: anemic model, god class, complexity
// ---------------------------------------------------------------------------

/// Anemic-model metrics for a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub file: String,
    pub name: String,
    pub fields: usize,
    pub behavior_methods: usize,
    /// fields / (fields + behavior_methods), 0.0 when both are zero.
    pub dbsi: f64,
    /// 1 - methods_with_logic / candidate_methods.
    pub orchestration: f64,
    /// dbsi * orchestration.
    pub ams: f64,
    /// Source files that import this class's module.
    pub touch_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnemicReport {
    pub repo_path: String,
    pub tree_ref: Option<String>,
    pub total_files: usize,
    pub total_classes: usize,
    pub anemic_count: usize,
    pub average_ams: f64,
    pub ams_threshold: f64,
    /// Sorted by ams descending.
    pub classes: Vec<ClassMetrics>,
}

/// God-class metrics for a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GodClassMetrics {
    pub file: String,
    pub name: String,
    pub method_count: usize,
    pub field_count: usize,
    /// Weighted Methods per Class: sum of method cyclomatic complexities.
    pub wmc: u64,
    /// Tight Class Cohesion; 1.0 when no method pair qualifies.
    pub tcc: f64,
    pub gcs: f64,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GodClassReport {
    pub repo_path: String,
    pub tree_ref: Option<String>,
    pub total_classes: usize,
    pub flagged_count: usize,
    pub worst_gcs: f64,
    pub gcs_threshold: f64,
    /// Sorted by gcs descending.
    pub classes: Vec<GodClassMetrics>,
}

/// Complexity metrics for a single function or method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub file: String,
    pub name: String,
    pub line: u32,
    pub cyclomatic: u64,
    pub cognitive: u64,
    pub max_nesting: u32,
    pub branches: u64,
    pub except_paths: u64,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub repo_path: String,
    pub tree_ref: Option<String>,
    pub total_files: usize,
    pub total_functions: usize,
    pub avg_complexity: f64,
    pub max_complexity: u64,
    pub high_complexity_count: usize,
    pub complexity_threshold: u64,
    /// Sorted by cyclomatic descending.
    pub functions: Vec<FunctionComplexity>,
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Commit category assigned from the centroid position in feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterLabel {
    Feature,
    Bugfix,
    Refactoring,
    Config,
    Mixed,
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterLabel::Feature => "feature",
            ClusterLabel::Bugfix => "bugfix",
            ClusterLabel::Refactoring => "refactoring",
            ClusterLabel::Config => "config",
            ClusterLabel::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// Feature vector for a single commit: [file_count, total_churn, add_ratio].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitFeatures {
    pub commit_id: String,
    pub timestamp: DateTime<Utc>,
    pub file_count: usize,
    pub total_churn: u64,
    pub add_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub size: usize,
    pub label: ClusterLabel,
    pub centroid_file_count: f64,
    pub centroid_total_churn: f64,
    pub centroid_add_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftTrend {
    Growing,
    Shrinking,
    Stable,
}

impl std::fmt::Display for DriftTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriftTrend::Growing => "growing",
            DriftTrend::Shrinking => "shrinking",
            DriftTrend::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// Share drift of one cluster between the two halves of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDrift {
    pub label: ClusterLabel,
    pub first_half_pct: f64,
    pub second_half_pct: f64,
    pub drift: f64,
    pub trend: DriftTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    pub k: usize,
    pub silhouette: f64,
    /// Sorted by size descending.
    pub clusters: Vec<ClusterSummary>,
    /// Sorted by |drift| descending. Duplicate labels are possible.
    pub drift: Vec<ClusterDrift>,
}

// ---------------------------------------------------------------------------
// Effort
// ---------------------------------------------------------------------------

/// Effort model results for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEffort {
    pub path: String,
    /// Relative Effort Index in [0, 1].
    pub rei: f64,
    /// Training label: 0.5 * norm(density) + 0.5 * norm(rework).
    pub proxy_label: f64,
    /// Per-feature contribution: coefficient * normalized feature value.
    pub contributions: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_files: usize,
    pub r_squared: f64,
    pub alpha: f64,
    pub coefficients: BTreeMap<String, f64>,
    /// Sorted by rei descending.
    pub files: Vec<FileEffort>,
}

// ---------------------------------------------------------------------------
// DX overlay
// ---------------------------------------------------------------------------

/// Cognitive load breakdown for a single file; every field in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCognitiveLoad {
    pub path: String,
    pub complexity_score: f64,
    pub coordination_score: f64,
    pub knowledge_score: f64,
    pub change_rate_score: f64,
    pub composite_load: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DXReport {
    pub repo_path: String,
    pub window_days: u32,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    pub total_files: usize,
    pub throughput: f64,
    pub feedback: f64,
    pub focus: f64,
    pub cognitive_load: f64,
    pub dx_score: f64,
    /// [throughput, feedback, focus, cognitive] weights.
    pub weights: [f64; 4],
    /// Sorted by composite_load descending.
    pub files: Vec<FileCognitiveLoad>,
}

// ---------------------------------------------------------------------------
// Time travel (hotspot vs hotspot)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaStatus {
    Unchanged,
    Improved,
    Degraded,
    New,
    Removed,
}

impl std::fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeltaStatus::Unchanged => "unchanged",
            DeltaStatus::Improved => "improved",
            DeltaStatus::Degraded => "degraded",
            DeltaStatus::New => "new",
            DeltaStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Per-file hotspot change between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHotspotDelta {
    pub path: String,
    pub from_score: f64,
    pub to_score: f64,
    pub score_delta: f64,
    pub from_churn: u64,
    pub to_churn: u64,
    pub from_frequency: u64,
    pub to_frequency: u64,
    pub status: DeltaStatus,
}

/// Hotspot comparison between two points in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotComparison {
    pub repo_path: String,
    pub from_ref: String,
    pub to_ref: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub window_days: u32,
    pub from_total_commits: usize,
    pub to_total_commits: usize,
    /// Sorted by |score_delta| descending.
    pub files: Vec<FileHotspotDelta>,
    pub new_count: usize,
    pub removed_count: usize,
    pub improved_count: usize,
    pub degraded_count: usize,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Scalar snapshot of one full analysis, the root entity of the run store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub repo_path: String,
    pub window_days: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub total_commits: usize,
    pub first_commit_date: Option<DateTime<Utc>>,
    pub last_commit_date: Option<DateTime<Utc>>,
    /// Ref the AST analyses ran at; None means HEAD.
    pub tree_ref: Option<String>,
    pub hotspot_file_count: usize,
    pub dri: f64,
    pub dri_min_authors: usize,
    pub island_count: usize,
    pub coupling_pair_count: usize,
    pub anemic_total_classes: usize,
    pub anemic_count: usize,
    pub anemic_average_ams: f64,
    pub ams_threshold: f64,
    pub complexity_total_functions: usize,
    pub complexity_avg: f64,
    pub complexity_max: u64,
    pub complexity_high_count: usize,
    pub complexity_threshold: u64,
    pub god_class_total: usize,
    pub god_class_flagged: usize,
    pub gcs_threshold: f64,
    pub clustering_k: usize,
    pub clustering_silhouette: f64,
    pub effort_total_files: usize,
    pub effort_r_squared: f64,
    pub effort_alpha: f64,
    pub dx_score: f64,
    pub dx_throughput: f64,
    pub dx_feedback: f64,
    pub dx_focus: f64,
    pub dx_cognitive_load: f64,
    pub effort_coefficients: BTreeMap<String, f64>,
    pub dx_weights: [f64; 4],
}

/// Everything one `--all` invocation produces, persisted as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    /// True when the window contained no commits and every report below is
    /// zero-filled.
    pub empty_window: bool,
    pub hotspots: HotspotReport,
    pub knowledge: KnowledgeReport,
    pub coupling: CouplingReport,
    pub anemic: AnemicReport,
    pub complexity: ComplexityReport,
    pub god_classes: GodClassReport,
    pub clustering: ClusteringReport,
    pub effort: EffortReport,
    pub dx: DXReport,
}

/// One joined row of a run-vs-run comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRow {
    pub key: String,
    pub from_value: Option<f64>,
    pub to_value: Option<f64>,
    pub delta: f64,
    pub status: DeltaStatus,
}

/// Per-table comparison of two stored runs, ordered by `started_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub run_a: String,
    pub run_b: String,
    pub hotspots: Vec<DeltaRow>,
    pub knowledge: Vec<DeltaRow>,
    pub pain: Vec<DeltaRow>,
    pub effort: Vec<DeltaRow>,
    pub complexity: Vec<DeltaRow>,
    pub anemic: Vec<DeltaRow>,
    pub god_classes: Vec<DeltaRow>,
    pub cognitive: Vec<DeltaRow>,
}
