//! Use-case layer: assembles the pipelines for one analysis run.
//!
//! Owns pipeline dependency order (PAIN needs coupling, effort needs
//! knowledge + coupling, DX needs five reports), the time window resolution,
//! and the only externally visible mutation: persisting a finished run.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::analyzers;
use crate::config::AnalysisConfig;
use crate::error::{Result, XraysError};
use crate::git::{GitRepository, SourceReader};
use crate::models::{
    AnalysisBundle, DeltaStatus, FileHotspotDelta, HotspotComparison, RepoSummary, Run,
};
use crate::pipelines::{clustering, coupling, dx, effort, hotspots, knowledge};
use crate::store::RunStore;

const DELTA_EPSILON: f64 = 1e-9;

/// Cooperative cancellation checked between pipeline stages. A cancelled run
/// is never persisted.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Which analyses the caller asked for; hotspots always run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selection {
    pub knowledge: bool,
    pub coupling: bool,
    pub anemic: bool,
    pub complexity: bool,
    pub god_classes: bool,
    pub clustering: bool,
    pub effort: bool,
    pub dx: bool,
}

/// Reports computed by [`Orchestrator::run_selected`].
pub struct SelectedReports {
    pub hotspots: crate::models::HotspotReport,
    pub knowledge: Option<crate::models::KnowledgeReport>,
    pub coupling: Option<crate::models::CouplingReport>,
    pub anemic: Option<crate::models::AnemicReport>,
    pub complexity: Option<crate::models::ComplexityReport>,
    pub god_classes: Option<crate::models::GodClassReport>,
    pub clustering: Option<crate::models::ClusteringReport>,
    pub effort: Option<crate::models::EffortReport>,
    pub dx: Option<crate::models::DXReport>,
}

pub struct Orchestrator<'a> {
    repo: &'a dyn GitRepository,
    source: &'a dyn SourceReader,
    repo_path: String,
    config: AnalysisConfig,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        repo: &'a dyn GitRepository,
        source: &'a dyn SourceReader,
        repo_path: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            source,
            repo_path: repo_path.into(),
            config: AnalysisConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn summary(&self) -> Result<RepoSummary> {
        Ok(RepoSummary {
            repo_path: self.repo_path.clone(),
            commit_count: self.repo.commit_count()?,
            first_commit_date: self.repo.first_commit_date()?,
            last_commit_date: self.repo.last_commit_date()?,
        })
    }

    /// Resolve the analysis window: anchored at `at` when given, else now.
    pub fn window(&self, window_days: u32, at: Option<&str>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let to = match at {
            Some(reference) => self.repo.resolve_ref(reference)?,
            None => Utc::now(),
        };
        Ok((to - Duration::days(window_days as i64), to))
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(XraysError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run the requested pipelines, pulling in their dependencies: effort
    /// needs knowledge and coupling, DX needs five reports. Reports are
    /// `Some` when computed, whether requested directly or as a dependency.
    pub fn run_selected(
        &self,
        window_days: u32,
        at: Option<&str>,
        selection: &Selection,
    ) -> Result<SelectedReports> {
        let (from, to) = self.window(window_days, at)?;
        let changes = self.repo.file_changes(Some(from), Some(to))?;
        let repo = self.repo_path.as_str();

        self.checkpoint()?;
        let hotspots = hotspots::analyze(&changes, repo, window_days, from, to, &self.config);

        let knowledge = if selection.knowledge || selection.effort || selection.dx {
            self.checkpoint()?;
            Some(knowledge::analyze(&changes, repo, window_days, from, to, &self.config))
        } else {
            None
        };

        let coupling = if selection.coupling || selection.effort || selection.dx {
            self.checkpoint()?;
            Some(coupling::analyze(&changes, repo, window_days, from, to))
        } else {
            None
        };

        let ast = if selection.anemic || selection.complexity || selection.god_classes || selection.dx
        {
            self.checkpoint()?;
            Some(analyzers::analyze_tree(self.source, repo, at, &self.config)?)
        } else {
            None
        };

        let clustering = if selection.clustering || selection.dx {
            self.checkpoint()?;
            Some(clustering::analyze(&changes, repo, window_days, from, to, &self.config))
        } else {
            None
        };

        let effort = if selection.effort {
            self.checkpoint()?;
            Some(effort::analyze(
                &changes,
                &hotspots,
                knowledge.as_ref().expect("dependency computed"),
                coupling.as_ref().expect("dependency computed"),
                &self.config,
            ))
        } else {
            None
        };

        let dx = if selection.dx {
            self.checkpoint()?;
            let densities = effort::commit_densities(&changes);
            let (complexity, _, _) = ast.as_ref().expect("dependency computed");
            Some(dx::analyze(
                &hotspots,
                knowledge.as_ref().expect("dependency computed"),
                coupling.as_ref().expect("dependency computed"),
                clustering.as_ref().expect("dependency computed"),
                complexity,
                &densities,
                &self.config,
            ))
        } else {
            None
        };

        let (complexity, anemic, god_classes) = match ast {
            Some((c, a, g)) => (Some(c), Some(a), Some(g)),
            None => (None, None, None),
        };

        Ok(SelectedReports {
            hotspots,
            knowledge,
            coupling,
            anemic,
            complexity,
            god_classes,
            clustering,
            effort,
            dx,
        })
    }

    /// Run every pipeline in dependency order and assemble the full bundle.
    pub fn run_all(&self, window_days: u32, at: Option<&str>) -> Result<(Run, AnalysisBundle)> {
        let started_at = Utc::now();
        let (from, to) = self.window(window_days, at)?;
        let changes = self.repo.file_changes(Some(from), Some(to))?;
        let repo = self.repo_path.as_str();

        self.checkpoint()?;
        let hotspots = hotspots::analyze(&changes, repo, window_days, from, to, &self.config);

        self.checkpoint()?;
        let knowledge = knowledge::analyze(&changes, repo, window_days, from, to, &self.config);

        self.checkpoint()?;
        let coupling = coupling::analyze(&changes, repo, window_days, from, to);

        self.checkpoint()?;
        let (complexity, anemic, god_classes) =
            analyzers::analyze_tree(self.source, repo, at, &self.config)?;

        self.checkpoint()?;
        let clustering = clustering::analyze(&changes, repo, window_days, from, to, &self.config);

        self.checkpoint()?;
        let effort = effort::analyze(&changes, &hotspots, &knowledge, &coupling, &self.config);

        self.checkpoint()?;
        let densities = effort::commit_densities(&changes);
        let dx = dx::analyze(
            &hotspots,
            &knowledge,
            &coupling,
            &clustering,
            &complexity,
            &densities,
            &self.config,
        );

        let summary = self.summary()?;
        let bundle = AnalysisBundle {
            empty_window: hotspots.total_commits == 0,
            hotspots,
            knowledge,
            coupling,
            anemic,
            complexity,
            god_classes,
            clustering,
            effort,
            dx,
        };
        let run = self.build_run(started_at, window_days, at, &summary, &bundle);
        Ok((run, bundle))
    }

    /// Run everything and persist the snapshot. Nothing is written when any
    /// stage fails or the run is cancelled.
    pub fn run_and_store(
        &self,
        store: &RunStore,
        window_days: u32,
        at: Option<&str>,
    ) -> Result<(Run, AnalysisBundle)> {
        let (run, bundle) = self.run_all(window_days, at)?;
        self.checkpoint()?;
        store.save(&run, &bundle)?;
        info!(run_id = %run.run_id, "analysis stored");
        Ok((run, bundle))
    }

    fn build_run(
        &self,
        started_at: DateTime<Utc>,
        window_days: u32,
        at: Option<&str>,
        summary: &RepoSummary,
        bundle: &AnalysisBundle,
    ) -> Run {
        Run {
            run_id: Uuid::new_v4().to_string(),
            repo_path: self.repo_path.clone(),
            window_days,
            started_at,
            ended_at: Utc::now(),
            from_date: bundle.hotspots.from_date,
            to_date: bundle.hotspots.to_date,
            total_commits: bundle.hotspots.total_commits,
            first_commit_date: summary.first_commit_date,
            last_commit_date: summary.last_commit_date,
            tree_ref: at.map(str::to_string),
            hotspot_file_count: bundle.hotspots.files.len(),
            dri: bundle.knowledge.dri,
            dri_min_authors: bundle.knowledge.dri_min_authors,
            island_count: bundle.knowledge.island_count,
            coupling_pair_count: bundle.coupling.pairs.len(),
            anemic_total_classes: bundle.anemic.total_classes,
            anemic_count: bundle.anemic.anemic_count,
            anemic_average_ams: bundle.anemic.average_ams,
            ams_threshold: bundle.anemic.ams_threshold,
            complexity_total_functions: bundle.complexity.total_functions,
            complexity_avg: bundle.complexity.avg_complexity,
            complexity_max: bundle.complexity.max_complexity,
            complexity_high_count: bundle.complexity.high_complexity_count,
            complexity_threshold: bundle.complexity.complexity_threshold,
            god_class_total: bundle.god_classes.total_classes,
            god_class_flagged: bundle.god_classes.flagged_count,
            gcs_threshold: bundle.god_classes.gcs_threshold,
            clustering_k: bundle.clustering.k,
            clustering_silhouette: bundle.clustering.silhouette,
            effort_total_files: bundle.effort.total_files,
            effort_r_squared: bundle.effort.r_squared,
            effort_alpha: bundle.effort.alpha,
            dx_score: bundle.dx.dx_score,
            dx_throughput: bundle.dx.throughput,
            dx_feedback: bundle.dx.feedback,
            dx_focus: bundle.dx.focus,
            dx_cognitive_load: bundle.dx.cognitive_load,
            effort_coefficients: bundle.effort.coefficients.clone(),
            dx_weights: bundle.dx.weights,
        }
    }

    /// Hotspot-vs-hotspot time travel: the same window anchored at two refs.
    pub fn compare_hotspots(
        &self,
        window_days: u32,
        from_ref: &str,
        to_ref: &str,
    ) -> Result<HotspotComparison> {
        let from_instant = self.repo.resolve_ref(from_ref)?;
        let to_instant = self.repo.resolve_ref(to_ref)?;

        let from_report = {
            let since = from_instant - Duration::days(window_days as i64);
            let changes = self.repo.file_changes(Some(since), Some(from_instant))?;
            hotspots::analyze(
                &changes,
                &self.repo_path,
                window_days,
                since,
                from_instant,
                &self.config,
            )
        };
        self.checkpoint()?;
        let to_report = {
            let since = to_instant - Duration::days(window_days as i64);
            let changes = self.repo.file_changes(Some(since), Some(to_instant))?;
            hotspots::analyze(
                &changes,
                &self.repo_path,
                window_days,
                since,
                to_instant,
                &self.config,
            )
        };

        let mut keys: std::collections::BTreeMap<String, (Option<usize>, Option<usize>)> =
            std::collections::BTreeMap::new();
        for (i, f) in from_report.files.iter().enumerate() {
            keys.entry(f.path.clone()).or_default().0 = Some(i);
        }
        for (i, f) in to_report.files.iter().enumerate() {
            keys.entry(f.path.clone()).or_default().1 = Some(i);
        }

        let mut files: Vec<FileHotspotDelta> = keys
            .into_iter()
            .map(|(path, (a, b))| {
                let from = a.map(|i| &from_report.files[i]);
                let to = b.map(|i| &to_report.files[i]);
                let from_score = from.map(|f| f.hotspot_score).unwrap_or(0.0);
                let to_score = to.map(|f| f.hotspot_score).unwrap_or(0.0);
                let delta = to_score - from_score;
                let status = match (from, to) {
                    (None, Some(_)) => DeltaStatus::New,
                    (Some(_), None) => DeltaStatus::Removed,
                    _ if delta.abs() < DELTA_EPSILON => DeltaStatus::Unchanged,
                    _ if delta < 0.0 => DeltaStatus::Improved,
                    _ => DeltaStatus::Degraded,
                };
                FileHotspotDelta {
                    path,
                    from_score,
                    to_score,
                    score_delta: delta,
                    from_churn: from.map(|f| f.churn).unwrap_or(0),
                    to_churn: to.map(|f| f.churn).unwrap_or(0),
                    from_frequency: from.map(|f| f.frequency).unwrap_or(0),
                    to_frequency: to.map(|f| f.frequency).unwrap_or(0),
                    status,
                }
            })
            .collect();
        files.sort_by(|a, b| {
            b.score_delta
                .abs()
                .partial_cmp(&a.score_delta.abs())
                .expect("finite delta")
                .then_with(|| a.path.cmp(&b.path))
        });

        let count = |status: DeltaStatus| files.iter().filter(|f| f.status == status).count();

        Ok(HotspotComparison {
            repo_path: self.repo_path.clone(),
            from_ref: from_ref.to_string(),
            to_ref: to_ref.to_string(),
            from_date: from_instant,
            to_date: to_instant,
            window_days,
            from_total_commits: from_report.total_commits,
            to_total_commits: to_report.total_commits,
            new_count: count(DeltaStatus::New),
            removed_count: count(DeltaStatus::Removed),
            improved_count: count(DeltaStatus::Improved),
            degraded_count: count(DeltaStatus::Degraded),
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
