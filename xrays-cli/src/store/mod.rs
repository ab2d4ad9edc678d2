//! Run store: snapshot persistence on redb.
//!
//! One `runs` table plus eleven child tables keyed by
//! `(run_id, natural_key)` composite string keys, values serialized with
//! serde_json. A save is a single write transaction; a failed save persists
//! nothing. Reads reconstruct reports equal by value to the originals.

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::models::{
    AnalysisBundle, AnemicReport, ClusteringReport, ComplexityReport, CouplingReport, DXReport,
    DeltaRow, DeltaStatus, EffortReport, GodClassReport, HotspotReport, KnowledgeReport, Run,
    RunComparison,
};
use crate::error::{Result, XraysError};
use crate::pipelines::hotspots::pareto_buckets;

const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");
const HOTSPOT_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("hotspot_files");
const KNOWLEDGE_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("knowledge_files");
const COUPLING_PAIRS: TableDefinition<&str, &[u8]> = TableDefinition::new("coupling_pairs");
const FILE_PAIN: TableDefinition<&str, &[u8]> = TableDefinition::new("file_pain");
const ANEMIC_CLASSES: TableDefinition<&str, &[u8]> = TableDefinition::new("anemic_classes");
const COMPLEXITY_FUNCTIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("complexity_functions");
const CLUSTER_SUMMARIES: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster_summaries");
const CLUSTER_DRIFT: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster_drift");
const EFFORT_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("effort_files");
const DX_COGNITIVE_FILES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("dx_cognitive_files");
const GOD_CLASS_CLASSES: TableDefinition<&str, &[u8]> = TableDefinition::new("god_class_classes");

/// Separator for composite keys; never appears in paths or identifiers.
const SEP: char = '\u{0}';

/// Delta below this reads as unchanged.
const DELTA_EPSILON: f64 = 1e-9;

pub struct RunStore {
    db: Database,
}

impl RunStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| XraysError::Store(format!("create {}: {e}", parent.display())))?;
        }
        let db = Database::create(path)?;
        debug!(path = %path.display(), "opened run store");
        Ok(Self { db })
    }

    /// Persist a run and all its child rows in one transaction.
    pub fn save(&self, run: &Run, bundle: &AnalysisBundle) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut runs = txn.open_table(RUNS)?;
            runs.insert(run.run_id.as_str(), serde_json::to_vec(run)?.as_slice())?;

            let mut table = txn.open_table(HOTSPOT_FILES)?;
            for row in &bundle.hotspots.files {
                insert_row(&mut table, &run.run_id, &row.path, row)?;
            }

            let mut table = txn.open_table(KNOWLEDGE_FILES)?;
            for row in &bundle.knowledge.files {
                insert_row(&mut table, &run.run_id, &row.path, row)?;
            }

            let mut table = txn.open_table(COUPLING_PAIRS)?;
            for row in &bundle.coupling.pairs {
                let key = format!("{}{SEP}{}", row.file_a, row.file_b);
                insert_row(&mut table, &run.run_id, &key, row)?;
            }

            let mut table = txn.open_table(FILE_PAIN)?;
            for row in &bundle.coupling.file_pain {
                insert_row(&mut table, &run.run_id, &row.path, row)?;
            }

            let mut table = txn.open_table(ANEMIC_CLASSES)?;
            for row in &bundle.anemic.classes {
                let key = format!("{}{SEP}{}", row.file, row.name);
                insert_row(&mut table, &run.run_id, &key, row)?;
            }

            let mut table = txn.open_table(COMPLEXITY_FUNCTIONS)?;
            for row in &bundle.complexity.functions {
                let key = format!("{}{SEP}{}{SEP}{}", row.file, row.name, row.line);
                insert_row(&mut table, &run.run_id, &key, row)?;
            }

            let mut table = txn.open_table(CLUSTER_SUMMARIES)?;
            for row in &bundle.clustering.clusters {
                insert_row(&mut table, &run.run_id, &format!("{:06}", row.id), row)?;
            }

            // Drift rows may repeat a label; a sequence number keys them.
            let mut table = txn.open_table(CLUSTER_DRIFT)?;
            for (i, row) in bundle.clustering.drift.iter().enumerate() {
                insert_row(&mut table, &run.run_id, &format!("{i:06}"), row)?;
            }

            let mut table = txn.open_table(EFFORT_FILES)?;
            for row in &bundle.effort.files {
                insert_row(&mut table, &run.run_id, &row.path, row)?;
            }

            let mut table = txn.open_table(DX_COGNITIVE_FILES)?;
            for row in &bundle.dx.files {
                insert_row(&mut table, &run.run_id, &row.path, row)?;
            }

            let mut table = txn.open_table(GOD_CLASS_CLASSES)?;
            for row in &bundle.god_classes.classes {
                let key = format!("{}{SEP}{}", row.file, row.name);
                insert_row(&mut table, &run.run_id, &key, row)?;
            }
        }
        txn.commit()?;
        info!(run_id = %run.run_id, repo = %run.repo_path, "run persisted");
        Ok(())
    }

    /// Distinct repository paths, sorted ascending.
    pub fn list_repos(&self) -> Result<Vec<String>> {
        let mut repos: Vec<String> = self
            .all_runs()?
            .into_iter()
            .map(|r| r.repo_path)
            .collect();
        repos.sort();
        repos.dedup();
        Ok(repos)
    }

    /// Runs for one repository, newest first.
    pub fn list_runs(&self, repo_path: &str) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .all_runs()?
            .into_iter()
            .filter(|r| r.repo_path == repo_path)
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Every stored run, newest first.
    pub fn all_runs(&self) -> Result<Vec<Run>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(RUNS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut runs = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            runs.push(serde_json::from_slice(value.value())?);
        }
        runs.sort_by(|a: &Run, b: &Run| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(RUNS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => {
                return Err(XraysError::NotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        match table.get(run_id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(XraysError::NotFound(run_id.to_string())),
        }
    }

    fn child_rows<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<&str, &[u8]>,
        run_id: &str,
    ) -> Result<Vec<T>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(table_def) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let start = format!("{run_id}{SEP}");
        let end = format!("{run_id}\u{1}");
        let mut rows = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }

    pub fn get_hotspot_files(&self, run_id: &str) -> Result<Vec<crate::models::FileMetrics>> {
        self.child_rows(HOTSPOT_FILES, run_id)
    }

    pub fn get_knowledge_files(&self, run_id: &str) -> Result<Vec<crate::models::FileKnowledge>> {
        self.child_rows(KNOWLEDGE_FILES, run_id)
    }

    pub fn get_coupling_pairs(&self, run_id: &str) -> Result<Vec<crate::models::CouplingPair>> {
        self.child_rows(COUPLING_PAIRS, run_id)
    }

    pub fn get_file_pain(&self, run_id: &str) -> Result<Vec<crate::models::FilePain>> {
        self.child_rows(FILE_PAIN, run_id)
    }

    pub fn get_anemic_classes(&self, run_id: &str) -> Result<Vec<crate::models::ClassMetrics>> {
        self.child_rows(ANEMIC_CLASSES, run_id)
    }

    pub fn get_complexity_functions(
        &self,
        run_id: &str,
    ) -> Result<Vec<crate::models::FunctionComplexity>> {
        self.child_rows(COMPLEXITY_FUNCTIONS, run_id)
    }

    pub fn get_cluster_summaries(
        &self,
        run_id: &str,
    ) -> Result<Vec<crate::models::ClusterSummary>> {
        self.child_rows(CLUSTER_SUMMARIES, run_id)
    }

    pub fn get_cluster_drift(&self, run_id: &str) -> Result<Vec<crate::models::ClusterDrift>> {
        self.child_rows(CLUSTER_DRIFT, run_id)
    }

    pub fn get_effort_files(&self, run_id: &str) -> Result<Vec<crate::models::FileEffort>> {
        self.child_rows(EFFORT_FILES, run_id)
    }

    pub fn get_dx_cognitive_files(
        &self,
        run_id: &str,
    ) -> Result<Vec<crate::models::FileCognitiveLoad>> {
        self.child_rows(DX_COGNITIVE_FILES, run_id)
    }

    pub fn get_god_classes(&self, run_id: &str) -> Result<Vec<crate::models::GodClassMetrics>> {
        self.child_rows(GOD_CLASS_CLASSES, run_id)
    }

    /// Rebuild the full bundle for a stored run, equal by value to what was
    /// saved.
    pub fn get_bundle(&self, run_id: &str) -> Result<(Run, AnalysisBundle)> {
        let run = self.get_run(run_id)?;

        let mut hotspot_files = self.get_hotspot_files(run_id)?;
        hotspot_files.sort_by(|a, b| {
            b.hotspot_score
                .partial_cmp(&a.hotspot_score)
                .expect("finite score")
                .then_with(|| a.path.cmp(&b.path))
        });
        let pareto = pareto_buckets(&hotspot_files);
        let hotspots = HotspotReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_commits: run.total_commits,
            files: hotspot_files,
            pareto,
        };

        let mut knowledge_files = self.get_knowledge_files(run_id)?;
        knowledge_files.sort_by(|a, b| {
            b.kdi
                .partial_cmp(&a.kdi)
                .expect("finite kdi")
                .then_with(|| a.path.cmp(&b.path))
        });
        let knowledge = KnowledgeReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_commits: run.total_commits,
            dri: run.dri,
            dri_min_authors: run.dri_min_authors,
            island_count: run.island_count,
            files: knowledge_files,
        };

        let mut pairs = self.get_coupling_pairs(run_id)?;
        pairs.sort_by(|a, b| {
            b.jaccard
                .partial_cmp(&a.jaccard)
                .expect("finite jaccard")
                .then_with(|| a.file_a.cmp(&b.file_a))
                .then_with(|| a.file_b.cmp(&b.file_b))
        });
        let mut file_pain = self.get_file_pain(run_id)?;
        file_pain.sort_by(|a, b| {
            b.pain
                .partial_cmp(&a.pain)
                .expect("finite pain")
                .then_with(|| a.path.cmp(&b.path))
        });
        let coupling = CouplingReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_commits: run.total_commits,
            pairs,
            file_pain,
        };

        let mut anemic_classes = self.get_anemic_classes(run_id)?;
        anemic_classes.sort_by(|a, b| {
            b.ams
                .partial_cmp(&a.ams)
                .expect("finite ams")
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.name.cmp(&b.name))
        });
        let anemic_files = distinct(anemic_classes.iter().map(|c| c.file.as_str()));
        let anemic = AnemicReport {
            repo_path: run.repo_path.clone(),
            tree_ref: run.tree_ref.clone(),
            total_files: anemic_files,
            total_classes: run.anemic_total_classes,
            anemic_count: run.anemic_count,
            average_ams: run.anemic_average_ams,
            ams_threshold: run.ams_threshold,
            classes: anemic_classes,
        };

        let mut functions = self.get_complexity_functions(run_id)?;
        functions.sort_by(|a, b| {
            b.cyclomatic
                .cmp(&a.cyclomatic)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        let complexity_files = distinct(functions.iter().map(|f| f.file.as_str()));
        let complexity = ComplexityReport {
            repo_path: run.repo_path.clone(),
            tree_ref: run.tree_ref.clone(),
            total_files: complexity_files,
            total_functions: run.complexity_total_functions,
            avg_complexity: run.complexity_avg,
            max_complexity: run.complexity_max,
            high_complexity_count: run.complexity_high_count,
            complexity_threshold: run.complexity_threshold,
            functions,
        };

        let mut god_rows = self.get_god_classes(run_id)?;
        god_rows.sort_by(|a, b| {
            b.gcs
                .partial_cmp(&a.gcs)
                .expect("finite gcs")
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.name.cmp(&b.name))
        });
        let god_classes = GodClassReport {
            repo_path: run.repo_path.clone(),
            tree_ref: run.tree_ref.clone(),
            total_classes: run.god_class_total,
            flagged_count: run.god_class_flagged,
            worst_gcs: god_rows.first().map(|c| c.gcs).unwrap_or(0.0),
            gcs_threshold: run.gcs_threshold,
            classes: god_rows,
        };

        let mut clusters = self.get_cluster_summaries(run_id)?;
        clusters.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.id.cmp(&b.id)));
        let clustering = ClusteringReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_commits: run.total_commits,
            k: run.clustering_k,
            silhouette: run.clustering_silhouette,
            clusters,
            drift: self.get_cluster_drift(run_id)?,
        };

        let mut effort_files = self.get_effort_files(run_id)?;
        effort_files.sort_by(|a, b| {
            b.rei
                .partial_cmp(&a.rei)
                .expect("finite rei")
                .then_with(|| a.path.cmp(&b.path))
        });
        let effort = EffortReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_files: run.effort_total_files,
            r_squared: run.effort_r_squared,
            alpha: run.effort_alpha,
            coefficients: run.effort_coefficients.clone(),
            files: effort_files,
        };

        let mut dx_files = self.get_dx_cognitive_files(run_id)?;
        dx_files.sort_by(|a, b| {
            b.composite_load
                .partial_cmp(&a.composite_load)
                .expect("finite load")
                .then_with(|| a.path.cmp(&b.path))
        });
        let dx = DXReport {
            repo_path: run.repo_path.clone(),
            window_days: run.window_days,
            from_date: run.from_date,
            to_date: run.to_date,
            total_commits: run.total_commits,
            total_files: dx_files.len(),
            throughput: run.dx_throughput,
            feedback: run.dx_feedback,
            focus: run.dx_focus,
            cognitive_load: run.dx_cognitive_load,
            dx_score: run.dx_score,
            weights: run.dx_weights,
            files: dx_files,
        };

        let empty_window = run.total_commits == 0;
        Ok((
            run,
            AnalysisBundle {
                empty_window,
                hotspots,
                knowledge,
                coupling,
                anemic,
                complexity,
                god_classes,
                clustering,
                effort,
                dx,
            },
        ))
    }

    /// Join two runs per child table and classify every row.
    /// Runs are ordered by `started_at`: A is always the older snapshot.
    pub fn compare(&self, id_a: &str, id_b: &str) -> Result<RunComparison> {
        let run_a = self.get_run(id_a)?;
        let run_b = self.get_run(id_b)?;
        let (older, newer) = if run_a.started_at <= run_b.started_at {
            (run_a, run_b)
        } else {
            (run_b, run_a)
        };

        // A drop in any of these metrics is an improvement; for KDI a rise
        // means knowledge concentrated further, which is the degradation.
        let hotspots = join_rows(
            self.get_hotspot_files(&older.run_id)?,
            self.get_hotspot_files(&newer.run_id)?,
            |r| r.path.clone(),
            |r| r.hotspot_score,
        );
        let knowledge = join_rows(
            self.get_knowledge_files(&older.run_id)?,
            self.get_knowledge_files(&newer.run_id)?,
            |r| r.path.clone(),
            |r| r.kdi,
        );
        let pain = join_rows(
            self.get_file_pain(&older.run_id)?,
            self.get_file_pain(&newer.run_id)?,
            |r| r.path.clone(),
            |r| r.pain,
        );
        let effort = join_rows(
            self.get_effort_files(&older.run_id)?,
            self.get_effort_files(&newer.run_id)?,
            |r| r.path.clone(),
            |r| r.rei,
        );
        let complexity = join_rows(
            self.get_complexity_functions(&older.run_id)?,
            self.get_complexity_functions(&newer.run_id)?,
            |r| format!("{}::{}", r.file, r.name),
            |r| r.cyclomatic as f64,
        );
        let anemic = join_rows(
            self.get_anemic_classes(&older.run_id)?,
            self.get_anemic_classes(&newer.run_id)?,
            |r| format!("{}::{}", r.file, r.name),
            |r| r.ams,
        );
        let god_classes = join_rows(
            self.get_god_classes(&older.run_id)?,
            self.get_god_classes(&newer.run_id)?,
            |r| format!("{}::{}", r.file, r.name),
            |r| r.gcs,
        );
        let cognitive = join_rows(
            self.get_dx_cognitive_files(&older.run_id)?,
            self.get_dx_cognitive_files(&newer.run_id)?,
            |r| r.path.clone(),
            |r| r.composite_load,
        );

        Ok(RunComparison {
            run_a: older.run_id,
            run_b: newer.run_id,
            hotspots,
            knowledge,
            pain,
            effort,
            complexity,
            anemic,
            god_classes,
            cognitive,
        })
    }
}

fn insert_row<T: Serialize>(
    table: &mut redb::Table<'_, &str, &[u8]>,
    run_id: &str,
    natural_key: &str,
    row: &T,
) -> Result<()> {
    let key = format!("{run_id}{SEP}{natural_key}");
    table.insert(key.as_str(), serde_json::to_vec(row)?.as_slice())?;
    Ok(())
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    let mut seen: Vec<&str> = values.collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn join_rows<T>(
    older: Vec<T>,
    newer: Vec<T>,
    key_of: impl Fn(&T) -> String,
    value_of: impl Fn(&T) -> f64,
) -> Vec<DeltaRow> {
    use std::collections::BTreeMap;

    let mut keys: BTreeMap<String, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for row in &older {
        keys.entry(key_of(row)).or_default().0 = Some(value_of(row));
    }
    for row in &newer {
        keys.entry(key_of(row)).or_default().1 = Some(value_of(row));
    }

    let mut rows: Vec<DeltaRow> = keys
        .into_iter()
        .map(|(key, (from, to))| {
            let (delta, status) = match (from, to) {
                (None, Some(_)) => (to.unwrap_or(0.0), DeltaStatus::New),
                (Some(_), None) => (-from.unwrap_or(0.0), DeltaStatus::Removed),
                (Some(a), Some(b)) => {
                    let delta = b - a;
                    let status = if delta.abs() < DELTA_EPSILON {
                        DeltaStatus::Unchanged
                    } else if delta < 0.0 {
                        DeltaStatus::Improved
                    } else {
                        DeltaStatus::Degraded
                    };
                    (delta, status)
                }
                (None, None) => (0.0, DeltaStatus::Unchanged),
            };
            DeltaRow {
                key,
                from_value: from,
                to_value: to,
                delta,
                status,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.delta
            .abs()
            .partial_cmp(&a.delta.abs())
            .expect("finite delta")
            .then_with(|| a.key.cmp(&b.key))
    });
    rows
}
