//! AST analyzers: complexity, anemic-model, and god-class detection.
//!
//! Two front-ends normalize to the same per-file structural summary: the
//! canonical Python analyzer built on rustpython-parser, and a Java analyzer
//! driven by the external tree-sitter grammar. Everything downstream of the
//! summary is language-independent.

pub mod java;
pub mod python;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::git::SourceReader;
use crate::models::{
    AnemicReport, ClassMetrics, ComplexityReport, FunctionComplexity, GodClassMetrics,
    GodClassReport,
};
use crate::pipelines::numeric::min_max;

/// Language-neutral structural summary of one source file.
#[derive(Debug, Clone, Default)]
pub struct FileAst {
    pub path: String,
    pub functions: Vec<FunctionComplexity>,
    /// Anemic-model rows; `touch_count` is filled in during aggregation.
    pub classes: Vec<ClassMetrics>,
    pub god_candidates: Vec<GodCandidate>,
    /// Base names of modules/classes this file imports.
    pub imports: Vec<String>,
}

/// Raw god-class measurements; GCS needs run-level normalization.
#[derive(Debug, Clone)]
pub struct GodCandidate {
    pub name: String,
    pub method_count: usize,
    pub field_count: usize,
    pub wmc: u64,
    pub tcc: f64,
}

/// Dispatch one file to the front-end matching its extension.
pub fn analyze_source(path: &str, source: &str) -> Option<FileAst> {
    if path.ends_with(".py") {
        Some(python::analyze_source(source, path))
    } else if path.ends_with(".java") {
        Some(java::analyze_source(source, path))
    } else {
        None
    }
}

/// Run all three structural analyses over the tree at `tree_ref`.
pub fn analyze_tree(
    reader: &dyn SourceReader,
    repo_path: &str,
    tree_ref: Option<&str>,
    config: &AnalysisConfig,
) -> Result<(ComplexityReport, AnemicReport, GodClassReport)> {
    let paths = reader.list_source_files(tree_ref)?;

    // Blob reads go through one repository handle; parsing fans out.
    let mut sources: Vec<(String, String)> = Vec::with_capacity(paths.len());
    for path in &paths {
        match reader.read_file(path, tree_ref) {
            Ok(bytes) => sources.push((path.clone(), String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) => warn!(%path, error = %e, "skipping unreadable blob"),
        }
    }

    let mut summaries: Vec<FileAst> = sources
        .par_iter()
        .filter_map(|(path, source)| analyze_source(path, source))
        .collect();
    summaries.sort_by(|a, b| a.path.cmp(&b.path));

    apply_touch_counts(&mut summaries);
    debug!(files = summaries.len(), "analyzed source tree");

    let complexity = build_complexity_report(repo_path, tree_ref, &summaries, config);
    let anemic = build_anemic_report(repo_path, tree_ref, &summaries, config);
    let god = build_god_class_report(repo_path, tree_ref, &summaries, config);
    Ok((complexity, anemic, god))
}

/// Import-reference heuristic: a file is "touched" once per other file whose
/// imports mention its base name.
fn apply_touch_counts(summaries: &mut [FileAst]) {
    let mut stem_to_index: FxHashMap<String, usize> = FxHashMap::default();
    for (i, s) in summaries.iter().enumerate() {
        stem_to_index.insert(file_stem(&s.path), i);
    }

    let mut counts = vec![0usize; summaries.len()];
    for (i, s) in summaries.iter().enumerate() {
        for import in &s.imports {
            if let Some(&target) = stem_to_index.get(import.as_str()) {
                if target != i {
                    counts[target] += 1;
                }
            }
        }
    }
    for (s, count) in summaries.iter_mut().zip(counts) {
        for class in &mut s.classes {
            class.touch_count = count;
        }
    }
}

fn file_stem(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| base.to_string())
}

fn build_complexity_report(
    repo_path: &str,
    tree_ref: Option<&str>,
    summaries: &[FileAst],
    config: &AnalysisConfig,
) -> ComplexityReport {
    let mut functions: Vec<FunctionComplexity> = summaries
        .iter()
        .flat_map(|s| s.functions.iter().cloned())
        .collect();
    functions.sort_by(|a, b| {
        b.cyclomatic
            .cmp(&a.cyclomatic)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line.cmp(&b.line))
    });

    let total_functions = functions.len();
    let total_cc: u64 = functions.iter().map(|f| f.cyclomatic).sum();
    let file_count = summaries
        .iter()
        .filter(|s| !s.functions.is_empty())
        .count();

    ComplexityReport {
        repo_path: repo_path.to_string(),
        tree_ref: tree_ref.map(str::to_string),
        total_files: file_count,
        total_functions,
        avg_complexity: if total_functions > 0 {
            total_cc as f64 / total_functions as f64
        } else {
            0.0
        },
        max_complexity: functions.first().map(|f| f.cyclomatic).unwrap_or(0),
        high_complexity_count: functions
            .iter()
            .filter(|f| f.cyclomatic > config.complexity_threshold)
            .count(),
        complexity_threshold: config.complexity_threshold,
        functions,
    }
}

fn build_anemic_report(
    repo_path: &str,
    tree_ref: Option<&str>,
    summaries: &[FileAst],
    config: &AnalysisConfig,
) -> AnemicReport {
    let mut classes: Vec<ClassMetrics> = summaries
        .iter()
        .flat_map(|s| s.classes.iter().cloned())
        .collect();
    classes.sort_by(|a, b| {
        b.ams
            .partial_cmp(&a.ams)
            .expect("finite ams")
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_classes = classes.len();
    let anemic_count = classes
        .iter()
        .filter(|c| c.ams > config.ams_threshold)
        .count();
    let file_count = summaries.iter().filter(|s| !s.classes.is_empty()).count();

    AnemicReport {
        repo_path: repo_path.to_string(),
        tree_ref: tree_ref.map(str::to_string),
        total_files: file_count,
        total_classes,
        anemic_count,
        average_ams: if total_classes > 0 {
            classes.iter().map(|c| c.ams).sum::<f64>() / total_classes as f64
        } else {
            0.0
        },
        ams_threshold: config.ams_threshold,
        classes,
    }
}

/// GCS = 0.3 norm(methods) + 0.3 norm(WMC) + 0.2 norm(fields) + 0.2 (1 - TCC),
/// min-max-normalized across every class in the run.
fn build_god_class_report(
    repo_path: &str,
    tree_ref: Option<&str>,
    summaries: &[FileAst],
    config: &AnalysisConfig,
) -> GodClassReport {
    let candidates: Vec<(&str, &GodCandidate)> = summaries
        .iter()
        .flat_map(|s| s.god_candidates.iter().map(move |c| (s.path.as_str(), c)))
        .collect();

    let methods: Vec<f64> = candidates.iter().map(|(_, c)| c.method_count as f64).collect();
    let wmcs: Vec<f64> = candidates.iter().map(|(_, c)| c.wmc as f64).collect();
    let fields: Vec<f64> = candidates.iter().map(|(_, c)| c.field_count as f64).collect();
    let m_norm = min_max(&methods);
    let w_norm = min_max(&wmcs);
    let f_norm = min_max(&fields);

    let mut classes: Vec<GodClassMetrics> = candidates
        .iter()
        .enumerate()
        .map(|(i, (file, c))| {
            let gcs =
                0.3 * m_norm[i] + 0.3 * w_norm[i] + 0.2 * f_norm[i] + 0.2 * (1.0 - c.tcc);
            GodClassMetrics {
                file: file.to_string(),
                name: c.name.clone(),
                method_count: c.method_count,
                field_count: c.field_count,
                wmc: c.wmc,
                tcc: c.tcc,
                gcs,
                flagged: gcs > config.gcs_threshold,
            }
        })
        .collect();
    classes.sort_by(|a, b| {
        b.gcs
            .partial_cmp(&a.gcs)
            .expect("finite gcs")
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.name.cmp(&b.name))
    });

    GodClassReport {
        repo_path: repo_path.to_string(),
        tree_ref: tree_ref.map(str::to_string),
        total_classes: classes.len(),
        flagged_count: classes.iter().filter(|c| c.flagged).count(),
        worst_gcs: classes.first().map(|c| c.gcs).unwrap_or(0.0),
        gcs_threshold: config.gcs_threshold,
        classes,
    }
}
