//! Effort modeling pipeline.
//!
//! Closed-form ridge regression over six behavioral features, solved with
//! Gauss-Jordan elimination and partial pivoting. Alpha comes from a grid
//! search scored by leave-one-out squared error (5-fold past 50 samples).
//! The output is the Relative Effort Index per file plus a full per-feature
//! attribution, so every weight in the model is surfaced.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{Result, XraysError};
use crate::models::{
    CouplingReport, EffortReport, FileChange, FileEffort, HotspotReport, KnowledgeReport,
};
use crate::pipelines::numeric::{median, min_max};

pub const FEATURE_NAMES: [&str; 6] = [
    "churn",
    "frequency",
    "pain",
    "knowledge_concentration",
    "author_count",
    "knowledge_x_pain",
];

const PIVOT_EPSILON: f64 = 1e-12;
const MIN_FILES_FOR_MODEL: usize = 3;
const FOLDS: usize = 5;

/// Commit density per file: 1 / (1 + median interval in days). Files with a
/// single commit get 1.0.
pub fn commit_densities(changes: &[FileChange]) -> FxHashMap<String, f64> {
    let mut dates: FxHashMap<String, Vec<DateTime<Utc>>> = FxHashMap::default();
    let mut seen: FxHashMap<(String, String), ()> = FxHashMap::default();
    for c in changes {
        if seen
            .insert((c.path.clone(), c.commit_id.clone()), ())
            .is_none()
        {
            dates.entry(c.path.clone()).or_default().push(c.timestamp);
        }
    }

    dates
        .into_iter()
        .map(|(path, mut ts)| {
            if ts.len() <= 1 {
                return (path, 1.0);
            }
            ts.sort();
            let intervals: Vec<f64> = ts
                .windows(2)
                .map(|w| (w[1] - w[0]).num_seconds() as f64 / 86_400.0)
                .collect();
            (path, 1.0 / (1.0 + median(&intervals)))
        })
        .collect()
}

/// Solve `beta = (X^T X + alpha I)^-1 X^T y` by Gauss-Jordan elimination on
/// the augmented matrix with partial pivoting. An effectively zero pivot is
/// an ill-conditioned system and is rejected explicitly.
pub fn ridge_regression(x: &[Vec<f64>], y: &[f64], alpha: f64) -> Result<Vec<f64>> {
    let n = x.len();
    if n == 0 {
        return Err(XraysError::Analysis("empty design matrix".into()));
    }
    let p = x[0].len();

    // X^T X + alpha I, augmented with X^T y.
    let mut aug = vec![vec![0.0; p + 1]; p];
    for i in 0..p {
        for j in 0..p {
            let mut s = 0.0;
            for row in x.iter().take(n) {
                s += row[i] * row[j];
            }
            aug[i][j] = s;
        }
        aug[i][i] += alpha;
        let mut s = 0.0;
        for (row, &yk) in x.iter().zip(y) {
            s += row[i] * yk;
        }
        aug[i][p] = s;
    }

    for col in 0..p {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..p {
            if aug[row][col].abs() > max_val {
                max_val = aug[row][col].abs();
                max_row = row;
            }
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        if pivot.abs() < PIVOT_EPSILON {
            return Err(XraysError::Analysis(
                "ill-conditioned ridge system".into(),
            ));
        }
        for j in col..=p {
            aug[col][j] /= pivot;
        }
        for row in 0..p {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in col..=p {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    Ok((0..p).map(|i| aug[i][p]).collect())
}

/// Coefficient of determination; 0.0 for a constant target.
pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean) * (y - mean)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    1.0 - ss_res / ss_tot
}

fn predict(x: &[Vec<f64>], beta: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|row| row.iter().zip(beta).map(|(a, b)| a * b).sum())
        .collect()
}

/// Cross-validated squared error for one alpha: leave-one-out up to the
/// sample limit, contiguous 5-fold beyond it.
fn cv_error(x: &[Vec<f64>], y: &[f64], alpha: f64, loo_limit: usize) -> f64 {
    let n = x.len();
    let folds = if n <= loo_limit { n } else { FOLDS };
    let mut error = 0.0;

    for fold in 0..folds {
        let holdout: Vec<usize> = (0..n).filter(|i| i % folds == fold).collect();
        if holdout.len() == n {
            continue;
        }
        let train_x: Vec<Vec<f64>> = (0..n)
            .filter(|i| i % folds != fold)
            .map(|i| x[i].clone())
            .collect();
        let train_y: Vec<f64> = (0..n).filter(|i| i % folds != fold).map(|i| y[i]).collect();

        match ridge_regression(&train_x, &train_y, alpha) {
            Ok(beta) => {
                for &i in &holdout {
                    let pred: f64 = x[i].iter().zip(&beta).map(|(a, b)| a * b).sum();
                    error += (y[i] - pred) * (y[i] - pred);
                }
            }
            Err(_) => return f64::INFINITY,
        }
    }
    error
}

pub fn analyze(
    changes: &[FileChange],
    hotspots: &HotspotReport,
    knowledge: &KnowledgeReport,
    coupling: &CouplingReport,
    config: &AnalysisConfig,
) -> EffortReport {
    let paths: Vec<String> = hotspots.files.iter().map(|f| f.path.clone()).collect();
    let n = paths.len();

    let know_map: FxHashMap<&str, _> = knowledge
        .files
        .iter()
        .map(|f| (f.path.as_str(), f))
        .collect();
    let pain_map: FxHashMap<&str, f64> = coupling
        .file_pain
        .iter()
        .map(|f| (f.path.as_str(), f.pain))
        .collect();

    // Raw feature matrix in FEATURE_NAMES order, then per-column min-max.
    let raw: Vec<Vec<f64>> = hotspots
        .files
        .iter()
        .map(|h| {
            let kdi = know_map.get(h.path.as_str()).map(|k| k.kdi).unwrap_or(0.0);
            let authors = know_map
                .get(h.path.as_str())
                .map(|k| k.author_count())
                .unwrap_or(1);
            let pain = pain_map.get(h.path.as_str()).copied().unwrap_or(0.0);
            vec![
                h.churn as f64,
                h.frequency as f64,
                pain,
                kdi,
                authors as f64,
                kdi * pain,
            ]
        })
        .collect();
    let x = normalize_columns(&raw);

    // Proxy label: 0.5 * norm(density) + 0.5 * norm(rework).
    let densities = commit_densities(changes);
    let density_col: Vec<f64> = paths
        .iter()
        .map(|p| densities.get(p).copied().unwrap_or(0.0))
        .collect();
    let rework_col: Vec<f64> = hotspots.files.iter().map(|f| f.rework_ratio).collect();
    let density_norm = min_max(&density_col);
    let rework_norm = min_max(&rework_col);
    let labels: Vec<f64> = density_norm
        .iter()
        .zip(&rework_norm)
        .map(|(d, r)| 0.5 * d + 0.5 * r)
        .collect();

    let (alpha, beta, r2, rei) = if n < MIN_FILES_FOR_MODEL {
        let beta = vec![1.0 / FEATURE_NAMES.len() as f64; FEATURE_NAMES.len()];
        (0.0, beta, 0.0, labels.clone())
    } else {
        let mut best_alpha = config.ridge_alphas[0];
        let mut best_error = f64::INFINITY;
        for &candidate in &config.ridge_alphas {
            let err = cv_error(&x, &labels, candidate, config.loo_sample_limit);
            if err < best_error {
                best_error = err;
                best_alpha = candidate;
            }
        }
        match ridge_regression(&x, &labels, best_alpha) {
            Ok(beta) => {
                let fitted = predict(&x, &beta);
                let r2 = r_squared(&labels, &fitted);
                let rei = min_max(&fitted);
                (best_alpha, beta, r2, rei)
            }
            Err(e) => {
                debug!(error = %e, "ridge fit rejected, falling back to uniform weights");
                let beta = vec![1.0 / FEATURE_NAMES.len() as f64; FEATURE_NAMES.len()];
                (0.0, beta, 0.0, labels.clone())
            }
        }
    };

    let coefficients: BTreeMap<String, f64> = FEATURE_NAMES
        .iter()
        .zip(&beta)
        .map(|(name, b)| (name.to_string(), *b))
        .collect();

    let mut files: Vec<FileEffort> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let contributions: BTreeMap<String, f64> = FEATURE_NAMES
                .iter()
                .enumerate()
                .map(|(j, name)| (name.to_string(), beta[j] * x[i][j]))
                .collect();
            FileEffort {
                path: path.clone(),
                rei: rei[i],
                proxy_label: labels[i],
                contributions,
            }
        })
        .collect();
    files.sort_by(|a, b| {
        b.rei
            .partial_cmp(&a.rei)
            .expect("finite rei")
            .then_with(|| a.path.cmp(&b.path))
    });

    debug!(files = n, alpha, r2, "effort pipeline done");

    EffortReport {
        repo_path: hotspots.repo_path.clone(),
        window_days: hotspots.window_days,
        from_date: hotspots.from_date,
        to_date: hotspots.to_date,
        total_files: n,
        r_squared: r2,
        alpha,
        coefficients,
        files,
    }
}

fn normalize_columns(raw: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if raw.is_empty() {
        return Vec::new();
    }
    let p = raw[0].len();
    let mut out = vec![vec![0.0; p]; raw.len()];
    for j in 0..p {
        let col: Vec<f64> = raw.iter().map(|r| r[j]).collect();
        let norm = min_max(&col);
        for (i, v) in norm.into_iter().enumerate() {
            out[i][j] = v;
        }
    }
    out
}
