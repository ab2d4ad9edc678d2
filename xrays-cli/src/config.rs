//! Analysis thresholds and tuning knobs.
//!
//! All weights and cutoffs used by the pipelines live here so every number
//! in a report can be traced to a surfaced constant.

use std::path::PathBuf;

/// Tunable parameters for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Half-life in days for hotspot churn/frequency decay.
    pub churn_half_life_days: f64,
    /// Half-life in days for knowledge (authorship) decay.
    pub knowledge_half_life_days: f64,
    /// Two commits on the same path within this many days count as rework.
    pub rework_window_days: f64,
    /// primary_pct above this marks a knowledge island.
    pub island_threshold: f64,
    /// AMS above this flags a class as anemic.
    pub ams_threshold: f64,
    /// GCS above this flags a god class.
    pub gcs_threshold: f64,
    /// Cyclomatic complexity above this counts as "high".
    pub complexity_threshold: u64,
    /// Seed for K-Means++ centroid selection.
    pub kmeans_seed: u64,
    /// Inclusive k range searched by the silhouette auto-k.
    pub k_min: usize,
    pub k_max: usize,
    /// Ridge regularization candidates for the alpha grid search.
    pub ridge_alphas: Vec<f64>,
    /// Above this many samples, alpha search switches from LOO to 5-fold.
    pub loo_sample_limit: usize,
    /// [throughput, feedback, focus, cognitive] weights for the DX score.
    pub dx_weights: [f64; 4],
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            churn_half_life_days: 30.0,
            knowledge_half_life_days: 90.0,
            rework_window_days: 14.0,
            island_threshold: 0.8,
            ams_threshold: 0.5,
            gcs_threshold: 0.6,
            complexity_threshold: 10,
            kmeans_seed: 42,
            k_min: 2,
            k_max: 8,
            ridge_alphas: vec![0.001, 0.01, 0.1, 1.0, 10.0],
            loo_sample_limit: 50,
            dx_weights: [0.3, 0.25, 0.25, 0.2],
        }
    }
}

/// Default run-store location: `~/.git-xrays/runs.db`.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".git-xrays")
        .join("runs.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.ams_threshold, 0.5);
        assert_eq!(cfg.gcs_threshold, 0.6);
        assert_eq!(cfg.ridge_alphas, vec![0.001, 0.01, 0.1, 1.0, 10.0]);
        assert!((cfg.dx_weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
