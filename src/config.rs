use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ScenefitError, ScenefitResult};

/// Tuning parameters for the registration engine.
///
/// Every threshold that was empirically tuned against real detector noise is
/// kept configurable here rather than hard-coded in the strategies; the
/// defaults are the values the engine ships with.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistrationConfig {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub anchors: AnchorConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Geometry of the target editor's canvas and nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Program-to-pixel scale, pre-calibrated externally. Panning never
    /// changes it; strategies only ever solve for the translation.
    #[serde(default = "default_fixed_scale")]
    pub fixed_scale: f32,
    /// Rendered node size at scale 1.0, in pixels. Needed by the
    /// single-anchor fallback to estimate scale from one bounding box.
    #[serde(default = "default_node_width")]
    pub node_width_px: f32,
    #[serde(default = "default_node_height")]
    pub node_height_px: f32,
    /// An estimated scale this far from `fixed_scale` gets a diagnostic
    /// warning (likely DPI or editor-zoom mismatch).
    #[serde(default = "default_scale_warn_deviation")]
    pub scale_warn_deviation: f32,
}

/// Origin translation voting (primary strategy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    #[serde(default = "default_bin_size_x")]
    pub bin_size_x: f32,
    #[serde(default = "default_bin_size_y")]
    pub bin_size_y: f32,
    #[serde(default = "default_max_titles")]
    pub max_titles: usize,
    #[serde(default = "default_max_pairs_per_title")]
    pub max_pairs_per_title: usize,
    #[serde(default = "default_max_eval_per_title")]
    pub max_eval_per_title: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_voting_tolerance_multiplier")]
    pub tolerance_multiplier: f32,
    #[serde(default = "default_min_inliers")]
    pub min_inliers: usize,
    /// Weight of the "expected on-screen but undetected" penalty.
    #[serde(default = "default_missing_penalty")]
    pub missing_penalty: f32,
}

/// Relative anchor alignment (fallback strategy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorConfig {
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    #[serde(default = "default_anchor_min_matches")]
    pub min_matches: usize,
    /// A neighbor's per-axis scale ratio must stay within this fraction of
    /// the running median of already-accepted ratios.
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f32,
    /// Program-space axis deltas below this are too small to divide by.
    #[serde(default = "default_min_program_delta")]
    pub min_program_delta: f32,
    /// Maximum allowed relative disagreement between the X and Y scale
    /// estimates. A pan-only transform must be isotropic.
    #[serde(default = "default_max_anisotropy")]
    pub max_anisotropy: f32,
    #[serde(default = "default_support_tolerance_multiplier")]
    pub support_tolerance_multiplier: f32,
}

/// Ordinary node cross-validation, the gate every strategy passes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_validation_min_matches")]
    pub min_matches: usize,
    #[serde(default = "default_validation_tolerance_multiplier")]
    pub tolerance_multiplier: f32,
}

fn default_fixed_scale() -> f32 {
    1.0
}

fn default_node_width() -> f32 {
    180.0
}

fn default_node_height() -> f32 {
    44.0
}

fn default_scale_warn_deviation() -> f32 {
    0.10
}

fn default_bin_size_x() -> f32 {
    80.0
}

fn default_bin_size_y() -> f32 {
    40.0
}

fn default_max_titles() -> usize {
    120
}

fn default_max_pairs_per_title() -> usize {
    32
}

fn default_max_eval_per_title() -> usize {
    64
}

fn default_max_candidates() -> usize {
    8
}

fn default_voting_tolerance_multiplier() -> f32 {
    0.75
}

fn default_min_inliers() -> usize {
    4
}

fn default_missing_penalty() -> f32 {
    0.5
}

fn default_max_neighbors() -> usize {
    12
}

fn default_anchor_min_matches() -> usize {
    3
}

fn default_ratio_tolerance() -> f32 {
    0.25
}

fn default_min_program_delta() -> f32 {
    4.0
}

fn default_max_anisotropy() -> f32 {
    0.2
}

fn default_support_tolerance_multiplier() -> f32 {
    1.5
}

fn default_validation_min_matches() -> usize {
    3
}

fn default_validation_tolerance_multiplier() -> f32 {
    1.0
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            fixed_scale: default_fixed_scale(),
            node_width_px: default_node_width(),
            node_height_px: default_node_height(),
            scale_warn_deviation: default_scale_warn_deviation(),
        }
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            bin_size_x: default_bin_size_x(),
            bin_size_y: default_bin_size_y(),
            max_titles: default_max_titles(),
            max_pairs_per_title: default_max_pairs_per_title(),
            max_eval_per_title: default_max_eval_per_title(),
            max_candidates: default_max_candidates(),
            tolerance_multiplier: default_voting_tolerance_multiplier(),
            min_inliers: default_min_inliers(),
            missing_penalty: default_missing_penalty(),
        }
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            max_neighbors: default_max_neighbors(),
            min_matches: default_anchor_min_matches(),
            ratio_tolerance: default_ratio_tolerance(),
            min_program_delta: default_min_program_delta(),
            max_anisotropy: default_max_anisotropy(),
            support_tolerance_multiplier: default_support_tolerance_multiplier(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_matches: default_validation_min_matches(),
            tolerance_multiplier: default_validation_tolerance_multiplier(),
        }
    }
}

impl RegistrationConfig {
    /// Per-axis pixel tolerance for treating a detection as "at" an expected
    /// position, at the given scale. Half a node on each axis.
    pub fn position_thresholds(&self, scale: f32) -> (f32, f32) {
        (
            self.canvas.node_width_px * 0.5 * scale.abs(),
            self.canvas.node_height_px * 0.5 * scale.abs(),
        )
    }
}

fn resolve_config_path() -> ScenefitResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("scenefit.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("scenefit.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ScenefitError::Config(
        "scenefit.toml not found next to executable or in working directory".into(),
    ))
}

/// Loads `scenefit.toml`, falling back to defaults if no file exists.
pub fn load_config() -> ScenefitResult<RegistrationConfig> {
    let path = match resolve_config_path() {
        Ok(path) => path,
        Err(_) => {
            tracing::debug!("no scenefit.toml found; using default tuning");
            return Ok(RegistrationConfig::default());
        }
    };
    let content = std::fs::read_to_string(&path)?;
    let config: RegistrationConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_tuning() {
        let cfg = RegistrationConfig::default();
        assert_eq!(cfg.canvas.fixed_scale, 1.0);
        assert_eq!(cfg.voting.bin_size_x, 80.0);
        assert_eq!(cfg.voting.bin_size_y, 40.0);
        assert_eq!(cfg.voting.min_inliers, 4);
        assert_eq!(cfg.voting.missing_penalty, 0.5);
        assert_eq!(cfg.validation.min_matches, 3);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: RegistrationConfig = toml::from_str(
            r#"
            [voting]
            min_inliers = 6

            [canvas]
            node_width_px = 200.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.voting.min_inliers, 6);
        assert_eq!(cfg.voting.bin_size_x, 80.0);
        assert_eq!(cfg.canvas.node_width_px, 200.0);
        assert_eq!(cfg.canvas.fixed_scale, 1.0);
        assert_eq!(cfg.anchors.max_neighbors, 12);
    }
}
