use crate::{mw_error::MwError, render::BinKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Frame polygon budget for `DetailManager`
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(default)]
pub struct DetailConfig {
    /// User preference in 0..1 between the minimum and maximum limits
    pub detail_scale: f32,
    pub min_poly_limit: u32,
    pub max_poly_limit: u32,
    /// How far below the limit targeted demotion may overshoot
    pub limit_range: u32,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            detail_scale: 1.0,
            min_poly_limit: 2000,
            max_poly_limit: 20000,
            limit_range: 1000,
        }
    }
}

impl DetailConfig {
    /// Polygon limit for a frame
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn poly_limit(&self) -> u32 {
        let min = self.min_poly_limit as f32;
        let max = self.max_poly_limit as f32;
        self.detail_scale
            .clamp(0.0, 1.0)
            .mul_add(max - min, min)
            .max(0.0) as u32
    }
}

/// Per view preferences used when picking details
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(default)]
pub struct DetailPrefs {
    /// Multiplier on projected pixel size, above 1 favours finer details
    pub detail_adjust: f32,
    /// Details finer than this index are never drawn
    pub num_skip_render_details: usize,
    /// Pixel error tolerated by error metric selection
    pub screen_error: f32,
    /// Error metric selection uses a near zero tolerance
    pub fog_exemption_on: bool,
}

impl Default for DetailPrefs {
    fn default() -> Self {
        Self {
            detail_adjust: 1.0,
            num_skip_render_details: 0,
            screen_error: 5.0,
            fog_exemption_on: false,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// Bins that are collected but not drawn
    pub disabled_bins: Vec<BinKind>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub detail: DetailConfig,
    pub prefs: DetailPrefs,
    pub render: RenderConfig,
}

impl Config {
    /// # Errors
    /// May return `MwError`
    pub fn from_yaml(text: &str) -> Result<Self, MwError> {
        let config = serde_yaml::from_str(text)?;
        debug!("Config {config:?}");
        Ok(config)
    }

    /// # Errors
    /// May return `MwError`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MwError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        info!("Loading config {:?}", path.as_ref());
        Self::from_yaml(&text)
    }

    /// # Errors
    /// May return `MwError`
    pub fn to_yaml(&self) -> Result<String, MwError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_uses_defaults() {
        let config = Config::from_yaml(
            "detail:\n  detail_scale: 0.5\nrender:\n  disabled_bins: [Glow]\n",
        )
        .unwrap();
        assert_eq!(config.detail.poly_limit(), 11000);
        assert_eq!(config.detail.limit_range, 1000);
        assert_eq!(config.prefs, DetailPrefs::default());
        assert_eq!(config.render.disabled_bins, vec![BinKind::Glow]);
    }

    #[test]
    fn bad_yaml() {
        assert!(matches!(
            Config::from_yaml("detail: [1, 2"),
            Err(MwError::SerdeYamlError(_))
        ));
    }

    #[test]
    fn yaml_round_trip() {
        let config = Config::default();
        let text = config.to_yaml().unwrap();
        assert_eq!(Config::from_yaml(&text).unwrap(), config);
    }
}
