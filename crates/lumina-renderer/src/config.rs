//! Clustered Lighting Configuration

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::lights_buffer::{EncoderFeatures, MAX_LIGHTS};
use crate::LightingResult;

/// Clustered lighting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteredLightingConfig {
    /// Light budget, clamped to [`MAX_LIGHTS`]
    pub max_lights: usize,
    /// Cluster grid dimensions
    pub cells: [u32; 3],
    /// Light slots per cluster cell
    pub max_lights_per_cell: u32,
    /// Encode shadow data
    pub shadows_enabled: bool,
    /// Encode cookie data
    pub cookies_enabled: bool,
    /// Encode area light vectors
    pub area_lights_enabled: bool,
    /// Shadow atlas resolution
    pub shadow_atlas_resolution: u32,
    /// Cookie atlas resolution
    pub cookie_atlas_resolution: u32,
}

impl Default for ClusteredLightingConfig {
    fn default() -> Self {
        Self {
            max_lights: MAX_LIGHTS,
            cells: [10, 3, 10],
            max_lights_per_cell: 255,
            shadows_enabled: true,
            cookies_enabled: false,
            area_lights_enabled: false,
            shadow_atlas_resolution: 2048,
            cookie_atlas_resolution: 2048,
        }
    }
}

impl ClusteredLightingConfig {
    /// Parse a configuration, missing fields take their defaults
    pub fn from_json(json: &str) -> LightingResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.max_lights > MAX_LIGHTS {
            log::warn!(
                "max_lights {} exceeds the supported {}, clamping",
                config.max_lights,
                MAX_LIGHTS
            );
        }
        Ok(config)
    }

    /// Light budget after clamping
    pub fn light_budget(&self) -> usize {
        self.max_lights.min(MAX_LIGHTS)
    }

    /// Cluster grid dimensions, at least one cell per axis
    pub fn cell_counts(&self) -> UVec3 {
        UVec3::from_array(self.cells).max(UVec3::ONE)
    }

    /// Encoder features implied by this configuration
    pub fn encoder_features(&self) -> EncoderFeatures {
        EncoderFeatures {
            shadows: self.shadows_enabled,
            cookies: self.cookies_enabled,
            area_lights: self.area_lights_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LightingError;

    #[test]
    fn test_defaults() {
        let config = ClusteredLightingConfig::default();
        assert_eq!(config.max_lights, 255);
        assert_eq!(config.cell_counts(), UVec3::new(10, 3, 10));
        assert_eq!(config.encoder_features(), EncoderFeatures::default());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ClusteredLightingConfig::from_json(r#"{ "cookies_enabled": true, "cells": [4, 4, 4] }"#).unwrap();
        assert!(config.cookies_enabled);
        assert!(config.shadows_enabled);
        assert_eq!(config.cells, [4, 4, 4]);
        assert_eq!(config.shadow_atlas_resolution, 2048);
    }

    #[test]
    fn test_light_budget_clamped() {
        let config = ClusteredLightingConfig::from_json(r#"{ "max_lights": 1000 }"#).unwrap();
        assert_eq!(config.light_budget(), MAX_LIGHTS);
    }

    #[test]
    fn test_zero_cells() {
        let config = ClusteredLightingConfig {
            cells: [0, 2, 0],
            ..Default::default()
        };
        assert_eq!(config.cell_counts(), UVec3::new(1, 2, 1));
    }

    #[test]
    fn test_invalid_json() {
        let result = ClusteredLightingConfig::from_json("{ max_lights: }");
        assert!(matches!(result, Err(LightingError::Config(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClusteredLightingConfig {
            area_lights_enabled: true,
            max_lights: 64,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ClusteredLightingConfig::from_json(&json).unwrap(), config);
    }
}
