//! Clustered Lighting
//!
//! Per-frame driver: derives compression ranges and bounds from the
//! composition's lights, encodes them into the light buffer, feeds the
//! cluster grids and hands the encoded data to the upload layer.
//!
//! Frame order:
//! 1. [`LayerComposition::update`]
//! 2. [`ClusteredLighting::prepare_frame`]
//! 3. [`ClusteredLighting::update_clusters`]
//! 4. [`ClusteredLighting::upload`]

use glam::Vec3;
use lumina_core::{Aabb, Arena};

use crate::composition::LayerComposition;
use crate::config::ClusteredLightingConfig;
use crate::gpu_upload::LightTextureSink;
use crate::light::Light;
use crate::light_layout::{LightTextureFormat, shader_defines};
use crate::lights_buffer::{LightBufferUniforms, LightsBuffer};
use crate::world_clusters::{ClusterUpdateParams, WorldClusters};
use crate::{LightingError, LightingResult};

/// Smallest scene extent used for position quantization
const MIN_BOUNDS_EXTENT: f32 = 1.0e-2;

/// Summary of one prepared frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLightStats {
    /// Lights written to the buffer
    pub encoded: usize,
    /// Registered lights left out (disabled, directional or over budget)
    pub skipped: usize,
    /// Enabled clustered lights whose index is beyond the light budget
    pub over_budget: usize,
    pub max_attenuation: f32,
    pub max_color_value: f32,
    /// Bounds positions were quantized against
    pub bounds: Aabb,
}

/// Clustered lighting frame driver
pub struct ClusteredLighting {
    config: ClusteredLightingConfig,
    buffer: LightsBuffer,
    gamma_correction: bool,
    bounds: Aabb,
    frame_number: u64,
}

impl ClusteredLighting {
    /// Create a driver for the format chosen at startup
    pub fn new(config: ClusteredLightingConfig, format: LightTextureFormat) -> Self {
        let buffer = LightsBuffer::new(format, config.encoder_features());
        log::info!(
            "Clustered lighting: {:?} light textures, {} lights, {:?} cells, shadow atlas {}, cookie atlas {}",
            format,
            config.light_budget(),
            config.cells,
            config.shadow_atlas_resolution,
            config.cookie_atlas_resolution
        );
        Self {
            config,
            buffer,
            gamma_correction: true,
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
            frame_number: 0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ClusteredLightingConfig {
        &self.config
    }

    /// Replace the configuration
    pub fn set_config(&mut self, config: ClusteredLightingConfig) {
        self.buffer.set_features(config.encoder_features());
        self.config = config;
    }

    /// Encode linear colors
    pub fn set_gamma_correction(&mut self, enabled: bool) {
        self.gamma_correction = enabled;
    }

    pub fn format(&self) -> LightTextureFormat {
        self.buffer.format()
    }

    pub fn lights_buffer(&self) -> &LightsBuffer {
        &self.buffer
    }

    /// Bounds used by the last prepared frame
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Defines the light shader must be compiled with
    pub fn shader_defines(&self) -> String {
        shader_defines(self.format())
    }

    /// Apply the light budget to a composition
    pub fn configure_composition<C: WorldClusters>(&self, composition: &mut LayerComposition<C>) {
        composition.set_max_lights(self.config.light_budget());
    }

    /// Grid parameters for this frame
    pub fn cluster_params(&self) -> ClusterUpdateParams {
        ClusterUpdateParams {
            enabled: true,
            bounds: self.bounds,
            cells: self.config.cell_counts(),
            max_lights_per_cell: self.config.max_lights_per_cell,
        }
    }

    /// Encode the composition's lights for this frame
    ///
    /// Enabled omni and spot lights are written at their global index.
    /// Indices beyond the configured light budget are dropped with a warning;
    /// [`Self::configure_composition`] keeps the two budgets equal.
    /// Positions are quantized against `scene_bounds`, or against the union
    /// of the lights' ranges when no bounds are given.
    pub fn prepare_frame<C: WorldClusters>(
        &mut self,
        composition: &LayerComposition<C>,
        lights: &Arena<Light>,
        scene_bounds: Option<Aabb>,
    ) -> LightingResult<FrameLightStats> {
        self.frame_number += 1;
        let _span = tracing::debug_span!("prepare_lights", frame = self.frame_number).entered();

        let registry = composition.registry();
        let budget = self.config.light_budget();
        let mut visible = Vec::with_capacity(registry.len().min(budget));
        let mut over_budget = 0;
        for (index, id) in registry.lights().enumerate() {
            let light = lights
                .get(id)
                .ok_or_else(|| LightingError::UnknownLight(format!("{id:?}")))?;
            if !light.enabled || !light.is_clustered() {
                continue;
            }
            if index >= budget {
                over_budget += 1;
                continue;
            }
            visible.push((index, light));
        }
        if over_budget > 0 {
            log::warn!(
                "Frame {}: {} lights beyond the light budget of {} were not encoded",
                self.frame_number,
                over_budget,
                budget
            );
        }

        let mut max_attenuation = 0.0f32;
        let mut max_color_value = 0.0f32;
        let mut light_bounds = Aabb::EMPTY;
        for (_, light) in &visible {
            max_attenuation = max_attenuation.max(light.range);
            max_color_value = max_color_value.max(light.final_color(self.gamma_correction).max_element());
            light_bounds.expand_to_include_sphere(light.position(), light.range);
        }

        let bounds = match scene_bounds {
            Some(bounds) if !bounds.is_empty() => bounds,
            _ if !light_bounds.is_empty() => light_bounds,
            _ => Aabb::new(Vec3::ZERO, Vec3::ONE),
        };
        self.bounds = bounds;

        self.buffer.begin_frame(budget, self.format());
        self.buffer.set_compression_ranges(max_attenuation, max_color_value);
        self.buffer
            .set_scene_bounds(bounds.min, bounds.safe_size(MIN_BOUNDS_EXTENT));

        for &(index, light) in &visible {
            self.buffer.encode(light, index, self.gamma_correction)?;
        }

        let stats = FrameLightStats {
            encoded: visible.len(),
            skipped: registry.len() - visible.len(),
            over_budget,
            max_attenuation,
            max_color_value,
            bounds,
        };
        log::trace!(
            "Frame {}: encoded {} lights, {} skipped",
            self.frame_number,
            stats.encoded,
            stats.skipped
        );
        Ok(stats)
    }

    /// Rebuild the composition's cluster grids with this frame's parameters
    pub fn update_clusters<C: WorldClusters>(
        &self,
        composition: &mut LayerComposition<C>,
        lights: &Arena<Light>,
    ) -> usize {
        composition.update_clusters(lights, &self.cluster_params())
    }

    /// Decoding constants for the shader
    pub fn uniforms(&self) -> LightBufferUniforms {
        self.buffer.uniforms()
    }

    /// Shadow and cookie atlas resolutions with their texel sizes, in that order
    pub fn atlas_params(&self) -> [f32; 4] {
        let shadow = self.config.shadow_atlas_resolution.max(1) as f32;
        let cookie = self.config.cookie_atlas_resolution.max(1) as f32;
        [shadow, shadow.recip(), cookie, cookie.recip()]
    }

    /// Hand the encoded light data to the upload layer
    pub fn upload<S: LightTextureSink + ?Sized>(&self, sink: &mut S) {
        self.buffer.upload_textures(sink);
    }
}

impl Default for ClusteredLighting {
    fn default() -> Self {
        Self::new(ClusteredLightingConfig::default(), LightTextureFormat::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{CameraId, MeshInstanceId, RenderLayer};
    use crate::light_layout::{CompactField, Axis};
    use crate::lights_buffer::MAX_LIGHTS;
    use crate::world_clusters::tests::{RecordingClusters, RecordingFactory};

    struct Frame {
        lights: Arena<Light>,
        layers: Arena<RenderLayer>,
        composition: LayerComposition<RecordingClusters>,
        factory: RecordingFactory,
        world: crate::layer::LayerId,
    }

    impl Frame {
        fn new() -> Self {
            let mut layers = Arena::new();
            let mut world = RenderLayer::new("World");
            world.add_camera(CameraId(0));
            world.add_mesh_instance(MeshInstanceId(0), false);
            let world = layers.insert(world);

            let mut composition = LayerComposition::new();
            composition.push_layer(world, false);
            composition.add_camera(CameraId(0));

            Self {
                lights: Arena::new(),
                layers,
                composition,
                factory: RecordingFactory::default(),
                world,
            }
        }

        fn add(&mut self, light: Light) -> crate::light::LightId {
            let id = self.lights.insert(light);
            self.layers.get_mut(self.world).unwrap().add_light(id);
            id
        }

        fn update(&mut self) {
            self.composition
                .update(&self.layers, &self.lights, &mut self.factory)
                .unwrap();
        }
    }

    #[test]
    fn test_omni_scenario() {
        let mut frame = Frame::new();
        frame.add(Light::omni(Vec3::ONE, 1.0, 20.0).at(Vec3::splat(50.0)));
        frame.update();

        let mut lighting = ClusteredLighting::new(
            ClusteredLightingConfig::default(),
            LightTextureFormat::EightBit,
        );
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(100.0));
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, Some(bounds))
            .unwrap();
        assert_eq!(stats.encoded, 1);
        assert_eq!(stats.max_attenuation, 20.0);

        let row = lighting.lights_buffer().compact_row(0);
        for axis in Axis::ALL {
            assert!((CompactField::Position(axis).read(row) - 0.5).abs() < 1.0e-6);
        }
        assert_eq!(CompactField::Range.read(row), 1.0);
    }

    #[test]
    fn test_bounds_from_light_ranges() {
        let mut frame = Frame::new();
        frame.add(Light::omni(Vec3::ONE, 1.0, 5.0).at(Vec3::new(10.0, 0.0, 0.0)));
        frame.add(Light::spot(Vec3::ONE, 1.0, 2.0, 0.2, 0.4).at(Vec3::new(-10.0, 4.0, 0.0)));
        frame.update();

        let mut lighting = ClusteredLighting::default();
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();

        assert_eq!(stats.bounds.min, Vec3::new(-12.0, -5.0, -5.0));
        assert_eq!(stats.bounds.max, Vec3::new(15.0, 6.0, 5.0));
        assert_eq!(lighting.cluster_params().bounds, stats.bounds);
    }

    #[test]
    fn test_color_range_from_brightest_light() {
        let mut frame = Frame::new();
        frame.add(Light::omni(Vec3::new(1.0, 0.5, 0.0), 4.0, 5.0));
        frame.add(Light::omni(Vec3::ONE, 1.0, 5.0));
        frame.update();

        let mut lighting = ClusteredLighting::default();
        lighting.set_gamma_correction(false);
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.max_color_value, 4.0);

        let row = lighting.lights_buffer().compact_row(0);
        assert_eq!(CompactField::ColorR.read(row), 1.0);
        assert!((CompactField::ColorG.read(row) - 0.5).abs() < 1.0e-4);
    }

    #[test]
    fn test_skips_disabled_and_directional() {
        let mut frame = Frame::new();
        frame.add(Light::directional(Vec3::ONE, 2.0));
        let off = frame.add(Light::omni(Vec3::ONE, 1.0, 5.0));
        frame.lights.get_mut(off).unwrap().enabled = false;
        frame.add(Light::omni(Vec3::ONE, 1.0, 5.0));
        frame.update();

        let mut lighting = ClusteredLighting::default();
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.encoded, 1);
        assert_eq!(stats.skipped, 2);

        let buffer = lighting.lights_buffer();
        assert!(buffer.compact_row(0).iter().all(|&byte| byte == 0));
        assert!(buffer.compact_row(1).iter().all(|&byte| byte == 0));
        assert!(buffer.compact_row(2).iter().any(|&byte| byte != 0));
    }

    #[test]
    fn test_full_light_budget_is_encoded() {
        let mut frame = Frame::new();
        for i in 0..MAX_LIGHTS + 1 {
            frame.add(Light::omni(Vec3::ONE, 1.0, 1.0).at(Vec3::new(i as f32, 0.0, 0.0)));
        }
        frame.update();
        assert_eq!(frame.composition.registry().stats().dropped_lights, 1);

        let mut lighting = ClusteredLighting::default();
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.encoded, MAX_LIGHTS);

        let buffer = lighting.lights_buffer();
        for index in 0..MAX_LIGHTS {
            let (position, range) = buffer.decode_position_range(index);
            assert_eq!(position.x, index as f32);
            assert_eq!(range, 1.0);
        }
    }

    #[test]
    fn test_smaller_budget_applies_to_composition() {
        let mut frame = Frame::new();
        for _ in 0..8 {
            frame.add(Light::omni(Vec3::ONE, 1.0, 1.0));
        }

        let config = ClusteredLightingConfig {
            max_lights: 4,
            ..Default::default()
        };
        let mut lighting = ClusteredLighting::new(config, LightTextureFormat::Float);
        lighting.configure_composition(&mut frame.composition);
        frame.update();

        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.encoded, 4);
        assert_eq!(lighting.lights_buffer().max_lights(), 4);
        assert_eq!(lighting.uniforms().texture_size[2], 4.0);
    }

    #[test]
    fn test_update_clusters_uses_config() {
        let mut frame = Frame::new();
        frame.add(Light::omni(Vec3::ONE, 1.0, 3.0));
        frame.update();

        let mut lighting = ClusteredLighting::default();
        lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(lighting.update_clusters(&mut frame.composition, &frame.lights), 1);

        let action = frame.composition.render_actions()[0];
        let clusters = frame.composition.clusters_for(&action).unwrap();
        assert_eq!(clusters.updates, vec![vec![0]]);
    }

    #[test]
    fn test_budget_overrun_skips_extra_lights() {
        let mut frame = Frame::new();
        for i in 0..8 {
            frame.add(Light::omni(Vec3::ONE, 1.0, 1.0).at(Vec3::new(i as f32, 0.0, 0.0)));
        }
        // The composition keeps its default budget, so all eight lights get an index
        frame.update();
        assert_eq!(frame.composition.registry().len(), 8);

        let config = ClusteredLightingConfig {
            max_lights: 4,
            ..Default::default()
        };
        let mut lighting = ClusteredLighting::new(config, LightTextureFormat::EightBit);
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.encoded, 4);
        assert_eq!(stats.over_budget, 4);
        assert_eq!(stats.skipped, 4);
        assert_eq!(stats.bounds.max.x, 4.0);

        let buffer = lighting.lights_buffer();
        assert_eq!(buffer.max_lights(), 4);
        for index in 0..4 {
            assert!(buffer.compact_row(index).iter().any(|&byte| byte != 0));
        }
    }

    #[test]
    fn test_disabling_light_reaches_clusters() {
        let mut frame = Frame::new();
        let a = frame.add(Light::omni(Vec3::ONE, 1.0, 3.0));
        frame.add(Light::omni(Vec3::ONE, 1.0, 3.0).at(Vec3::X));
        frame.update();

        frame.lights.get_mut(a).unwrap().enabled = false;
        frame.update();

        let mut lighting = ClusteredLighting::default();
        let stats = lighting
            .prepare_frame(&frame.composition, &frame.lights, None)
            .unwrap();
        assert_eq!(stats.encoded, 1);
        assert!(lighting.lights_buffer().compact_row(0).iter().all(|&byte| byte == 0));

        lighting.update_clusters(&mut frame.composition, &frame.lights);
        let action = frame.composition.render_actions()[0];
        let clusters = frame.composition.clusters_for(&action).unwrap();
        assert_eq!(clusters.updates, vec![vec![1]]);
    }

    #[test]
    fn test_atlas_params_from_config() {
        let config = ClusteredLightingConfig {
            shadow_atlas_resolution: 1024,
            cookie_atlas_resolution: 0,
            ..Default::default()
        };
        let lighting = ClusteredLighting::new(config, LightTextureFormat::Float);
        assert_eq!(lighting.atlas_params(), [1024.0, 1.0 / 1024.0, 1.0, 1.0]);
    }

    #[test]
    fn test_shader_defines_follow_format() {
        let lighting = ClusteredLighting::new(
            ClusteredLightingConfig::default(),
            LightTextureFormat::EightBit,
        );
        assert!(lighting.shader_defines().contains("#define CLUSTER_TEXTURE_8BIT"));
    }
}
