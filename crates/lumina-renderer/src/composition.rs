//! Layer Composition
//!
//! Ordered list of layer entries plus the cameras rendering them. The
//! composition expands into render actions (one per camera and layer entry),
//! owns the light registry built from its layers and binds a cluster grid to
//! every action.

use bitflags::bitflags;
use lumina_core::Arena;

use crate::layer::{CameraId, LayerId, RenderLayer};
use crate::light::{Light, LightType};
use crate::light_registry::{LightIndexSet, LightRegistry};
use crate::world_clusters::{
    ClusterBinding, ClusterFactory, ClusterPool, ClusterRequest, ClusterUpdateParams, ClusteredLight,
    WorldClusters, assign_light_clusters,
};
use crate::{LightingError, LightingResult};

bitflags! {
    /// Parts of the composition rebuilt by an update
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompositionUpdate: u8 {
        /// Global light list and layer splits
        const LIGHTS = 1 << 0;
        /// Render action list
        const ACTIONS = 1 << 1;
        /// Cluster grid bindings
        const CLUSTERS = 1 << 2;
    }
}

/// One entry of the layer list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerEntry {
    pub layer: LayerId,
    /// Selects the transparent sub-layer
    pub transparent: bool,
}

/// A camera rendering one layer entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderAction {
    pub camera: CameraId,
    pub layer: LayerId,
    /// Position in the layer list
    pub entry_index: usize,
    pub transparent: bool,
    /// Cluster grid used by the action
    pub clusters: ClusterBinding,
}

/// Generations of a layer as last seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerSnapshot {
    layer: LayerId,
    lights_generation: u64,
    generation: u64,
}

/// Per-light inputs of the layer splits and shadow caster lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LightState {
    enabled: bool,
    light_type: LightType,
    cast_shadows: bool,
}

impl LightState {
    fn of(light: &Light) -> Self {
        Self {
            enabled: light.enabled,
            light_type: light.light_type,
            cast_shadows: light.cast_shadows,
        }
    }
}

/// Layer composition
pub struct LayerComposition<C> {
    layer_list: Vec<LayerEntry>,
    cameras: Vec<CameraId>,
    /// Bumped by edits to the layer list or cameras
    generation: u64,
    seen_generation: Option<u64>,
    snapshots: Vec<LayerSnapshot>,
    /// State of each registered light at the last rebuild, in global index order
    light_states: Vec<Option<LightState>>,
    registry: LightRegistry,
    render_actions: Vec<RenderAction>,
    clusters: ClusterPool<C>,
}

impl<C: WorldClusters> Default for LayerComposition<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: WorldClusters> LayerComposition<C> {
    /// Create an empty composition
    pub fn new() -> Self {
        Self {
            layer_list: Vec::new(),
            cameras: Vec::new(),
            generation: 0,
            seen_generation: None,
            snapshots: Vec::new(),
            light_states: Vec::new(),
            registry: LightRegistry::default(),
            render_actions: Vec::new(),
            clusters: ClusterPool::new(),
        }
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Append a layer entry
    pub fn push_layer(&mut self, layer: LayerId, transparent: bool) {
        self.layer_list.push(LayerEntry { layer, transparent });
        self.touch();
    }

    /// Insert a layer entry at `index`
    pub fn insert_layer(&mut self, index: usize, layer: LayerId, transparent: bool) {
        let index = index.min(self.layer_list.len());
        self.layer_list.insert(index, LayerEntry { layer, transparent });
        self.touch();
    }

    /// Remove every entry of a layer
    pub fn remove_layer(&mut self, layer: LayerId) {
        let before = self.layer_list.len();
        self.layer_list.retain(|entry| entry.layer != layer);
        if self.layer_list.len() != before {
            self.touch();
        }
    }

    pub fn layer_list(&self) -> &[LayerEntry] {
        &self.layer_list
    }

    /// Add a camera, cameras render in insertion order
    pub fn add_camera(&mut self, camera: CameraId) {
        if !self.cameras.contains(&camera) {
            self.cameras.push(camera);
            self.touch();
        }
    }

    pub fn remove_camera(&mut self, camera: CameraId) {
        let before = self.cameras.len();
        self.cameras.retain(|&c| c != camera);
        if self.cameras.len() != before {
            self.touch();
        }
    }

    pub fn cameras(&self) -> &[CameraId] {
        &self.cameras
    }

    /// Change the light budget
    pub fn set_max_lights(&mut self, max_lights: usize) {
        if self.registry.max_lights() != max_lights.min(crate::MAX_LIGHTS) {
            self.registry.set_max_lights(max_lights);
            self.touch();
        }
    }

    pub fn render_actions(&self) -> &[RenderAction] {
        &self.render_actions
    }

    pub fn registry(&self) -> &LightRegistry {
        &self.registry
    }

    pub fn cluster_pool(&self) -> &ClusterPool<C> {
        &self.clusters
    }

    /// Cluster grid of a render action
    pub fn clusters_for(&self, action: &RenderAction) -> Option<&C> {
        self.clusters.get(action.clusters)
    }

    fn snapshot(&self, layers: &Arena<RenderLayer>) -> LightingResult<Vec<LayerSnapshot>> {
        self.layer_list
            .iter()
            .map(|entry| {
                let layer = layers
                    .get(entry.layer)
                    .ok_or_else(|| LightingError::UnknownLayer(format!("{:?}", entry.layer)))?;
                Ok(LayerSnapshot {
                    layer: entry.layer,
                    lights_generation: layer.lights_generation(),
                    generation: layer.generation(),
                })
            })
            .collect()
    }

    fn light_states(&self, lights: &Arena<Light>) -> Vec<Option<LightState>> {
        self.registry
            .lights()
            .map(|id| lights.get(id).map(LightState::of))
            .collect()
    }

    /// Bring lights, render actions and cluster bindings up to date
    ///
    /// Only the parts whose inputs changed since the last successful update
    /// are rebuilt. Registered lights are compared by their enabled flag,
    /// type and shadow casting, so toggling a light needs no layer edit.
    /// Cluster creation failures are returned unchanged.
    pub fn update<F>(
        &mut self,
        layers: &Arena<RenderLayer>,
        lights: &Arena<Light>,
        factory: &mut F,
    ) -> LightingResult<CompositionUpdate>
    where
        F: ClusterFactory<Clusters = C>,
    {
        let snapshots = self.snapshot(layers)?;
        let structure_changed =
            self.seen_generation != Some(self.generation) || snapshots.len() != self.snapshots.len();

        let changed = |same: fn(&LayerSnapshot, &LayerSnapshot) -> bool| {
            structure_changed || snapshots.iter().zip(&self.snapshots).any(|(a, b)| !same(a, b))
        };
        let lights_changed =
            changed(|a, b| a.layer == b.layer && a.lights_generation == b.lights_generation)
                || self.light_states(lights) != self.light_states;
        let layers_changed = changed(|a, b| a.layer == b.layer && a.generation == b.generation);

        let mut update = CompositionUpdate::empty();
        if lights_changed {
            let layer_ids: Vec<LayerId> = self.layer_list.iter().map(|entry| entry.layer).collect();
            self.registry.rebuild(&layer_ids, layers, lights)?;
            self.registry.update_shadow_casters(&layer_ids, layers, lights);
            self.light_states = self.light_states(lights);
            update |= CompositionUpdate::LIGHTS;
        }
        if lights_changed || layers_changed {
            self.rebuild_render_actions(layers);
            update |= CompositionUpdate::ACTIONS;
            self.assign_clusters(layers, factory)?;
            update |= CompositionUpdate::CLUSTERS;
        }

        self.snapshots = snapshots;
        self.seen_generation = Some(self.generation);

        if !update.is_empty() {
            log::debug!(
                "Composition updated ({:?}): {} render actions, {} lights",
                update,
                self.render_actions.len(),
                self.registry.len()
            );
        }
        Ok(update)
    }

    fn rebuild_render_actions(&mut self, layers: &Arena<RenderLayer>) {
        self.render_actions.clear();
        for &camera in &self.cameras {
            for (entry_index, entry) in self.layer_list.iter().enumerate() {
                let Some(layer) = layers.get(entry.layer) else {
                    continue;
                };
                if !layer.enabled() || !layer.has_camera(camera) {
                    continue;
                }
                self.render_actions.push(RenderAction {
                    camera,
                    layer: entry.layer,
                    entry_index,
                    transparent: entry.transparent,
                    clusters: ClusterBinding::Empty,
                });
            }
        }
    }

    fn assign_clusters<F>(&mut self, layers: &Arena<RenderLayer>, factory: &mut F) -> LightingResult<()>
    where
        F: ClusterFactory<Clusters = C>,
    {
        let requests: Vec<ClusterRequest<'_>> = self
            .render_actions
            .iter()
            .map(|action| ClusterRequest {
                layer: action.layer,
                lights: self
                    .registry
                    .split(action.layer)
                    .map_or(&LightIndexSet::EMPTY, |split| split.clustered_set()),
                draw_calls: layers
                    .get(action.layer)
                    .map_or(0, |layer| layer.draw_call_count(action.transparent)),
            })
            .collect();

        let bindings = assign_light_clusters(&requests, &mut self.clusters, factory)?;
        for (action, binding) in self.render_actions.iter_mut().zip(bindings) {
            action.clusters = binding;
        }
        Ok(())
    }

    /// Rebuild every assigned cluster grid with its layer's clustered lights
    ///
    /// Returns the number of grids updated.
    pub fn update_clusters(&mut self, lights: &Arena<Light>, params: &ClusterUpdateParams) -> usize {
        let mut updated = vec![false; self.clusters.live_count()];
        let mut clustered = Vec::new();

        for action in &self.render_actions {
            let ClusterBinding::Shared(slot) = action.clusters else {
                continue;
            };
            if updated.get(slot.index()).copied().unwrap_or(true) {
                continue;
            }
            let Some(split) = self.registry.split(action.layer) else {
                continue;
            };

            clustered.clear();
            clustered.extend(split.clustered().iter().filter_map(|&id| {
                let light = lights.get(id)?;
                Some(ClusteredLight {
                    id,
                    index: self.registry.global_index(id)?,
                    light_type: light.light_type,
                    position: light.position(),
                    range: light.range,
                })
            }));

            if let Some(clusters) = self.clusters.get_mut(action.clusters) {
                clusters.update(&clustered, params);
                updated[slot.index()] = true;
            }
        }

        updated.iter().filter(|&&done| done).count()
    }

    /// Destroy every cluster grid
    pub fn destroy(&mut self) {
        self.clusters.clear();
        for action in &mut self.render_actions {
            action.clusters = ClusterBinding::Empty;
        }
        // Force reassignment on the next update
        self.seen_generation = None;
    }
}
