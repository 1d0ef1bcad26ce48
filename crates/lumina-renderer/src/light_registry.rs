//! Light Registry
//!
//! Aggregates the lights of every layer in a composition into one ordered,
//! deduplicated list. A light's position in that list is its global index:
//! the row it is encoded into and the index the cluster grid stores.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexSet;
use lumina_core::Arena;

use crate::layer::{LayerId, MeshInstanceId, RenderLayer};
use crate::light::{Light, LightId, LightType};
use crate::lights_buffer::MAX_LIGHTS;
use crate::{LightingError, LightingResult};

const WORDS: usize = MAX_LIGHTS.div_ceil(64);

/// Set of global light indices
///
/// Two layers listing the same lights in a different order produce equal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightIndexSet {
    words: [u64; WORDS],
}

impl LightIndexSet {
    /// Empty set
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Insert a global index, returns false if it was already present
    pub fn insert(&mut self, index: usize) -> bool {
        debug_assert!(index < MAX_LIGHTS);
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        let inserted = self.words[word] & bit == 0;
        self.words[word] |= bit;
        inserted
    }

    pub fn contains(&self, index: usize) -> bool {
        index < MAX_LIGHTS && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_LIGHTS).filter(|&index| self.contains(index))
    }
}

/// Enabled lights of one layer, split by type
#[derive(Debug, Clone, Default)]
pub struct LayerLightSplit {
    pub directional: Vec<LightId>,
    pub omni: Vec<LightId>,
    pub spot: Vec<LightId>,
    /// Omni and spot lights in layer order
    clustered: Vec<LightId>,
    clustered_set: LightIndexSet,
}

impl LayerLightSplit {
    /// Non-directional lights in layer order
    pub fn clustered(&self) -> &[LightId] {
        &self.clustered
    }

    /// Global indices of the non-directional lights
    pub fn clustered_set(&self) -> &LightIndexSet {
        &self.clustered_set
    }

    pub fn has_clustered_lights(&self) -> bool {
        !self.clustered.is_empty()
    }
}

/// Counters from the last rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Distinct layers visited
    pub layers: usize,
    /// Layer list entries skipped because the layer was already visited
    pub duplicate_layers: usize,
    /// Lights rejected because the registry was full
    pub dropped_lights: usize,
}

/// Global light list of a composition
#[derive(Debug, Clone)]
pub struct LightRegistry {
    max_lights: usize,
    lights: IndexSet<LightId, ahash::RandomState>,
    splits: AHashMap<LayerId, LayerLightSplit>,
    shadow_casters: AHashMap<LightId, IndexSet<MeshInstanceId, ahash::RandomState>>,
    stats: RegistryStats,
}

impl Default for LightRegistry {
    fn default() -> Self {
        Self::new(MAX_LIGHTS)
    }
}

impl LightRegistry {
    /// Create a registry holding at most `max_lights` lights (capped at [`MAX_LIGHTS`])
    pub fn new(max_lights: usize) -> Self {
        Self {
            max_lights: max_lights.min(MAX_LIGHTS),
            lights: IndexSet::default(),
            splits: AHashMap::default(),
            shadow_casters: AHashMap::default(),
            stats: RegistryStats::default(),
        }
    }

    /// Light capacity
    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    /// Change the capacity, takes effect on the next rebuild
    pub fn set_max_lights(&mut self, max_lights: usize) {
        self.max_lights = max_lights.min(MAX_LIGHTS);
    }

    /// Rebuild the global list and the per-layer splits
    ///
    /// `layer_ids` is the composition's layer list; a layer listed twice
    /// contributes once. Global indices follow first appearance.
    pub fn rebuild(
        &mut self,
        layer_ids: &[LayerId],
        layers: &Arena<RenderLayer>,
        lights: &Arena<Light>,
    ) -> LightingResult<()> {
        let _span = tracing::debug_span!("light_registry_rebuild", layers = layer_ids.len()).entered();

        self.lights.clear();
        self.splits.clear();
        self.stats = RegistryStats::default();

        let mut visited = AHashSet::with_capacity(layer_ids.len());
        for &layer_id in layer_ids {
            if !visited.insert(layer_id) {
                self.stats.duplicate_layers += 1;
                continue;
            }
            let layer = layers
                .get(layer_id)
                .ok_or_else(|| LightingError::UnknownLayer(format!("{layer_id:?}")))?;
            self.stats.layers += 1;

            for light_id in layer.lights() {
                if self.lights.contains(&light_id) {
                    continue;
                }
                if !lights.contains(light_id) {
                    return Err(LightingError::UnknownLight(format!(
                        "{light_id:?} in layer '{}'",
                        layer.name
                    )));
                }
                if self.lights.len() < self.max_lights {
                    self.lights.insert(light_id);
                } else {
                    self.stats.dropped_lights += 1;
                }
            }

            let split = self.split_layer(layer, lights);
            self.splits.insert(layer_id, split);
        }

        if self.stats.dropped_lights > 0 {
            log::warn!(
                "Light budget of {} exceeded, {} lights dropped",
                self.max_lights,
                self.stats.dropped_lights
            );
        }
        log::debug!(
            "Light registry rebuilt: {} lights from {} layers",
            self.lights.len(),
            self.stats.layers
        );

        Ok(())
    }

    fn split_layer(&self, layer: &RenderLayer, lights: &Arena<Light>) -> LayerLightSplit {
        let mut split = LayerLightSplit::default();
        for light_id in layer.lights() {
            // Dropped lights have no row to render from
            let Some(index) = self.lights.get_index_of(&light_id) else {
                continue;
            };
            let Some(light) = lights.get(light_id) else {
                continue;
            };
            if !light.enabled {
                continue;
            }
            match light.light_type {
                LightType::Directional => split.directional.push(light_id),
                LightType::Omni => split.omni.push(light_id),
                LightType::Spot => split.spot.push(light_id),
            }
            if light.is_clustered() {
                split.clustered.push(light_id);
                split.clustered_set.insert(index);
            }
        }
        split
    }

    /// Union the shadow casters of every layer referencing each shadow-casting light
    pub fn update_shadow_casters(
        &mut self,
        layer_ids: &[LayerId],
        layers: &Arena<RenderLayer>,
        lights: &Arena<Light>,
    ) {
        self.shadow_casters.clear();

        let mut visited = AHashSet::with_capacity(layer_ids.len());
        for &layer_id in layer_ids {
            if !visited.insert(layer_id) {
                continue;
            }
            let Some(layer) = layers.get(layer_id) else {
                continue;
            };
            for light_id in layer.lights() {
                if !self.lights.contains(&light_id) {
                    continue;
                }
                if !lights.get(light_id).is_some_and(|light| light.cast_shadows) {
                    continue;
                }
                self.shadow_casters
                    .entry(light_id)
                    .or_default()
                    .extend(layer.shadow_casters().iter().copied());
            }
        }
    }

    /// Registered lights in global index order
    pub fn lights(&self) -> impl ExactSizeIterator<Item = LightId> + '_ {
        self.lights.iter().copied()
    }

    /// Number of registered lights
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Global index of a light, valid until the next rebuild
    pub fn global_index(&self, light: LightId) -> Option<usize> {
        self.lights.get_index_of(&light)
    }

    /// Light at a global index
    pub fn light_at(&self, index: usize) -> Option<LightId> {
        self.lights.get_index(index).copied()
    }

    /// Type split of a layer
    pub fn split(&self, layer: LayerId) -> Option<&LayerLightSplit> {
        self.splits.get(&layer)
    }

    /// Deduplicated shadow casters of a light
    pub fn shadow_casters(&self, light: LightId) -> Option<&IndexSet<MeshInstanceId, ahash::RandomState>> {
        self.shadow_casters.get(&light)
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}
