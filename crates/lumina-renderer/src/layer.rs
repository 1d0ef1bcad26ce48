//! Render Layers
//!
//! A layer is a bucket of draw calls together with the lights that illuminate
//! it and the cameras that render it. Instead of dirty flags, a layer counts
//! generations: every edit bumps a counter and the composition compares the
//! counters it last saw.

use indexmap::IndexSet;
use lumina_core::Handle;
use smallvec::SmallVec;

use crate::light::LightId;

/// Handle to a layer owned by the scene
pub type LayerId = Handle<RenderLayer>;

/// Camera identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u32);

/// Mesh instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshInstanceId(pub u64);

/// Render layer
#[derive(Debug, Clone)]
pub struct RenderLayer {
    /// Layer name (for debugging)
    pub name: String,
    enabled: bool,
    /// Lights in insertion order
    lights: IndexSet<LightId, ahash::RandomState>,
    cameras: SmallVec<[CameraId; 4]>,
    opaque_mesh_instances: Vec<MeshInstanceId>,
    transparent_mesh_instances: Vec<MeshInstanceId>,
    shadow_casters: Vec<MeshInstanceId>,
    /// Bumped when light membership changes
    lights_generation: u64,
    /// Bumped on any other edit that affects render actions
    generation: u64,
}

impl RenderLayer {
    /// Create an enabled, empty layer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            lights: IndexSet::default(),
            cameras: SmallVec::new(),
            opaque_mesh_instances: Vec::new(),
            transparent_mesh_instances: Vec::new(),
            shadow_casters: Vec::new(),
            lights_generation: 0,
            generation: 0,
        }
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether the layer renders
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the layer
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.touch();
        }
    }

    /// Add a light, returns false if it was already present
    pub fn add_light(&mut self, light: LightId) -> bool {
        let inserted = self.lights.insert(light);
        if inserted {
            self.mark_lights_dirty();
        }
        inserted
    }

    /// Remove a light, returns false if it was not present
    pub fn remove_light(&mut self, light: LightId) -> bool {
        let removed = self.lights.shift_remove(&light);
        if removed {
            self.mark_lights_dirty();
        }
        removed
    }

    /// Remove all lights
    pub fn clear_lights(&mut self) {
        if !self.lights.is_empty() {
            self.lights.clear();
            self.mark_lights_dirty();
        }
    }

    /// Force the composition to rebuild its light registry
    ///
    /// Membership edits bump the light generation on their own, and the
    /// composition compares the enabled flag, type and shadow casting of
    /// registered lights itself.
    pub fn mark_lights_dirty(&mut self) {
        self.lights_generation = self.lights_generation.wrapping_add(1);
    }

    /// Whether the light is in this layer
    pub fn has_light(&self, light: LightId) -> bool {
        self.lights.contains(&light)
    }

    /// Lights in insertion order
    pub fn lights(&self) -> impl Iterator<Item = LightId> + '_ {
        self.lights.iter().copied()
    }

    /// Number of lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Attach a camera
    pub fn add_camera(&mut self, camera: CameraId) {
        if !self.cameras.contains(&camera) {
            self.cameras.push(camera);
            self.touch();
        }
    }

    /// Detach a camera
    pub fn remove_camera(&mut self, camera: CameraId) {
        if let Some(position) = self.cameras.iter().position(|&c| c == camera) {
            self.cameras.remove(position);
            self.touch();
        }
    }

    /// Whether the camera renders this layer
    pub fn has_camera(&self, camera: CameraId) -> bool {
        self.cameras.contains(&camera)
    }

    /// Attached cameras
    pub fn cameras(&self) -> &[CameraId] {
        &self.cameras
    }

    /// Add a mesh instance to the opaque or transparent sub-layer
    pub fn add_mesh_instance(&mut self, mesh_instance: MeshInstanceId, transparent: bool) {
        if transparent {
            self.transparent_mesh_instances.push(mesh_instance);
        } else {
            self.opaque_mesh_instances.push(mesh_instance);
        }
        self.touch();
    }

    /// Remove a mesh instance from both sub-layers
    pub fn remove_mesh_instance(&mut self, mesh_instance: MeshInstanceId) {
        let before = self.opaque_mesh_instances.len() + self.transparent_mesh_instances.len();
        self.opaque_mesh_instances.retain(|&m| m != mesh_instance);
        self.transparent_mesh_instances.retain(|&m| m != mesh_instance);
        if before != self.opaque_mesh_instances.len() + self.transparent_mesh_instances.len() {
            self.touch();
        }
    }

    /// Mesh instances of one sub-layer
    pub fn mesh_instances(&self, transparent: bool) -> &[MeshInstanceId] {
        if transparent {
            &self.transparent_mesh_instances
        } else {
            &self.opaque_mesh_instances
        }
    }

    /// Draw calls issued by one sub-layer
    pub fn draw_call_count(&self, transparent: bool) -> usize {
        self.mesh_instances(transparent).len()
    }

    /// Add a shadow caster
    pub fn add_shadow_caster(&mut self, mesh_instance: MeshInstanceId) {
        self.shadow_casters.push(mesh_instance);
        self.mark_lights_dirty();
    }

    /// Shadow casters of this layer
    pub fn shadow_casters(&self) -> &[MeshInstanceId] {
        &self.shadow_casters
    }

    /// Light membership generation
    pub fn lights_generation(&self) -> u64 {
        self.lights_generation
    }

    /// Generation of everything else
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
