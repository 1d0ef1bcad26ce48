//! # Lumina Renderer
//!
//! CPU side of clustered forward lighting.
//!
//! ## Features
//! - Light registry with per-layer type splits and shadow caster unions
//! - Cluster grid assignment shared between layers with equal light sets
//! - Light data encoder for 8-bit and float light textures
//! - wgpu upload of the encoded light rows

pub mod composition;
pub mod config;
pub mod gpu_upload;
pub mod layer;
pub mod light;
pub mod light_layout;
pub mod light_registry;
pub mod lighting;
pub mod lights_buffer;
pub mod packing;
pub mod world_clusters;

pub use composition::{CompositionUpdate, LayerComposition, LayerEntry, RenderAction};
pub use config::ClusteredLightingConfig;
pub use gpu_upload::{GpuLightTextures, LightTextureSink};
pub use layer::{CameraId, LayerId, MeshInstanceId, RenderLayer};
pub use light::{Light, LightId, LightShape, LightType};
pub use light_layout::{LightTextureFormat, shader_defines};
pub use light_registry::{LayerLightSplit, LightIndexSet, LightRegistry};
pub use lighting::ClusteredLighting;
pub use lights_buffer::{EncoderFeatures, LightsBuffer, MAX_LIGHTS};
pub use world_clusters::{ClusterBinding, ClusterFactory, ClusterPool, WorldClusters};

use thiserror::Error;

/// Lighting errors
#[derive(Error, Debug)]
pub enum LightingError {
    #[error("Light index {index} exceeds capacity {capacity}")]
    OutOfCapacity { index: usize, capacity: usize },

    #[error("Cluster grid unavailable: {0}")]
    ClusterUnavailable(String),

    #[error("Layer not found: {0}")]
    UnknownLayer(String),

    #[error("Light not found: {0}")]
    UnknownLight(String),

    #[error("Invalid lighting config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for lighting operations
pub type LightingResult<T> = Result<T, LightingError>;
