//! # Lumina Core
//!
//! Engine-agnostic building blocks shared by the Lumina lighting runtime.
//!
//! - **Arena**: generational storage with typed handles that detect stale references
//! - **Math**: glam re-exports and axis-aligned bounds used for scene quantization

pub mod arena;
pub mod math;

pub use arena::{Arena, Handle};
pub use math::Aabb;
