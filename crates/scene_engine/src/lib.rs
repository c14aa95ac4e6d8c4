//! # Scene Engine
//!
//! The object-lifetime and scene-composition core of a 3D engine:
//! generational handle pools, a type-erased multi-pool registry and a
//! hierarchical scene graph with identity/runtime component resolution.
//!
//! ## Features
//!
//! - **Generational Handles**: stable `(index, generation)` addressing that
//!   can never silently alias a recycled slot
//! - **Slot Pools**: O(1) insert/remove over block-stable storage with a
//!   documented FIFO reuse order
//! - **Type-Erased Registry**: one pool per value type behind a uniform,
//!   fail-closed API
//! - **Scene Graph**: tree-preserving structural edits, two-pass scene
//!   merging with handle remapping, pre-order update traversal
//! - **Deferred Deletion**: GPU-hazard resources queue their free until the
//!   caller proves no in-flight frame still reads them
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! let mut scene = Scene::new("demo");
//! let root = scene.add_root("Root");
//! let node = scene.add_node("Spinner", root);
//!
//! if let Some(transform) = scene.get_component_mut::<Transform3D>(node) {
//!     transform.set(Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)));
//! }
//!
//! scene.update(0.016, 0);
//! let global = scene.get_component::<Transform3D>(node).unwrap().global;
//! assert_eq!(global.m24, 1.0);
//! ```
//!
//! Graphics-API objects, asset parsing and windowing live outside this
//! crate; the scene reaches the GPU only through the abstract
//! [`gpu::GpuDevice`] capability.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod foundation;
pub mod gpu;
pub mod pool;
pub mod scene;

pub use pool::{Handle, Registry, SlotPool, TypeHandle};
pub use scene::Scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::core::config::{ConfigError, SceneConfig};
    pub use crate::foundation::math::{Mat4, Quat, Transform, Vec3, Vec4};
    pub use crate::gpu::{GpuBufferId, GpuDevice, GpuResourceKind, SharedResources};
    pub use crate::pool::{Handle, Registry, SlotPool, TypeHandle};
    pub use crate::scene::{
        AnimationBinding, AnimationPlayer, Bone, BoneAttachment, Channel, ChannelPath,
        ChannelTarget, Clip, Component, ComponentKinds, Interpolation, MeshRenderer, Node,
        NodeScript, Sampler, Scene, ScriptBinding, ScriptInstance, ScriptValue, SkeletonBinding,
        SkeletonPose, SkeletonRig, Transform3D,
    };
}
