//! Hierarchical scene graph and components
//!
//! The scene layer sits on top of the handle pools: a [`Scene`] owns its
//! nodes in a slot pool and its runtime components in a private registry.
//! See [`component`] for the identity/runtime split that keeps per-node
//! data cheap while heavyweight state lives behind handles.

pub mod animation;
pub mod component;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod script;
pub mod skeleton;

pub use animation::{
    AnimationPlayer, Channel, ChannelPath, ChannelTarget, Clip, Interpolation, PoseEdit, Sampler,
};
pub use component::Component;
pub use node::{
    AnimationBinding, BoneAttachment, ComponentKinds, MeshRenderer, Node, ScriptBinding,
    SkeletonBinding, Transform3D,
};
pub use scene::Scene;
pub use script::{NodeScript, ScriptInstance, ScriptValue};
pub use skeleton::{Bone, SkeletonPose, SkeletonRig};
