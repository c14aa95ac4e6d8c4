//! Identity ↔ runtime component resolution
//!
//! Node components come in two representations. *Identity* data lives
//! inline on the node and is cheap to copy. *Runtime* data (skeleton poses,
//! animation playback, script state) lives in the scene's private registry;
//! the identity component only stores a handle into it. The [`Component`]
//! trait maps each identity kind to the type its accessors resolve to, so
//! callers never see the indirection: writing or reading a skeleton
//! component yields the [`SkeletonPose`], not the handle-carrying binding.
//!
//! The kind set is closed: the trait is sealed over the six node component
//! kinds. Scripts that need open-ended references use
//! [`TypeHandle`](crate::pool::TypeHandle) variables instead of new kinds.

use crate::pool::Handle;
use crate::scene::animation::AnimationPlayer;
use crate::scene::node::{
    AnimationBinding, BoneAttachment, ComponentKinds, MeshRenderer, Node, ScriptBinding,
    SkeletonBinding, Transform3D,
};
use crate::scene::scene::Scene;
use crate::scene::script::ScriptInstance;
use crate::scene::skeleton::SkeletonPose;

mod sealed {
    use super::{
        AnimationBinding, BoneAttachment, MeshRenderer, ScriptBinding, SkeletonBinding,
        Transform3D,
    };

    pub trait Sealed {}
    impl Sealed for Transform3D {}
    impl Sealed for MeshRenderer {}
    impl Sealed for BoneAttachment {}
    impl Sealed for SkeletonBinding {}
    impl Sealed for AnimationBinding {}
    impl Sealed for ScriptBinding {}
}

/// A node component kind, resolvable to its runtime representation
///
/// Implemented by the six identity component types; sealed because the set
/// is closed. `Runtime` is `Self` for identity-only kinds and the
/// registry-owned object for the runtime-backed ones.
pub trait Component: Default + Sized + sealed::Sealed {
    /// Type returned by the scene's component accessors
    type Runtime;

    /// Presence bit of this kind in [`Node::kinds`]
    const KIND: ComponentKinds;

    #[doc(hidden)]
    fn slot(node: &Node) -> &Option<Self>;

    #[doc(hidden)]
    fn slot_mut(node: &mut Node) -> &mut Option<Self>;

    /// Allocate the runtime object for a freshly inserted identity
    /// component and wire its handle; identity-only kinds do nothing
    fn create_runtime(scene: &mut Scene, node: Handle) {
        let _ = (scene, node);
    }

    /// Release the runtime object (deferred for GPU-hazard kinds);
    /// identity-only kinds do nothing
    fn remove_runtime(scene: &mut Scene, node: Handle) {
        let _ = (scene, node);
    }

    /// Resolve the component on `node` to its runtime representation
    fn resolve(scene: &Scene, node: Handle) -> Option<&Self::Runtime>;

    /// Mutable variant of [`resolve`](Self::resolve)
    fn resolve_mut(scene: &mut Scene, node: Handle) -> Option<&mut Self::Runtime>;
}

/// Implements [`Component`] for a kind whose runtime representation is the
/// identity data itself.
macro_rules! identity_component {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Component for $ty {
            type Runtime = Self;
            const KIND: ComponentKinds = ComponentKinds::$kind;

            fn slot(node: &Node) -> &Option<Self> {
                &node.$field
            }

            fn slot_mut(node: &mut Node) -> &mut Option<Self> {
                &mut node.$field
            }

            fn resolve(scene: &Scene, node: Handle) -> Option<&Self::Runtime> {
                scene.nodes.get(node)?.component::<Self>()
            }

            fn resolve_mut(scene: &mut Scene, node: Handle) -> Option<&mut Self::Runtime> {
                scene.nodes.get_mut(node)?.component_mut::<Self>()
            }
        }
    };
}

identity_component!(Transform3D, TRANSFORM, transform);
identity_component!(MeshRenderer, MESH_RENDERER, mesh_renderer);
identity_component!(BoneAttachment, BONE_ATTACHMENT, bone_attachment);

impl Component for SkeletonBinding {
    type Runtime = SkeletonPose;
    const KIND: ComponentKinds = ComponentKinds::SKELETON;

    fn slot(node: &Node) -> &Option<Self> {
        &node.skeleton
    }

    fn slot_mut(node: &mut Node) -> &mut Option<Self> {
        &mut node.skeleton
    }

    fn create_runtime(scene: &mut Scene, node: Handle) {
        let pose = SkeletonPose::new(scene.shared.clone());
        let handle = scene.runtime.add(pose).handle;
        if let Some(binding) = scene
            .nodes
            .get_mut(node)
            .and_then(Node::component_mut::<SkeletonBinding>)
        {
            binding.pose = handle;
        }
    }

    fn remove_runtime(scene: &mut Scene, node: Handle) {
        let Some(binding) = scene
            .nodes
            .get(node)
            .and_then(Node::component::<SkeletonBinding>)
            .copied()
        else {
            return;
        };
        // An in-flight frame may still read the pose buffer; the actual
        // free waits for the caller's flush after its fence wait.
        scene.runtime.queue_remove::<SkeletonPose>(binding.pose);
    }

    fn resolve(scene: &Scene, node: Handle) -> Option<&Self::Runtime> {
        let binding = scene.nodes.get(node)?.component::<SkeletonBinding>()?;
        scene.runtime.get::<SkeletonPose>(binding.pose)
    }

    fn resolve_mut(scene: &mut Scene, node: Handle) -> Option<&mut Self::Runtime> {
        let binding = scene
            .nodes
            .get(node)?
            .component::<SkeletonBinding>()
            .copied()?;
        scene.runtime.get_mut::<SkeletonPose>(binding.pose)
    }
}

impl Component for AnimationBinding {
    type Runtime = AnimationPlayer;
    const KIND: ComponentKinds = ComponentKinds::ANIMATION;

    fn slot(node: &Node) -> &Option<Self> {
        &node.animation
    }

    fn slot_mut(node: &mut Node) -> &mut Option<Self> {
        &mut node.animation
    }

    fn create_runtime(scene: &mut Scene, node: Handle) {
        let handle = scene.runtime.add(AnimationPlayer::new()).handle;
        if let Some(binding) = scene
            .nodes
            .get_mut(node)
            .and_then(Node::component_mut::<AnimationBinding>)
        {
            binding.player = handle;
        }
    }

    fn remove_runtime(scene: &mut Scene, node: Handle) {
        let Some(binding) = scene
            .nodes
            .get(node)
            .and_then(Node::component::<AnimationBinding>)
            .copied()
        else {
            return;
        };
        scene.runtime.remove::<AnimationPlayer>(binding.player);
    }

    fn resolve(scene: &Scene, node: Handle) -> Option<&Self::Runtime> {
        let binding = scene.nodes.get(node)?.component::<AnimationBinding>()?;
        scene.runtime.get::<AnimationPlayer>(binding.player)
    }

    fn resolve_mut(scene: &mut Scene, node: Handle) -> Option<&mut Self::Runtime> {
        let binding = scene
            .nodes
            .get(node)?
            .component::<AnimationBinding>()
            .copied()?;
        scene.runtime.get_mut::<AnimationPlayer>(binding.player)
    }
}

impl Component for ScriptBinding {
    type Runtime = ScriptInstance;
    const KIND: ComponentKinds = ComponentKinds::SCRIPT;

    fn slot(node: &Node) -> &Option<Self> {
        &node.script
    }

    fn slot_mut(node: &mut Node) -> &mut Option<Self> {
        &mut node.script
    }

    fn create_runtime(scene: &mut Scene, node: Handle) {
        let handle = scene.runtime.add(ScriptInstance::new()).handle;
        if let Some(binding) = scene
            .nodes
            .get_mut(node)
            .and_then(Node::component_mut::<ScriptBinding>)
        {
            binding.instance = handle;
        }
    }

    fn remove_runtime(scene: &mut Scene, node: Handle) {
        let Some(binding) = scene
            .nodes
            .get(node)
            .and_then(Node::component::<ScriptBinding>)
            .copied()
        else {
            return;
        };
        scene.runtime.remove::<ScriptInstance>(binding.instance);
    }

    fn resolve(scene: &Scene, node: Handle) -> Option<&Self::Runtime> {
        let binding = scene.nodes.get(node)?.component::<ScriptBinding>()?;
        scene.runtime.get::<ScriptInstance>(binding.instance)
    }

    fn resolve_mut(scene: &mut Scene, node: Handle) -> Option<&mut Self::Runtime> {
        let binding = scene
            .nodes
            .get(node)?
            .component::<ScriptBinding>()
            .copied()?;
        scene.runtime.get_mut::<ScriptInstance>(binding.instance)
    }
}
