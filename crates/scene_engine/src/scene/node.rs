//! Scene node and identity components
//!
//! A [`Node`] carries its name, tree links and one optional slot per
//! component kind. Identity components are the cheap, copyable per-node
//! data; the heavyweight kinds (skeleton pose, animation playback, script
//! state) store only a [`Handle`] into the scene's private runtime registry
//! and are resolved through the scene's component accessors, never mutated
//! directly on the node.

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::pool::Handle;

bitflags! {
    /// Presence mask over the closed set of component kinds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComponentKinds: u32 {
        /// Local/global transform matrices
        const TRANSFORM = 1 << 0;
        /// Mesh reference for rendering
        const MESH_RENDERER = 1 << 1;
        /// Follow a bone of a skeleton node
        const BONE_ATTACHMENT = 1 << 2;
        /// Runtime skeleton pose (GPU-backed)
        const SKELETON = 1 << 3;
        /// Runtime animation playback
        const ANIMATION = 1 << 4;
        /// Runtime script state
        const SCRIPT = 1 << 5;
    }
}

/// Transform component: base, per-frame local and resolved global matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Transform3D {
    /// Rest matrix the local transform resets to
    pub base: Mat4,
    /// This frame's local transform; scripts and animations write here
    pub local: Mat4,
    /// Resolved world matrix, written by the update traversal
    pub global: Mat4,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self {
            base: Mat4::identity(),
            local: Mat4::identity(),
            global: Mat4::identity(),
        }
    }
}

impl Transform3D {
    /// Initialize base and local to the same matrix
    pub fn init(&mut self, matrix: Mat4) {
        self.base = matrix;
        self.local = matrix;
    }

    /// Overwrite this frame's local transform
    pub fn set(&mut self, matrix: Mat4) {
        self.local = matrix;
    }

    /// Reset the local transform back to the base matrix
    pub fn reset(&mut self) {
        self.local = self.base;
    }
}

/// Mesh reference component
///
/// `mesh` points at an externally owned mesh asset; `skeleton_node`
/// references the *node* carrying the skeleton that skins this mesh (not a
/// registry entry), so it survives scene merges via node remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshRenderer {
    /// Externally owned mesh asset
    pub mesh: Handle,
    /// Node whose skeleton pose skins this mesh
    pub skeleton_node: Handle,
}

/// Bone attachment component: the node follows one bone of a skeleton node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoneAttachment {
    /// Node carrying the skeleton to follow
    pub skeleton_node: Handle,
    /// Bone index within that skeleton's rig
    pub bone_index: u32,
}

/// Identity side of the skeleton component
///
/// `pose` is a handle into the scene's runtime registry; the pose object
/// itself is owned by the scene, not the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkeletonBinding {
    /// Runtime [`SkeletonPose`](crate::scene::skeleton::SkeletonPose)
    pub pose: Handle,
}

/// Identity side of the animation component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationBinding {
    /// Runtime [`AnimationPlayer`](crate::scene::animation::AnimationPlayer)
    pub player: Handle,
}

/// Identity side of the script component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptBinding {
    /// Runtime [`ScriptInstance`](crate::scene::script::ScriptInstance)
    pub instance: Handle,
}

/// A node in the scene tree
///
/// Every non-root node has exactly one parent and appears exactly once in
/// that parent's ordered children list. Tree links are maintained by the
/// scene's structural operations; the setters here only update this node's
/// own fields.
#[derive(Debug, Default)]
pub struct Node {
    /// Display name, not required to be unique
    pub name: String,

    parent: Handle,
    children: Vec<Handle>,

    kinds: ComponentKinds,
    pub(crate) transform: Option<Transform3D>,
    pub(crate) mesh_renderer: Option<MeshRenderer>,
    pub(crate) bone_attachment: Option<BoneAttachment>,
    pub(crate) skeleton: Option<SkeletonBinding>,
    pub(crate) animation: Option<AnimationBinding>,
    pub(crate) script: Option<ScriptBinding>,
}

impl Node {
    /// Create a detached node with no components
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Handle::INVALID,
            ..Default::default()
        }
    }

    /// Parent handle, invalid for the root and detached nodes
    pub fn parent(&self) -> Handle {
        self.parent
    }

    /// Ordered children handles
    pub fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Presence mask of attached component kinds
    pub fn kinds(&self) -> ComponentKinds {
        self.kinds
    }

    /// Check presence of component kind `C`
    pub fn has<C: super::component::Component>(&self) -> bool {
        self.kinds.contains(C::KIND)
    }

    /// Read the identity component of kind `C`
    pub fn component<C: super::component::Component>(&self) -> Option<&C> {
        C::slot(self).as_ref()
    }

    pub(crate) fn component_mut<C: super::component::Component>(&mut self) -> Option<&mut C> {
        C::slot_mut(self).as_mut()
    }

    pub(crate) fn insert_component<C: super::component::Component>(&mut self, component: C) -> &mut C {
        self.kinds.insert(C::KIND);
        C::slot_mut(self).insert(component)
    }

    pub(crate) fn take_component<C: super::component::Component>(&mut self) -> Option<C> {
        self.kinds.remove(C::KIND);
        C::slot_mut(self).take()
    }

    pub(crate) fn set_parent(&mut self, parent: Handle) {
        self.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: Handle) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: Handle) {
        self.children.retain(|&existing| existing != child);
    }
}
