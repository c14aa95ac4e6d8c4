//! Scene graph
//!
//! A [`Scene`] owns a slot pool of nodes plus a private registry for
//! runtime-resolved components. It exposes node CRUD, structural edits
//! (remove, flatten, reparent, rename), component read/write/remove with
//! identity↔runtime resolution, scene merging and the per-frame update
//! traversal.
//!
//! Every structural edit is atomic: a rejected operation returns `false`
//! (or an invalid handle) and leaves the scene exactly as it was. All
//! mutation is expected on one logical update thread per frame; there is no
//! internal locking.

use std::collections::HashMap;

use crate::core::config::{ConfigError, SceneConfig};
use crate::foundation::math::Mat4;
use crate::gpu::SharedResources;
use crate::pool::{Handle, Registry, SlotPool};
use crate::scene::animation::{AnimationPlayer, ChannelTarget};
use crate::scene::component::Component;
use crate::scene::node::{
    AnimationBinding, BoneAttachment, MeshRenderer, Node, ScriptBinding, SkeletonBinding,
    Transform3D,
};
use crate::scene::script::ScriptInstance;
use crate::scene::skeleton::SkeletonPose;

/// Hierarchical scene with handle-addressed nodes and runtime components
pub struct Scene {
    /// Display name of the scene
    pub name: String,

    pub(crate) nodes: SlotPool<Node>,
    pub(crate) root: Handle,
    /// Runtime-resolved component storage, private to this scene
    pub(crate) runtime: Registry,
    pub(crate) shared: SharedResources,

    config: SceneConfig,
    current_frame: usize,
    delta_time: f32,
}

impl Scene {
    /// Create a scene with default configuration and a null GPU device
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_shared(name, SharedResources::default())
    }

    /// Create a scene with the caller's GPU device and frame count
    pub fn with_shared(name: impl Into<String>, shared: SharedResources) -> Self {
        let config = SceneConfig {
            max_frames_in_flight: shared.max_frames_in_flight,
            ..SceneConfig::default()
        };
        Self::build(name.into(), config, shared)
    }

    /// Create a scene from a validated configuration
    pub fn with_config(
        name: impl Into<String>,
        config: SceneConfig,
        mut shared: SharedResources,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        shared.max_frames_in_flight = config.max_frames_in_flight;
        Ok(Self::build(name.into(), config, shared))
    }

    fn build(name: String, config: SceneConfig, shared: SharedResources) -> Self {
        let mut nodes = SlotPool::new();
        nodes.reserve(config.initial_node_capacity);

        let mut runtime = Registry::new();
        runtime
            .view_mut::<SkeletonPose>()
            .reserve(config.initial_pose_capacity);

        Self {
            name,
            nodes,
            root: Handle::INVALID,
            runtime,
            shared,
            config,
            current_frame: 0,
            delta_time: 0.0,
        }
    }

    // --------- Node management ---------

    /// Create the root node if the scene doesn't have one yet
    ///
    /// Returns the existing root otherwise.
    pub fn add_root(&mut self, name: impl Into<String>) -> Handle {
        if self.nodes.is_valid(self.root) {
            log::warn!("Scene '{}' already has a root node", self.name);
            return self.root;
        }

        let mut node = Node::new(name);
        node.insert_component(Transform3D::default());
        self.root = self.nodes.insert(node);
        self.root
    }

    /// Handle of the root node
    pub fn root_handle(&self) -> Handle {
        self.root
    }

    /// The configuration this scene was built with
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Create a node with an identity transform under `parent`
    ///
    /// An invalid (sentinel) parent means "under the root". A stale parent
    /// handle fails: no node is created and `Handle::INVALID` is returned.
    pub fn add_node(&mut self, name: impl Into<String>, parent: Handle) -> Handle {
        let parent = if parent.is_valid() { parent } else { self.root };
        if !self.nodes.is_valid(parent) {
            log::warn!("add_node: parent node does not exist");
            return Handle::INVALID;
        }

        let mut node = Node::new(name);
        node.insert_component(Transform3D::default());
        node.set_parent(parent);
        let handle = self.nodes.insert(node);

        // Re-fetch the parent after the insert
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.add_child(handle);
        }

        handle
    }

    /// Create a detached node with no components
    ///
    /// Merge primitive: the caller is responsible for linking it into the
    /// tree and populating components.
    pub fn add_node_raw(&mut self, name: impl Into<String>) -> Handle {
        self.nodes.insert(Node::new(name))
    }

    /// Remove a node
    ///
    /// `recursive` removes the whole subtree depth-first, children before
    /// parent. Otherwise the node's children are reparented to its former
    /// parent first (see [`flatten_node`](Self::flatten_node)). Every
    /// attached component is removed, deferred where required. The root
    /// cannot be removed.
    pub fn remove_node(&mut self, handle: Handle, recursive: bool) -> bool {
        if !self.nodes.is_valid(handle) {
            return false;
        }
        if handle == self.root {
            log::warn!("remove_node: refusing to remove the root node");
            return false;
        }

        let (children, parent) = match self.nodes.get(handle) {
            Some(node) => (node.children().to_vec(), node.parent()),
            None => return false,
        };

        for child in children {
            if recursive {
                self.remove_node(child, true);
            } else {
                self.reparent_node(child, parent);
            }
        }

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.remove_child(handle);
        }

        self.remove_all_components(handle);
        self.nodes.remove(handle);

        true
    }

    /// Remove a node while keeping its children
    ///
    /// The children are reattached to the removed node's former parent, in
    /// order, before the node itself goes away.
    pub fn flatten_node(&mut self, handle: Handle) -> bool {
        self.remove_node(handle, false)
    }

    /// Move a node under a new parent
    ///
    /// Rejected for the root, for self-parenting and whenever `new_parent`
    /// lies inside the moved node's own subtree (checked by walking
    /// ancestors from `new_parent` up to the root). An invalid `new_parent`
    /// means "under the root".
    pub fn reparent_node(&mut self, handle: Handle, new_parent: Handle) -> bool {
        if handle == self.root || handle == new_parent {
            return false;
        }

        let new_parent = if new_parent.is_valid() {
            new_parent
        } else {
            self.root
        };
        if !self.nodes.is_valid(handle) || !self.nodes.is_valid(new_parent) {
            return false;
        }

        // Cycle check: if the moved node shows up among the new parent's
        // ancestors, the reparent would detach the subtree from the root.
        let mut cursor = new_parent;
        while cursor.is_valid() {
            if cursor == handle {
                log::warn!("reparent_node: new parent is a descendant of the moved node");
                return false;
            }
            cursor = match self.nodes.get(cursor) {
                Some(node) => node.parent(),
                None => Handle::INVALID,
            };
        }

        let old_parent = self.nodes.get(handle).map(Node::parent);
        if let Some(old_parent) = old_parent {
            if let Some(node) = self.nodes.get_mut(old_parent) {
                node.remove_child(handle);
            }
        }

        if let Some(node) = self.nodes.get_mut(new_parent) {
            node.add_child(handle);
        }
        if let Some(node) = self.nodes.get_mut(handle) {
            node.set_parent(new_parent);
        }

        true
    }

    /// Rename a node
    pub fn rename_node(&mut self, handle: Handle, name: impl Into<String>) -> bool {
        match self.nodes.get_mut(handle) {
            Some(node) => {
                node.name = name.into();
                true
            }
            None => false,
        }
    }

    // --------- Node queries ---------

    /// Read a node
    pub fn node(&self, handle: Handle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    /// Whether `handle` resolves to a live node
    pub fn node_valid(&self, handle: Handle) -> bool {
        self.nodes.is_valid(handle)
    }

    /// Current handle for an occupied node index
    pub fn node_handle(&self, index: u32) -> Handle {
        self.nodes.handle_at(index)
    }

    /// Number of live nodes
    pub fn node_count(&self) -> u32 {
        self.nodes.count()
    }

    /// Parent of a node, invalid for the root or a missing node
    pub fn node_parent(&self, handle: Handle) -> Handle {
        self.nodes.get(handle).map_or(Handle::INVALID, Node::parent)
    }

    /// Children of a node, in order
    pub fn node_children(&self, handle: Handle) -> Vec<Handle> {
        self.nodes
            .get(handle)
            .map_or_else(Vec::new, |node| node.children().to_vec())
    }

    /// Iterate live `(Handle, &Node)` pairs in index order
    pub fn iter_nodes(&self) -> impl Iterator<Item = (Handle, &Node)> {
        self.nodes.iter()
    }

    // --------- Component management ---------

    /// Attach a fresh component of kind `C` to a node
    ///
    /// Any previous component of that kind is removed first. For
    /// runtime-backed kinds this allocates the runtime object in the
    /// scene's registry and wires its handle into the identity component.
    /// Returns the resolved runtime object so the caller can populate it.
    pub fn write_component<C: Component>(&mut self, node: Handle) -> Option<&mut C::Runtime> {
        if !self.nodes.is_valid(node) {
            return None;
        }

        self.remove_component::<C>(node);
        self.nodes.get_mut(node)?.insert_component(C::default());
        C::create_runtime(self, node);

        C::resolve_mut(self, node)
    }

    /// Read a node's component of kind `C`, resolved to its runtime form
    pub fn get_component<C: Component>(&self, node: Handle) -> Option<&C::Runtime> {
        C::resolve(self, node)
    }

    /// Mutable variant of [`get_component`](Self::get_component)
    pub fn get_component_mut<C: Component>(&mut self, node: Handle) -> Option<&mut C::Runtime> {
        C::resolve_mut(self, node)
    }

    /// Detach a component of kind `C` from a node
    ///
    /// Runtime objects are freed immediately, except GPU-hazard kinds whose
    /// free is queued until the caller's flush. Returns `false` if the node
    /// doesn't carry the component.
    pub fn remove_component<C: Component>(&mut self, node: Handle) -> bool {
        let present = self.nodes.get(node).is_some_and(Node::has::<C>);
        if !present {
            return false;
        }

        C::remove_runtime(self, node);
        if let Some(node) = self.nodes.get_mut(node) {
            node.take_component::<C>();
        }

        true
    }

    fn remove_all_components(&mut self, node: Handle) {
        self.remove_component::<Transform3D>(node);
        self.remove_component::<MeshRenderer>(node);
        self.remove_component::<BoneAttachment>(node);
        self.remove_component::<SkeletonBinding>(node);
        self.remove_component::<AnimationBinding>(node);
        self.remove_component::<ScriptBinding>(node);
    }

    // --------- Runtime registry access ---------

    /// Read access to the scene's runtime registry
    ///
    /// Scripts holding [`ResourceRef`](crate::scene::script::ScriptValue)
    /// variables resolve them here; the registry also accepts
    /// application-owned resource types alongside the built-in runtime
    /// components.
    pub fn runtime(&self) -> &Registry {
        &self.runtime
    }

    /// Mutable access to the scene's runtime registry
    pub fn runtime_mut(&mut self) -> &mut Registry {
        &mut self.runtime
    }

    // --------- Deferred removal ---------

    /// Whether the runtime pool for `T` has queued removals
    pub fn has_pending_removals<T: 'static>(&self) -> bool {
        self.runtime.has_pending_removals::<T>()
    }

    /// Whether any runtime pool has queued removals
    pub fn has_any_pending_removals(&self) -> bool {
        self.runtime.has_any_pending_removals()
    }

    /// Number of removals queued in the runtime pool for `T`
    pub fn pending_removal_count<T: 'static>(&self) -> usize {
        self.runtime
            .view::<T>()
            .map_or(0, |pool| pool.pending_removals().len())
    }

    /// Free queued removals of type `T`
    ///
    /// The caller must only do this once no in-flight frame can still read
    /// the resources, e.g. after waiting on its frame-completion fences.
    pub fn flush_removals<T: 'static>(&mut self) -> u32 {
        self.runtime.flush_removals::<T>()
    }

    /// Free queued removals in every runtime pool
    pub fn flush_all_removals(&mut self) -> u32 {
        self.runtime.flush_all_removals()
    }

    // --------- Scene merging ---------

    /// Deep-copy another scene's node tree under `parent`
    ///
    /// Two passes: the first creates every new node and builds an
    /// old-index → new-handle map; the second links the tree and copies
    /// components, rewriting every embedded node reference (parent/child
    /// links, skeleton-node targets of mesh renderers and bone attachments,
    /// animation channel targets, script-held node variables) through that
    /// map. References that don't map inside the copied set are invalidated
    /// rather than left pointing into `source`.
    pub fn add_scene(&mut self, source: &Scene, parent: Handle) -> bool {
        if source.node_count() == 0 {
            return false;
        }

        let parent = if parent.is_valid() { parent } else { self.root };
        if !self.nodes.is_valid(parent) {
            log::warn!("add_scene: parent node does not exist");
            return false;
        }

        // First pass: create all nodes, recording old index → new handle
        let mut remap: HashMap<u32, Handle> = HashMap::new();
        for index in 0..source.nodes.capacity() {
            if !source.nodes.is_occupied(index) {
                continue;
            }
            if let Some(from_node) = source.node(source.node_handle(index)) {
                remap.insert(index, self.add_node_raw(from_node.name.clone()));
            }
        }

        // Second pass: link the tree and copy components with remapping
        for index in 0..source.nodes.capacity() {
            let from_handle = source.node_handle(index);
            let Some(from_node) = source.node(from_handle) else {
                continue;
            };
            let Some(&to_handle) = remap.get(&index) else {
                continue;
            };

            // Parent link; the source root grafts under `parent`
            let from_parent = from_node.parent();
            if from_parent.is_valid() {
                let to_parent = remap
                    .get(&from_parent.index)
                    .copied()
                    .unwrap_or(Handle::INVALID);
                if let Some(node) = self.nodes.get_mut(to_handle) {
                    node.set_parent(to_parent);
                }
            } else {
                if let Some(node) = self.nodes.get_mut(to_handle) {
                    node.set_parent(parent);
                }
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.add_child(to_handle);
                }
            }

            // Children links, preserving source order
            let to_children: Vec<Handle> = from_node
                .children()
                .iter()
                .filter_map(|child| remap.get(&child.index).copied())
                .collect();
            if let Some(node) = self.nodes.get_mut(to_handle) {
                for child in to_children {
                    node.add_child(child);
                }
            }

            self.copy_components(source, from_handle, from_node, to_handle, &remap);
        }

        // The copied subtree needs resolved globals before the next update
        self.refresh_global_transforms(parent);

        true
    }

    fn copy_components(
        &mut self,
        source: &Scene,
        from_handle: Handle,
        from_node: &Node,
        to_handle: Handle,
        remap: &HashMap<u32, Handle>,
    ) {
        let remap_node = |handle: Handle| -> Handle {
            if !handle.is_valid() {
                return Handle::INVALID;
            }
            remap.get(&handle.index).copied().unwrap_or(Handle::INVALID)
        };

        if let Some(from_transform) = from_node.component::<Transform3D>() {
            if let Some(transform) = self.write_component::<Transform3D>(to_handle) {
                *transform = from_transform.clone();
            }
        }

        if let Some(from_renderer) = from_node.component::<MeshRenderer>().copied() {
            if let Some(renderer) = self.write_component::<MeshRenderer>(to_handle) {
                // The mesh is an external asset reference; only the
                // skeleton-node link is scene-local
                renderer.mesh = from_renderer.mesh;
                renderer.skeleton_node = remap_node(from_renderer.skeleton_node);
            }
        }

        if let Some(from_attach) = from_node.component::<BoneAttachment>().copied() {
            if let Some(attach) = self.write_component::<BoneAttachment>(to_handle) {
                attach.skeleton_node = remap_node(from_attach.skeleton_node);
                attach.bone_index = from_attach.bone_index;
            }
        }

        if from_node.has::<SkeletonBinding>() {
            let from_pose = source.get_component::<SkeletonBinding>(from_handle);
            if let Some(pose) = self.write_component::<SkeletonBinding>(to_handle) {
                if let Some(from_pose) = from_pose {
                    pose.copy_from(from_pose);
                }
            }
        }

        if from_node.has::<AnimationBinding>() {
            let from_player = source.get_component::<AnimationBinding>(from_handle);
            if let Some(player) = self.write_component::<AnimationBinding>(to_handle) {
                if let Some(from_player) = from_player {
                    *player = from_player.clone();
                    player.remap_node_targets(remap);
                }
            }
        }

        if from_node.has::<ScriptBinding>() {
            let from_instance = source.get_component::<ScriptBinding>(from_handle);
            if let Some(instance) = self.write_component::<ScriptBinding>(to_handle) {
                if let Some(from_instance) = from_instance {
                    *instance = from_instance.clone_for_merge(remap);
                }
            }
        }
    }

    // --------- Update traversal ---------

    /// Advance the scene by one frame
    ///
    /// `frame_index` selects which per-frame GPU data slice gets written
    /// (`0..max_frames_in_flight`); the scene attaches no other meaning to
    /// it.
    pub fn update(&mut self, delta_time: f32, frame_index: usize) {
        self.delta_time = delta_time;
        self.current_frame = frame_index % self.shared.max_frames_in_flight;
        self.update_recursive(self.root, Mat4::identity());
    }

    /// Pre-order depth-first update of a subtree
    ///
    /// Per node: run the script hook (it may rewrite this frame's local
    /// transform), advance animation playback, resolve the local matrix
    /// (bone attachments override it with the referenced skeleton's bone
    /// pose), update the node's own skeleton pose, combine with the
    /// parent's already-finalized global and recurse. A child never reads a
    /// parent global that isn't final for the current frame.
    pub fn update_recursive(&mut self, node: Handle, parent_global_transform: Mat4) {
        let handle = if node.is_valid() { node } else { self.root };
        if !self.nodes.is_valid(handle) {
            return;
        }

        self.run_script(handle);
        self.run_animation(handle);

        let mut local = self
            .nodes
            .get(handle)
            .and_then(Node::component::<Transform3D>)
            .map_or_else(Mat4::identity, |transform| transform.local);

        if let Some(attach) = self
            .nodes
            .get(handle)
            .and_then(Node::component::<BoneAttachment>)
            .copied()
        {
            if let Some(pose) = self.get_component::<SkeletonBinding>(attach.skeleton_node) {
                local = pose.final_pose(attach.bone_index) * local;
            }
        }

        let frame = self.current_frame;
        if let Some(pose) = self.get_component_mut::<SkeletonBinding>(handle) {
            pose.update(frame);
        }

        let global = parent_global_transform * local;
        if let Some(transform) = self
            .nodes
            .get_mut(handle)
            .and_then(Node::component_mut::<Transform3D>)
        {
            transform.global = global;
        }

        let children = self
            .nodes
            .get(handle)
            .map_or_else(Vec::new, |node| node.children().to_vec());
        for child in children {
            self.update_recursive(child, global);
        }
    }

    /// Frame index passed to the last [`update`](Self::update)
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    fn run_script(&mut self, node: Handle) {
        let Some(binding) = self
            .nodes
            .get(node)
            .and_then(Node::component::<ScriptBinding>)
            .copied()
        else {
            return;
        };
        let Some(instance) = self.runtime.get_mut::<ScriptInstance>(binding.instance) else {
            return;
        };
        let Some(mut behavior) = instance.take_behavior() else {
            return;
        };

        let delta_time = self.delta_time;
        behavior.update(self, node, delta_time);

        // The script may have removed its own component; only restore the
        // behavior if the instance is still there
        if let Some(instance) = self.runtime.get_mut::<ScriptInstance>(binding.instance) {
            instance.restore_behavior(behavior);
        }
    }

    fn run_animation(&mut self, node: Handle) {
        let Some(binding) = self
            .nodes
            .get(node)
            .and_then(Node::component::<AnimationBinding>)
            .copied()
        else {
            return;
        };

        let delta_time = self.delta_time;
        let Some(player) = self.runtime.get_mut::<AnimationPlayer>(binding.player) else {
            return;
        };
        let edits = player.advance(delta_time);

        // Apply after the registry borrow ends
        for edit in edits {
            let matrix = edit.transform.to_matrix();
            match edit.target {
                ChannelTarget::Node(target) => {
                    if let Some(transform) = self
                        .nodes
                        .get_mut(target)
                        .and_then(Node::component_mut::<Transform3D>)
                    {
                        transform.set(matrix);
                    }
                }
                ChannelTarget::Bone {
                    skeleton_node,
                    bone_index,
                } => {
                    if let Some(pose) = self.get_component_mut::<SkeletonBinding>(skeleton_node) {
                        pose.set_local_pose(bone_index, matrix);
                    }
                }
            }
        }
    }

    /// Recompute resolved global transforms for a subtree
    ///
    /// Transform-only walk used after structural changes (e.g. a merge);
    /// unlike [`update_recursive`](Self::update_recursive) it drives no
    /// scripts, animations or skeletons.
    fn refresh_global_transforms(&mut self, node: Handle) {
        let parent = self.nodes.get(node).map_or(Handle::INVALID, Node::parent);
        let parent_global = self
            .nodes
            .get(parent)
            .and_then(Node::component::<Transform3D>)
            .map_or_else(Mat4::identity, |transform| transform.global);
        self.refresh_recursive(node, parent_global);
    }

    fn refresh_recursive(&mut self, handle: Handle, parent_global: Mat4) {
        if !self.nodes.is_valid(handle) {
            return;
        }

        let local = self
            .nodes
            .get(handle)
            .and_then(Node::component::<Transform3D>)
            .map_or_else(Mat4::identity, |transform| transform.local);
        let global = parent_global * local;

        if let Some(transform) = self
            .nodes
            .get_mut(handle)
            .and_then(Node::component_mut::<Transform3D>)
        {
            transform.global = global;
        }

        let children = self
            .nodes
            .get(handle)
            .map_or_else(Vec::new, |node| node.children().to_vec());
        for child in children {
            self.refresh_recursive(child, global);
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("node_count", &self.node_count())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec3, Vec4};
    use crate::gpu::{GpuDevice, RecordingDevice};
    use crate::scene::animation::{Channel, ChannelPath, Clip, Interpolation, Sampler};
    use crate::scene::script::{NodeScript, ScriptValue};
    use crate::scene::skeleton::{Bone, SkeletonRig};
    use approx::assert_relative_eq;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn scene_with_root() -> (Scene, Handle) {
        let mut scene = Scene::new("test");
        let root = scene.add_root("Root");
        (scene, root)
    }

    fn one_bone_rig() -> SkeletonRig {
        SkeletonRig {
            bones: vec![Bone {
                name: "root".to_string(),
                parent: None,
                local_bind: Mat4::identity(),
                inverse_bind: Mat4::identity(),
            }],
        }
    }

    /// Walk the tree from the root and check it is exactly the live node
    /// set, with consistent parent/child links and no cycles.
    fn assert_tree_invariant(scene: &Scene) {
        let live: HashSet<Handle> = scene.iter_nodes().map(|(handle, _)| handle).collect();
        let root = scene.root_handle();
        assert!(live.contains(&root));

        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            assert!(visited.insert(handle), "node visited twice: cycle or duplicate child link");
            let node = scene.node(handle).expect("reachable node must be live");
            for &child in node.children() {
                assert_eq!(scene.node_parent(child), handle);
                stack.push(child);
            }
        }

        assert_eq!(visited, live, "every live node must be reachable from the root");
    }

    #[test]
    fn test_add_root_is_idempotent() {
        let (mut scene, root) = scene_with_root();
        assert_eq!(scene.add_root("Another"), root);
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn test_add_node_defaults_to_root() {
        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("A", Handle::INVALID);

        assert!(scene.node_valid(node));
        assert_eq!(scene.node_parent(node), root);
        assert_eq!(scene.node_children(root), vec![node]);
        // Nodes are created with an identity transform
        assert!(scene.node(node).unwrap().has::<Transform3D>());
    }

    #[test]
    fn test_add_node_rejects_stale_parent() {
        let (mut scene, root) = scene_with_root();
        let gone = scene.add_node("Gone", root);
        scene.remove_node(gone, true);

        let count = scene.node_count();
        let node = scene.add_node("Orphan", gone);
        assert_eq!(node, Handle::INVALID);
        assert_eq!(scene.node_count(), count);
    }

    #[test]
    fn test_remove_node_recursive() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);
        let c = scene.add_node("C", b);

        assert!(scene.remove_node(a, true));
        assert!(!scene.node_valid(a));
        assert!(!scene.node_valid(b));
        assert!(!scene.node_valid(c));
        assert_eq!(scene.node_count(), 1);
        assert!(scene.node_children(root).is_empty());
        assert_tree_invariant(&scene);
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let (mut scene, root) = scene_with_root();
        scene.add_node("A", root);

        assert!(!scene.remove_node(root, true));
        assert!(!scene.remove_node(root, false));
        assert_eq!(scene.node_count(), 2);
    }

    #[test]
    fn test_reparent_under_descendant_then_flatten() {
        // From an empty scene with root R: A under R, B and C under A.
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);
        let c = scene.add_node("C", a);

        // Reparenting A under its own descendant must fail and change nothing
        assert!(!scene.reparent_node(a, b));
        assert_eq!(scene.node_parent(a), root);
        assert_eq!(scene.node_children(a), vec![b, c]);

        // Flatten A: B and C move to R in order, A's slot goes invalid
        assert!(scene.remove_node(a, false));
        assert_eq!(scene.node_children(root), vec![b, c]);
        assert!(scene.node_valid(b));
        assert!(scene.node_valid(c));
        assert!(!scene.node_valid(a));
        assert_tree_invariant(&scene);
    }

    #[test]
    fn test_flatten_preserves_child_components() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);

        if let Some(renderer) = scene.write_component::<MeshRenderer>(b) {
            renderer.mesh = Handle::new(42, 0);
        }

        assert!(scene.flatten_node(a));
        let renderer = scene
            .get_component::<MeshRenderer>(b)
            .expect("child component must survive the flatten");
        assert_eq!(renderer.mesh, Handle::new(42, 0));
    }

    #[test]
    fn test_reparent_rejects_deep_descendant() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);
        let c = scene.add_node("C", b);

        assert!(!scene.reparent_node(a, c));
        assert!(!scene.reparent_node(a, a));
        assert!(!scene.reparent_node(root, a));

        // Tree unchanged
        assert_eq!(scene.node_parent(a), root);
        assert_eq!(scene.node_parent(b), a);
        assert_eq!(scene.node_parent(c), b);
        assert_tree_invariant(&scene);
    }

    #[test]
    fn test_reparent_moves_subtree() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", root);
        let c = scene.add_node("C", a);

        assert!(scene.reparent_node(c, b));
        assert_eq!(scene.node_parent(c), b);
        assert!(scene.node_children(a).is_empty());
        assert_eq!(scene.node_children(b), vec![c]);

        // Invalid target means "under the root"
        assert!(scene.reparent_node(c, Handle::INVALID));
        assert_eq!(scene.node_parent(c), root);
        assert_tree_invariant(&scene);
    }

    #[test]
    fn test_tree_invariant_after_edit_sequence() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);
        let c = scene.add_node("C", b);
        let d = scene.add_node("D", root);

        scene.reparent_node(b, d);
        scene.remove_node(c, true);
        scene.flatten_node(b);
        scene.reparent_node(d, a);
        scene.add_node("E", d);

        assert_tree_invariant(&scene);
    }

    #[test]
    fn test_rename_node() {
        let (mut scene, root) = scene_with_root();
        assert!(scene.rename_node(root, "Renamed"));
        assert_eq!(scene.node(root).unwrap().name, "Renamed");
        assert!(!scene.rename_node(Handle::INVALID, "Nope"));
    }

    #[test]
    fn test_skeleton_resolution_symmetry() {
        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("Skeletal", root);

        let pose = scene
            .write_component::<SkeletonBinding>(node)
            .expect("write_component should resolve");
        assert!(pose.set_rig(one_bone_rig()));

        // Reads resolve to the same underlying pose object
        let pose = scene
            .get_component::<SkeletonBinding>(node)
            .expect("read should resolve");
        assert_eq!(pose.bone_count(), 1);

        // The identity component stores the registry handle, nothing else
        let binding = scene.node(node).unwrap().component::<SkeletonBinding>().unwrap();
        assert!(scene.runtime().has::<SkeletonPose>(binding.pose));

        assert!(scene.remove_component::<SkeletonBinding>(node));
        assert!(scene.get_component::<SkeletonBinding>(node).is_none());
    }

    #[test]
    fn test_write_component_replaces_previous() {
        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("Skeletal", root);

        scene.write_component::<SkeletonBinding>(node);
        let first = scene.node(node).unwrap().component::<SkeletonBinding>().unwrap().pose;

        scene.write_component::<SkeletonBinding>(node);
        let second = scene.node(node).unwrap().component::<SkeletonBinding>().unwrap().pose;

        assert_ne!(first, second);
        // The replaced pose is pending removal, not freed
        assert_eq!(scene.pending_removal_count::<SkeletonPose>(), 1);
        assert!(scene.runtime().has::<SkeletonPose>(first));

        scene.flush_removals::<SkeletonPose>();
        assert!(!scene.runtime().has::<SkeletonPose>(first));
        assert!(scene.runtime().has::<SkeletonPose>(second));
    }

    #[test]
    fn test_deferred_gpu_free() {
        let device = Arc::new(RecordingDevice::new());
        let shared = SharedResources::new(device.clone() as Arc<dyn GpuDevice>, 2);
        let mut scene = Scene::with_shared("gpu", shared);
        let root = scene.add_root("Root");
        let node = scene.add_node("Skeletal", root);

        scene
            .write_component::<SkeletonBinding>(node)
            .unwrap()
            .set_rig(one_bone_rig());
        assert_eq!(device.live(), 1);

        // Removal queues; nothing is freed synchronously
        assert!(scene.remove_component::<SkeletonBinding>(node));
        assert_eq!(device.destroyed(), 0);
        assert!(scene.has_pending_removals::<SkeletonPose>());
        assert!(scene.has_any_pending_removals());

        // Only the flush (after the caller's fence wait) performs the free
        assert_eq!(scene.flush_removals::<SkeletonPose>(), 1);
        assert_eq!(device.live(), 0);
        assert!(!scene.has_any_pending_removals());
    }

    #[test]
    fn test_remove_node_releases_runtime_components() {
        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("Loaded", root);

        scene.write_component::<SkeletonBinding>(node);
        scene.write_component::<AnimationBinding>(node);
        scene.write_component::<ScriptBinding>(node);
        assert_eq!(scene.runtime().count::<AnimationPlayer>(), 1);
        assert_eq!(scene.runtime().count::<ScriptInstance>(), 1);

        assert!(scene.remove_node(node, true));

        // Safe kinds free immediately; the pose waits in the queue
        assert_eq!(scene.runtime().count::<AnimationPlayer>(), 0);
        assert_eq!(scene.runtime().count::<ScriptInstance>(), 0);
        assert_eq!(scene.pending_removal_count::<SkeletonPose>(), 1);
        scene.flush_all_removals();
        assert_eq!(scene.runtime().count::<SkeletonPose>(), 0);
    }

    #[test]
    fn test_update_orders_parent_before_child() {
        let (mut scene, root) = scene_with_root();
        let a = scene.add_node("A", root);
        let b = scene.add_node("B", a);

        scene
            .get_component_mut::<Transform3D>(a)
            .unwrap()
            .set(Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
        scene
            .get_component_mut::<Transform3D>(b)
            .unwrap()
            .set(Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0)));

        scene.update(0.016, 0);

        let global = scene.get_component::<Transform3D>(b).unwrap().global;
        assert_relative_eq!(global.m14, 1.0, epsilon = 1e-6);
        assert_relative_eq!(global.m24, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_script_runs_before_transform_resolution() {
        struct Riser;
        impl NodeScript for Riser {
            fn update(&mut self, scene: &mut Scene, node: Handle, delta_time: f32) {
                let lift = Mat4::new_translation(&Vec3::new(0.0, delta_time, 0.0));
                if let Some(transform) = scene.get_component_mut::<Transform3D>(node) {
                    transform.set(lift);
                }
            }
        }

        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("Scripted", root);
        scene
            .write_component::<ScriptBinding>(node)
            .unwrap()
            .set_behavior(Box::new(Riser));

        // The hook's write must land in this same frame's global
        scene.update(1.0, 0);
        let global = scene.get_component::<Transform3D>(node).unwrap().global;
        assert_relative_eq!(global.m24, 1.0, epsilon = 1e-6);

        // The behavior survives the take/restore cycle
        scene.update(0.5, 1);
        let global = scene.get_component::<Transform3D>(node).unwrap().global;
        assert_relative_eq!(global.m24, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_animation_drives_node_transform() {
        let (mut scene, root) = scene_with_root();
        // The animator precedes the target in traversal order, so the
        // sampled transform lands before the target resolves its global
        let animator = scene.add_node("Animator", root);
        let target = scene.add_node("Target", root);

        let clip = Clip {
            name: "slide".to_string(),
            samplers: vec![Sampler {
                times: vec![0.0, 1.0],
                values: vec![Vec4::zeros(), Vec4::new(4.0, 0.0, 0.0, 0.0)],
                interpolation: Interpolation::Linear,
            }],
            channels: vec![Channel {
                sampler: 0,
                path: ChannelPath::Translation,
                target: ChannelTarget::Node(target),
            }],
            duration: 0.0,
        };

        let player = scene.write_component::<AnimationBinding>(animator).unwrap();
        player.add_clip(clip);
        assert!(player.play("slide"));

        scene.update(0.5, 0);
        let global = scene.get_component::<Transform3D>(target).unwrap().global;
        assert_relative_eq!(global.m14, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_bone_attachment_follows_skeleton() {
        let (mut scene, root) = scene_with_root();
        let skeletal = scene.add_node("Skeletal", root);
        let attached = scene.add_node("Attached", root);

        let pose = scene.write_component::<SkeletonBinding>(skeletal).unwrap();
        assert!(pose.set_rig(one_bone_rig()));
        pose.set_local_pose(0, Mat4::new_translation(&Vec3::new(0.0, 0.0, 3.0)));

        if let Some(attach) = scene.write_component::<BoneAttachment>(attached) {
            attach.skeleton_node = skeletal;
            attach.bone_index = 0;
        }

        // The skeleton node precedes the attachment in the root's children,
        // so its pose is finalized before the attachment reads it
        scene.update(0.016, 0);

        let global = scene.get_component::<Transform3D>(attached).unwrap().global;
        assert_relative_eq!(global.m34, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_update_writes_frame_skin_slice() {
        let (mut scene, root) = scene_with_root();
        let skeletal = scene.add_node("Skeletal", root);

        let pose = scene.write_component::<SkeletonBinding>(skeletal).unwrap();
        assert!(pose.set_rig(one_bone_rig()));
        pose.set_local_pose(0, Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)));

        scene.update(0.016, 1);
        assert_eq!(scene.current_frame(), 1);

        let pose = scene.get_component::<SkeletonBinding>(skeletal).unwrap();
        let slice = pose.skin_slice(1);
        assert_relative_eq!(slice[0].columns[3][0], 5.0, epsilon = 1e-6);
        // Frame 0 was never written this frame
        assert_relative_eq!(pose.skin_slice(0)[0].columns[3][0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_merge_fidelity() {
        // Source: root with a skeleton node, a skinned mesh, a bone
        // attachment, an animator and a script, all cross-referencing
        let mut source = Scene::new("source");
        let src_root = source.add_root("SrcRoot");
        let skeletal = source.add_node("Skeletal", src_root);
        let mesh = source.add_node("Mesh", src_root);
        let attached = source.add_node("Attached", skeletal);

        source
            .write_component::<SkeletonBinding>(skeletal)
            .unwrap()
            .set_rig(one_bone_rig());
        if let Some(renderer) = source.write_component::<MeshRenderer>(mesh) {
            renderer.mesh = Handle::new(7, 0);
            renderer.skeleton_node = skeletal;
        }
        if let Some(attach) = source.write_component::<BoneAttachment>(attached) {
            attach.skeleton_node = skeletal;
            attach.bone_index = 0;
        }
        let player = source.write_component::<AnimationBinding>(mesh).unwrap();
        player.add_clip(Clip {
            name: "clip".to_string(),
            samplers: vec![Sampler {
                times: vec![0.0, 1.0],
                values: vec![Vec4::zeros(), Vec4::zeros()],
                interpolation: Interpolation::Linear,
            }],
            channels: vec![Channel {
                sampler: 0,
                path: ChannelPath::Translation,
                target: ChannelTarget::Node(mesh),
            }],
            duration: 0.0,
        });
        let instance = source.write_component::<ScriptBinding>(attached).unwrap();
        instance.set_var("skeleton", ScriptValue::NodeRef(skeletal));

        // Target scene
        let (mut scene, root) = scene_with_root();
        let parent = scene.add_node("Parent", root);
        let before = scene.node_count();

        assert!(scene.add_scene(&source, parent));
        assert_eq!(scene.node_count(), before + source.node_count());

        // Locate the copies by name
        let find = |scene: &Scene, name: &str| -> Handle {
            scene
                .iter_nodes()
                .find(|(_, node)| node.name == name)
                .map(|(handle, _)| handle)
                .expect("copied node present")
        };
        let new_root = find(&scene, "SrcRoot");
        let new_skeletal = find(&scene, "Skeletal");
        let new_mesh = find(&scene, "Mesh");
        let new_attached = find(&scene, "Attached");

        // Structure: the source root grafted under `parent`
        assert_eq!(scene.node_parent(new_root), parent);
        assert_eq!(scene.node_children(new_root), vec![new_skeletal, new_mesh]);
        assert_eq!(scene.node_parent(new_attached), new_skeletal);
        assert_tree_invariant(&scene);

        // Cross-references point inside the copy, never into the source
        let renderer = scene.get_component::<MeshRenderer>(new_mesh).unwrap();
        assert_eq!(renderer.skeleton_node, new_skeletal);
        assert_eq!(renderer.mesh, Handle::new(7, 0));

        let attach = scene.get_component::<BoneAttachment>(new_attached).unwrap();
        assert_eq!(attach.skeleton_node, new_skeletal);

        let player = scene.get_component::<AnimationBinding>(new_mesh).unwrap();
        let clip = player.clip("clip").unwrap();
        assert_eq!(clip.channels[0].target, ChannelTarget::Node(new_mesh));

        let instance = scene.get_component::<ScriptBinding>(new_attached).unwrap();
        assert_eq!(
            instance.var("skeleton"),
            Some(&ScriptValue::NodeRef(new_skeletal))
        );

        // The copied skeleton pose is a separate object with its own state
        let pose = scene.get_component::<SkeletonBinding>(new_skeletal).unwrap();
        assert_eq!(pose.bone_count(), 1);

        // The source is untouched
        assert_eq!(source.node_count(), 4);
        assert_eq!(
            source.get_component::<MeshRenderer>(mesh).unwrap().skeleton_node,
            skeletal
        );
    }

    #[test]
    fn test_merge_rejects_missing_parent() {
        let mut source = Scene::new("source");
        source.add_root("SrcRoot");

        let (mut scene, _root) = scene_with_root();
        let stale = scene.add_node("Gone", Handle::INVALID);
        scene.remove_node(stale, true);

        let before = scene.node_count();
        assert!(!scene.add_scene(&source, stale));
        assert_eq!(scene.node_count(), before);
    }

    #[test]
    fn test_config_reserves_pools() {
        let config = SceneConfig {
            max_frames_in_flight: 3,
            initial_node_capacity: 16,
            initial_pose_capacity: 8,
        };
        let scene = Scene::with_config("configured", config, SharedResources::default())
            .expect("valid config");

        assert_eq!(scene.config().max_frames_in_flight, 3);
        assert_eq!(scene.runtime().view::<SkeletonPose>().unwrap().capacity(), 8);
        assert_eq!(scene.node_count(), 0);
    }

    #[test]
    fn test_script_resource_ref_resolves_in_runtime_registry() {
        struct GameTag(&'static str);

        let (mut scene, root) = scene_with_root();
        let node = scene.add_node("Tagged", root);

        // Applications may park their own resources in the scene registry
        // and reference them from script variables
        let tag = scene.runtime_mut().add(GameTag("player"));
        scene
            .write_component::<ScriptBinding>(node)
            .unwrap()
            .set_var("tag", ScriptValue::ResourceRef(tag));

        let instance = scene.get_component::<ScriptBinding>(node).unwrap();
        let Some(ScriptValue::ResourceRef(stored)) = instance.var("tag") else {
            panic!("tag var should hold a resource ref");
        };
        let resolved = scene
            .runtime()
            .get_typed::<GameTag>(*stored)
            .expect("resource ref should resolve");
        assert_eq!(resolved.0, "player");
    }

    #[test]
    fn test_stale_node_handle_after_reuse() {
        let (mut scene, root) = scene_with_root();
        let old = scene.add_node("Old", root);
        scene.remove_node(old, true);

        let new = scene.add_node("New", root);
        assert_eq!(new.index, old.index);
        assert!(!scene.node_valid(old));
        assert!(scene.node(old).is_none());
        assert!(scene.node_valid(new));
    }
}
