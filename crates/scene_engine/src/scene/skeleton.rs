//! Runtime skeleton pose
//!
//! [`SkeletonRig`] is the bind data an external loader hands the scene
//! (bone hierarchy, bind and inverse-bind matrices). [`SkeletonPose`] is
//! the per-instance runtime object living in the scene's registry: local
//! and final pose buffers plus per-frame skinning slices destined for the
//! GPU. The pose owns its GPU buffer and releases it when dropped, which is
//! what ties the deferred-removal queue to the actual GPU free.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;
use crate::gpu::{GpuBufferId, GpuResourceKind, SharedResources};

/// One bone of a rig
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name from the source asset
    pub name: String,
    /// Parent bone index; `None` for a rig root
    ///
    /// Parents must precede children in the bone list (loader contract).
    pub parent: Option<u32>,
    /// Bind-pose transform relative to the parent bone
    pub local_bind: Mat4,
    /// Inverse of the bone's model-space bind transform
    pub inverse_bind: Mat4,
}

/// Bind data for a skeleton, supplied by the asset loader
#[derive(Debug, Clone, Default)]
pub struct SkeletonRig {
    /// Bones in parent-before-child order
    pub bones: Vec<Bone>,
}

impl SkeletonRig {
    /// Check the parent-before-child ordering contract
    pub fn is_ordered(&self) -> bool {
        self.bones
            .iter()
            .enumerate()
            .all(|(index, bone)| bone.parent.map_or(true, |parent| (parent as usize) < index))
    }
}

/// Skinning matrix laid out for GPU upload (column-major)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuPoseMatrix {
    /// Column-major 4x4 matrix
    pub columns: [[f32; 4]; 4],
}

impl From<Mat4> for GpuPoseMatrix {
    fn from(matrix: Mat4) -> Self {
        Self {
            columns: matrix.into(),
        }
    }
}

/// Per-instance runtime skeleton state
///
/// Created through the scene's skeleton component; empty until a rig is
/// assigned. `final_pose` is recomputed from `local_pose` by
/// [`update`](Self::update), which also writes the skinning matrices for
/// the frame slice selected by the caller's frame index.
#[derive(Debug)]
pub struct SkeletonPose {
    shared: SharedResources,
    rig: SkeletonRig,
    local_pose: Vec<Mat4>,
    final_pose: Vec<Mat4>,
    /// One skinning slice per frame in flight
    skin_data: Vec<Vec<GpuPoseMatrix>>,
    gpu_buffer: Option<GpuBufferId>,
}

impl SkeletonPose {
    /// Create an empty pose bound to the scene's shared resources
    pub fn new(shared: SharedResources) -> Self {
        Self {
            shared,
            rig: SkeletonRig::default(),
            local_pose: Vec::new(),
            final_pose: Vec::new(),
            skin_data: Vec::new(),
            gpu_buffer: None,
        }
    }

    /// Assign bind data and allocate the GPU pose buffer
    ///
    /// Rejects rigs that violate the parent-before-child ordering. Any
    /// previous rig and its GPU buffer are released first.
    pub fn set_rig(&mut self, rig: SkeletonRig) -> bool {
        if !rig.is_ordered() {
            log::warn!("Rejecting skeleton rig: bones are not parent-before-child ordered");
            return false;
        }

        self.release_buffer();

        let bone_count = rig.bones.len();
        self.local_pose = rig.bones.iter().map(|bone| bone.local_bind).collect();
        self.final_pose = vec![Mat4::identity(); bone_count];
        self.skin_data = vec![
            vec![GpuPoseMatrix::from(Mat4::identity()); bone_count];
            self.shared.max_frames_in_flight
        ];
        self.rig = rig;

        if bone_count > 0 {
            let size = (bone_count * self.shared.max_frames_in_flight
                * std::mem::size_of::<GpuPoseMatrix>()) as u64;
            self.gpu_buffer = Some(
                self.shared
                    .device
                    .allocate(GpuResourceKind::PoseBuffer, size),
            );
        }

        true
    }

    /// Copy another pose's rig and pose state, keeping own GPU resources
    ///
    /// Used by scene merging: the target pose allocates a fresh buffer
    /// instead of aliasing the source's.
    pub fn copy_from(&mut self, other: &SkeletonPose) {
        if !self.set_rig(other.rig.clone()) {
            return;
        }
        self.local_pose.clone_from(&other.local_pose);
        self.final_pose.clone_from(&other.final_pose);
        for (frame, slice) in self.skin_data.iter_mut().enumerate() {
            if let Some(other_slice) = other.skin_data.get(frame) {
                slice.clone_from(other_slice);
            }
        }
    }

    /// The assigned rig
    pub fn rig(&self) -> &SkeletonRig {
        &self.rig
    }

    /// Whether a non-empty rig is assigned
    pub fn has_rig(&self) -> bool {
        !self.rig.bones.is_empty()
    }

    /// Number of bones in the assigned rig
    pub fn bone_count(&self) -> u32 {
        self.rig.bones.len() as u32
    }

    /// Whether `index` addresses a bone of the rig
    pub fn bone_valid(&self, index: u32) -> bool {
        (index as usize) < self.local_pose.len()
    }

    /// Local pose matrix of one bone (identity when out of range)
    pub fn local_pose(&self, index: u32) -> Mat4 {
        self.local_pose
            .get(index as usize)
            .copied()
            .unwrap_or_else(Mat4::identity)
    }

    /// Overwrite one bone's local pose; out-of-range writes are ignored
    pub fn set_local_pose(&mut self, index: u32, pose: Mat4) {
        if let Some(slot) = self.local_pose.get_mut(index as usize) {
            *slot = pose;
        }
    }

    /// Final (model-space) pose of one bone (identity when out of range)
    pub fn final_pose(&self, index: u32) -> Mat4 {
        self.final_pose
            .get(index as usize)
            .copied()
            .unwrap_or_else(Mat4::identity)
    }

    /// Reset every bone's local pose back to the bind pose
    pub fn reset_pose(&mut self) {
        for (slot, bone) in self.local_pose.iter_mut().zip(&self.rig.bones) {
            *slot = bone.local_bind;
        }
    }

    /// Recompute final poses and the skinning slice for `frame_index`
    ///
    /// Bones are walked in list order; the ordering contract guarantees a
    /// parent's final pose is ready before any of its children read it.
    pub fn update(&mut self, frame_index: usize) {
        for index in 0..self.rig.bones.len() {
            let local = self.local_pose[index];
            self.final_pose[index] = match self.rig.bones[index].parent {
                Some(parent) => self.final_pose[parent as usize] * local,
                None => local,
            };
        }

        if let Some(slice) = self.skin_data.get_mut(frame_index) {
            for (index, bone) in self.rig.bones.iter().enumerate() {
                slice[index] = GpuPoseMatrix::from(self.final_pose[index] * bone.inverse_bind);
            }
        }
    }

    /// Skinning matrices for one frame slice, ready for upload
    pub fn skin_slice(&self, frame_index: usize) -> &[GpuPoseMatrix] {
        self.skin_data.get(frame_index).map_or(&[], Vec::as_slice)
    }

    /// Byte offset of `frame_index`'s slice inside the pose buffer
    pub fn dynamic_offset(&self, frame_index: usize) -> u64 {
        (std::mem::size_of::<GpuPoseMatrix>() * self.rig.bones.len() * frame_index) as u64
    }

    /// The backing GPU buffer, if a rig is assigned
    pub fn gpu_buffer(&self) -> Option<GpuBufferId> {
        self.gpu_buffer
    }

    fn release_buffer(&mut self) {
        if let Some(id) = self.gpu_buffer.take() {
            self.shared.device.destroy(id);
        }
    }
}

impl Drop for SkeletonPose {
    fn drop(&mut self) {
        self.release_buffer();
    }
}
