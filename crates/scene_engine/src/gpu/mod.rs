//! GPU resource lifecycle boundary
//!
//! The scene core never constructs graphics-API objects itself. Whenever a
//! runtime component needs GPU backing it goes through the [`GpuDevice`]
//! capability supplied by the rendering layer: `allocate` returns an opaque
//! id, `destroy` releases it. The core attaches no other meaning to either.
//!
//! Frame indexing follows the usual frames-in-flight scheme: the caller
//! passes the current frame index (`0..max_frames_in_flight`) on each
//! update, and it selects which per-frame data slice gets written.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of frames in flight assumed when no configuration is supplied
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Opaque handle to a GPU resource owned by the rendering backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBufferId(pub u64);

/// What a GPU allocation will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuResourceKind {
    /// Per-frame skeleton skinning matrices
    PoseBuffer,
}

/// Abstract GPU resource lifecycle supplied by the rendering layer
///
/// Implementations are expected to be cheap to call; the core invokes
/// `allocate` when a GPU-backed runtime component is created and `destroy`
/// when it is finally freed (possibly deferred, see the pool-level removal
/// queues).
pub trait GpuDevice {
    /// Allocate a resource of `size` bytes and return its opaque id
    fn allocate(&self, kind: GpuResourceKind, size: u64) -> GpuBufferId;

    /// Release a previously allocated resource
    fn destroy(&self, id: GpuBufferId);
}

/// Device stub that hands out ids without touching any GPU
///
/// The default device for headless use and tests.
#[derive(Debug, Default)]
pub struct NullGpuDevice {
    next_id: AtomicU64,
}

impl NullGpuDevice {
    /// Create a new null device
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpuDevice for NullGpuDevice {
    fn allocate(&self, _kind: GpuResourceKind, _size: u64) -> GpuBufferId {
        GpuBufferId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn destroy(&self, _id: GpuBufferId) {}
}

/// Device double that counts allocations and destructions
///
/// Lets tests observe exactly when a deferred free actually happens.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: AtomicU64,
    allocated: AtomicU64,
    destroyed: AtomicU64,
}

impl RecordingDevice {
    /// Create a new recording device
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `allocate` calls so far
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total number of `destroy` calls so far
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Allocations not yet destroyed
    pub fn live(&self) -> u64 {
        self.allocated() - self.destroyed()
    }
}

impl GpuDevice for RecordingDevice {
    fn allocate(&self, _kind: GpuResourceKind, _size: u64) -> GpuBufferId {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        GpuBufferId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn destroy(&self, _id: GpuBufferId) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared collaborators a scene needs to create runtime components
///
/// Handed to the scene at construction and cloned into GPU-backed runtime
/// objects so their `Drop` can release the matching resource.
#[derive(Clone)]
pub struct SharedResources {
    /// GPU resource lifecycle supplied by the rendering layer
    pub device: Arc<dyn GpuDevice>,
    /// Frames-in-flight count; sizes per-frame data slices
    pub max_frames_in_flight: usize,
}

impl SharedResources {
    /// Bundle a device with a frames-in-flight count
    pub fn new(device: Arc<dyn GpuDevice>, max_frames_in_flight: usize) -> Self {
        Self {
            device,
            max_frames_in_flight,
        }
    }
}

impl Default for SharedResources {
    fn default() -> Self {
        Self {
            device: Arc::new(NullGpuDevice::new()),
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
        }
    }
}

impl std::fmt::Debug for SharedResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResources")
            .field("max_frames_in_flight", &self.max_frames_in_flight)
            .finish_non_exhaustive()
    }
}
