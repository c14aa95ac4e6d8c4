//! Generational handles
//!
//! A [`Handle`] identifies a slot in a [`SlotPool`](super::SlotPool) by
//! `(index, generation)`. The generation is bumped every time a slot is
//! vacated, so a handle issued before a removal can never resolve again,
//! even after the index is reused for a new value.

use std::any::TypeId;

/// Opaque `(index, generation)` pair identifying a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Index in the pool's slot storage
    pub index: u32,
    /// Generation counter guarding against stale access
    pub generation: u32,
}

impl Handle {
    /// Sentinel value denoting "no handle"; never returned by a live allocation
    pub const INVALID: Handle = Handle {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Create a handle from raw parts
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Check whether this handle is the invalid sentinel
    ///
    /// A `true` result does not imply the handle still resolves; only the
    /// owning pool can decide that (see `SlotPool::is_valid`).
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }

    /// Reset this handle to the invalid sentinel
    pub fn invalidate(&mut self) {
        *self = Self::INVALID;
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// A [`Handle`] tagged with the type it points at
///
/// Used wherever a reference must stay generic over heterogeneous pools,
/// e.g. script variables holding "some node or resource". A `TypeHandle`
/// only ever resolves against the pool of its own tag; a mismatched lookup
/// fails closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    /// The underlying pool handle
    pub handle: Handle,
    /// Type tag, `None` for the untyped invalid sentinel
    pub type_id: Option<TypeId>,
}

impl TypeHandle {
    /// The invalid sentinel: no handle, no type tag
    pub const INVALID: TypeHandle = TypeHandle {
        handle: Handle::INVALID,
        type_id: None,
    };

    /// Tag a handle with type `T`
    pub fn of<T: 'static>(handle: Handle) -> Self {
        Self {
            handle,
            type_id: Some(TypeId::of::<T>()),
        }
    }

    /// Valid iff the handle is valid and a type tag is present
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid() && self.type_id.is_some()
    }

    /// Check whether this handle is tagged with type `T`
    pub fn is_type<T: 'static>(&self) -> bool {
        self.type_id == Some(TypeId::of::<T>())
    }
}

impl Default for TypeHandle {
    fn default() -> Self {
        Self::INVALID
    }
}
