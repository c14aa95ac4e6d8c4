//! Type-erased multi-pool registry
//!
//! A [`Registry`] owns one [`SlotPool`] per distinct value type behind a
//! single type-tagged API. Pools are created lazily on first use; looking
//! up a [`TypeHandle`] against the wrong pool fails closed instead of
//! reinterpreting another type's bytes (the downcast simply misses).

use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::handle::{Handle, TypeHandle};
use super::slot_pool::SlotPool;

/// Object-safe view of a `SlotPool<T>` with the element type erased
trait ErasedPool {
    fn remove_erased(&mut self, handle: Handle) -> bool;
    fn queue_remove_erased(&mut self, handle: Handle) -> bool;
    fn flush_removals_erased(&mut self) -> u32;
    fn has_pending_removals_erased(&self) -> bool;
    fn count_erased(&self) -> u32;
    fn get_value_erased(&self, handle: Handle) -> Option<&dyn Any>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedPool for SlotPool<T> {
    fn remove_erased(&mut self, handle: Handle) -> bool {
        self.remove(handle)
    }

    fn queue_remove_erased(&mut self, handle: Handle) -> bool {
        self.queue_remove(handle)
    }

    fn flush_removals_erased(&mut self) -> u32 {
        self.flush_removals()
    }

    fn has_pending_removals_erased(&self) -> bool {
        self.has_pending_removals()
    }

    fn count_erased(&self) -> u32 {
        self.count()
    }

    fn get_value_erased(&self, handle: Handle) -> Option<&dyn Any> {
        self.get(handle).map(|value| value as &dyn Any)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type tag → slot pool map with a uniform add/get/remove API
///
/// Each concrete pool stays internally type-safe; the registry only erases
/// the element type at its own boundary. Deferred removal is available both
/// per type and globally, mirroring the pool-level queue.
#[derive(Default)]
pub struct Registry {
    pools: HashMap<TypeId, Box<dyn ErasedPool>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the pool for its type, creating the pool on
    /// first use
    pub fn add<T: 'static>(&mut self, value: T) -> TypeHandle {
        let handle = self.view_mut::<T>().insert(value);
        TypeHandle::of::<T>(handle)
    }

    /// Get a reference to a value by plain handle
    pub fn get<T: 'static>(&self, handle: Handle) -> Option<&T> {
        self.view::<T>()?.get(handle)
    }

    /// Get a mutable reference to a value by plain handle
    pub fn get_mut<T: 'static>(&mut self, handle: Handle) -> Option<&mut T> {
        self.pool_mut::<T>()?.get_mut(handle)
    }

    /// Get a typed reference through a [`TypeHandle`]
    ///
    /// Fails closed (`None`) when the tag does not match `T`.
    pub fn get_typed<T: 'static>(&self, th: TypeHandle) -> Option<&T> {
        if !th.is_type::<T>() {
            return None;
        }
        self.get::<T>(th.handle)
    }

    /// Get an untyped reference through a [`TypeHandle`]
    ///
    /// The caller can downcast the returned `&dyn Any`; a wrong guess fails
    /// closed just like a mismatched [`get_typed`](Self::get_typed).
    pub fn get_erased(&self, th: TypeHandle) -> Option<&dyn Any> {
        let pool = self.pools.get(&th.type_id?)?;
        pool.get_value_erased(th.handle)
    }

    /// Check whether `handle` resolves in the pool for `T`
    pub fn has<T: 'static>(&self, handle: Handle) -> bool {
        self.view::<T>().is_some_and(|pool| pool.is_valid(handle))
    }

    /// Check whether a [`TypeHandle`] resolves in its own pool
    pub fn contains(&self, th: TypeHandle) -> bool {
        self.get_erased(th).is_some()
    }

    /// Remove a value immediately
    pub fn remove<T: 'static>(&mut self, handle: Handle) -> bool {
        self.pool_mut::<T>().is_some_and(|pool| pool.remove(handle))
    }

    /// Remove a value immediately through a [`TypeHandle`]
    pub fn remove_erased(&mut self, th: TypeHandle) -> bool {
        let Some(type_id) = th.type_id else {
            return false;
        };
        match self.pools.get_mut(&type_id) {
            Some(pool) => pool.remove_erased(th.handle),
            None => false,
        }
    }

    /// Queue a value for deferred removal
    pub fn queue_remove<T: 'static>(&mut self, handle: Handle) -> bool {
        self.pool_mut::<T>()
            .is_some_and(|pool| pool.queue_remove(handle))
    }

    /// Queue a value for deferred removal through a [`TypeHandle`]
    pub fn queue_remove_erased(&mut self, th: TypeHandle) -> bool {
        let Some(type_id) = th.type_id else {
            return false;
        };
        match self.pools.get_mut(&type_id) {
            Some(pool) => pool.queue_remove_erased(th.handle),
            None => false,
        }
    }

    /// Whether the pool for `T` has queued removals
    pub fn has_pending_removals<T: 'static>(&self) -> bool {
        self.view::<T>()
            .is_some_and(SlotPool::has_pending_removals)
    }

    /// Whether any pool has queued removals
    pub fn has_any_pending_removals(&self) -> bool {
        self.pools
            .values()
            .any(|pool| pool.has_pending_removals_erased())
    }

    /// Free every queued removal in the pool for `T`
    pub fn flush_removals<T: 'static>(&mut self) -> u32 {
        self.pool_mut::<T>()
            .map_or(0, SlotPool::flush_removals)
    }

    /// Free every queued removal in every pool
    pub fn flush_all_removals(&mut self) -> u32 {
        self.pools
            .values_mut()
            .map(|pool| pool.flush_removals_erased())
            .sum()
    }

    /// Number of live values of type `T`
    pub fn count<T: 'static>(&self) -> u32 {
        self.view::<T>().map_or(0, SlotPool::count)
    }

    /// Total number of live values across all pools
    pub fn total_count(&self) -> u32 {
        self.pools.values().map(|pool| pool.count_erased()).sum()
    }

    /// Read access to the pool for `T`, if it has been created
    pub fn view<T: 'static>(&self) -> Option<&SlotPool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any().downcast_ref::<SlotPool<T>>())
    }

    /// Mutable access to the pool for `T`, creating it on first use
    pub fn view_mut<T: 'static>(&mut self) -> &mut SlotPool<T> {
        let pool = self
            .pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SlotPool::<T>::new()));
        pool.as_any_mut()
            .downcast_mut::<SlotPool<T>>()
            .expect("registry pool registered under a foreign TypeId")
    }

    fn pool_mut<T: 'static>(&mut self) -> Option<&mut SlotPool<T>> {
        self.pools
            .get_mut(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any_mut().downcast_mut::<SlotPool<T>>())
    }
}
