//! Generational handle pools
//!
//! Provides the object-lifetime layer of the engine: opaque generational
//! handles, a free-list slot pool with stable indices, and a type-erased
//! registry that owns one pool per value type.

pub mod handle;
pub mod registry;
pub mod slot_pool;

pub use handle::{Handle, TypeHandle};
pub use registry::Registry;
pub use slot_pool::SlotPool;
