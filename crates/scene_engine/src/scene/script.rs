//! Runtime script state
//!
//! Script *logic* lives outside the core: a [`NodeScript`] implementation
//! supplied by the application. The core owns the per-node
//! [`ScriptInstance`] (the behavior box plus named variables) and calls the
//! hook once per frame per node, before that node's transform is resolved
//! for the frame.

use std::collections::HashMap;

use crate::foundation::math::Vec3;
use crate::pool::{Handle, TypeHandle};
use crate::scene::scene::Scene;

/// Per-frame hook implemented by the application
///
/// Called with the owning scene, the handle of the node the script is
/// attached to and the frame delta time. The hook runs before the node's
/// transform is resolved, so writes to the local transform take effect in
/// the same frame.
pub trait NodeScript {
    /// Run one frame of script logic
    fn update(&mut self, scene: &mut Scene, node: Handle, delta_time: f32);

    /// Clone hook used when a scene is merged into another
    ///
    /// Scripts that don't implement it are copied without behavior; their
    /// variables still transfer.
    fn clone_boxed(&self) -> Option<Box<dyn NodeScript>> {
        None
    }
}

/// A script variable value
///
/// `NodeRef` and `ResourceRef` are the type-erased references scripts use
/// to point at "some node" or "some resource" generically; node references
/// are remapped when scenes merge.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Scalar value
    Float(f32),
    /// Vector value
    Vec3(Vec3),
    /// Text value
    Str(String),
    /// Reference to a scene node
    NodeRef(Handle),
    /// Type-tagged reference to a registry resource
    ResourceRef(TypeHandle),
}

/// Per-node runtime script state
#[derive(Default)]
pub struct ScriptInstance {
    behavior: Option<Box<dyn NodeScript>>,
    vars: HashMap<String, ScriptValue>,
}

impl ScriptInstance {
    /// Create an instance with no behavior and no variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a behavior, replacing any previous one
    pub fn set_behavior(&mut self, behavior: Box<dyn NodeScript>) {
        self.behavior = Some(behavior);
    }

    /// Detach the behavior, keeping the variables
    pub fn clear_behavior(&mut self) {
        self.behavior = None;
    }

    /// Whether a behavior is attached
    pub fn has_behavior(&self) -> bool {
        self.behavior.is_some()
    }

    /// Read a variable by name
    pub fn var(&self, key: &str) -> Option<&ScriptValue> {
        self.vars.get(key)
    }

    /// Mutable access to a variable by name
    pub fn var_mut(&mut self, key: &str) -> Option<&mut ScriptValue> {
        self.vars.get_mut(key)
    }

    /// Set a variable, replacing any previous value
    pub fn set_var(&mut self, key: impl Into<String>, value: ScriptValue) {
        self.vars.insert(key.into(), value);
    }

    /// Iterate all variables
    pub fn vars(&self) -> impl Iterator<Item = (&str, &ScriptValue)> {
        self.vars.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Take the behavior out for the duration of the hook call
    ///
    /// The scene does this so the hook can receive `&mut Scene` without
    /// aliasing the instance it came from.
    pub(crate) fn take_behavior(&mut self) -> Option<Box<dyn NodeScript>> {
        self.behavior.take()
    }

    /// Put a taken behavior back after the hook call
    pub(crate) fn restore_behavior(&mut self, behavior: Box<dyn NodeScript>) {
        self.behavior = Some(behavior);
    }

    /// Copy this instance for a scene merge
    ///
    /// Node references are rewritten through `map` (unmapped ones are
    /// invalidated, never left pointing into the source scene). Resource
    /// references are invalidated wholesale: they point into the source
    /// scene's private registry, which is not copied. Behavior transfers
    /// only if the script implements [`NodeScript::clone_boxed`].
    pub(crate) fn clone_for_merge(&self, map: &HashMap<u32, Handle>) -> ScriptInstance {
        let vars = self
            .vars
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    ScriptValue::NodeRef(handle) => {
                        let mapped = if handle.is_valid() {
                            map.get(&handle.index).copied().unwrap_or(Handle::INVALID)
                        } else {
                            Handle::INVALID
                        };
                        ScriptValue::NodeRef(mapped)
                    }
                    ScriptValue::ResourceRef(_) => ScriptValue::ResourceRef(TypeHandle::INVALID),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();

        ScriptInstance {
            behavior: self.behavior.as_ref().and_then(|b| b.clone_boxed()),
            vars,
        }
    }
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("has_behavior", &self.behavior.is_some())
            .field("vars", &self.vars)
            .finish()
    }
}
