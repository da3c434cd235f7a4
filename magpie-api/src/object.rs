//! Opaque shared-object references.
//!
//! The runtime never inspects the payloads it carries: task state, task
//! outcome objects and timed-event payloads are all opaque, reference-counted
//! handles. Components take their own strong reference on hand-off and
//! release it on completion; the last release destroys the payload.

use std::any::Any;
use std::sync::Arc;

/// Reference-counted handle to an opaque payload object.
///
/// Cloning retains, dropping releases. Consumers that know the concrete
/// type recover it with [`downcast_object`].
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// Wraps a value into an [`ObjectRef`].
pub fn object_ref<T: Any + Send + Sync>(value: T) -> ObjectRef {
    Arc::new(value)
}

/// Borrows the payload as a concrete type, if it is one.
pub fn downcast_object<T: Any + Send + Sync>(object: &ObjectRef) -> Option<&T> {
    object.downcast_ref::<T>()
}
