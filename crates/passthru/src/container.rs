//! Native side of the handle container.
//!
//! A managed `PassThruContainer` owns one reference to an arbitrary object, its
//! `wrapped` attribute. Its native counterpart keeps a claim on the container and
//! a raw view of the wrapped object. Equality and hashing look only at the
//! wrapped object's identity, so managed and native code agree on both.
//!
//! Containers only compare with containers:
//!
//! ```compile_fail
//! use passthru::PassThruContainer;
//!
//! fn compare(c: &PassThruContainer) -> bool {
//!     *c == 1_i64
//! }
//! ```

use std::{
    borrow::Cow,
    hash::{Hash, Hasher},
};

use crate::{
    defer_drop,
    exception::{MarshalError, MarshalResult},
    heap::HeapData,
    identity::{IdentityEq, IdentityHash},
    marshal::{FromManaged, IntoManaged, MarshalContext, NativeType},
    opaque::{OpaqueRef, RawObject},
    py_hash::hash_pointer,
    resource::ResourceTracker,
    tracer::MarshalTracer,
    value::Value,
};

/// Native handle container: `{ container, wrapped_obj }`.
#[derive(Debug, Clone)]
pub struct PassThruContainer {
    container: OpaqueRef,
    wrapped_obj: RawObject,
}

impl PassThruContainer {
    /// Claim on the managed container object.
    #[must_use]
    pub fn container(&self) -> &OpaqueRef {
        &self.container
    }

    /// Raw view of the object the container wraps; the container's claim keeps it alive.
    #[must_use]
    pub fn wrapped_obj(&self) -> RawObject {
        self.wrapped_obj
    }

    /// Pointer hash of the wrapped object, identical to the managed `hash()`.
    #[must_use]
    pub fn hash(&self) -> i64 {
        hash_pointer(self.wrapped_obj.as_int())
    }
}

impl PartialEq for PassThruContainer {
    fn eq(&self, other: &Self) -> bool {
        self.wrapped_obj.is(other.wrapped_obj)
    }
}

impl Eq for PassThruContainer {}

impl Hash for PassThruContainer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i64(Self::hash(self));
    }
}

impl IdentityEq for PassThruContainer {
    fn identity_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl IdentityHash for PassThruContainer {
    fn identity_hash(&self) -> i64 {
        Self::hash(self)
    }
}

impl NativeType for PassThruContainer {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed("PassThruContainerType")
    }
}

impl FromManaged for PassThruContainer {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        if !matches!(value.heap_data(cx.heap), Some(HeapData::Container(_))) {
            return Err(MarshalError::type_mismatch(
                "unbox",
                "PassThruContainer",
                &cx.type_name(value),
            ));
        }
        let container = OpaqueRef::acquire(value, cx)?;

        // the read hands back a new reference; only its address is kept
        let wrapped = value.py_getattr("wrapped", cx.heap)?;
        let heap = &mut *cx.heap;
        defer_drop!(wrapped, heap);
        let wrapped_obj = RawObject::new(wrapped.public_id(heap));

        Ok(Self { container, wrapped_obj })
    }
}

impl IntoManaged for PassThruContainer {
    /// Returns the original managed container.
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value> {
        self.container.into_managed(cx)
    }
}
