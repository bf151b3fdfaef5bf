//! Opaque references: native handles to managed objects.
//!
//! An [`OpaqueRef`] is the only way native code holds on to a managed object.
//! Taking one claims the referent (one managed reference plus one claim
//! bookkeeping record), copying it shares that claim, and dropping the last copy
//! releases it. The referent itself is never inspected; only its pointer is
//! compared, hashed or converted to an integer.
//!
//! The type parameter is a *kind*: a compile-time tag describing which managed
//! objects the handle may refer to. Handles of different kinds are different
//! types, so mixing them in `==` does not compile.
//!
//! ```compile_fail
//! use passthru::{AnyObject, OpaqueRef, passthru_kind};
//!
//! passthru_kind!(pub MyPassThruType => "MyPassThru");
//!
//! fn mixed(a: &OpaqueRef<AnyObject>, b: &OpaqueRef<MyPassThruType>) -> bool {
//!     a == b
//! }
//! ```

use std::{
    any::TypeId,
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    rc::Rc,
};

use crate::{
    exception::{MarshalError, MarshalResult},
    identity::{IdentityEq, IdentityHash},
    marshal::{FromManaged, IntoManaged, MarshalContext, NativeType},
    nrt::MemInfo,
    py_hash::hash_pointer,
    resource::ResourceTracker,
    tracer::MarshalTracer,
    value::Value,
};

/// A compile-time tag for a family of opaque references.
///
/// Declare new kinds with [`passthru_kind!`](crate::passthru_kind).
pub trait PassThruKind: 'static {
    /// Native type name, e.g. `PassThruType`.
    const NAME: &'static str;

    /// Managed class the entry marshal accepts. `None` accepts any managed value.
    const CLASS: Option<&'static str> = None;
}

/// The default kind: refers to any managed object.
#[derive(Debug, Clone, Copy)]
pub struct AnyObject;

impl PassThruKind for AnyObject {
    const NAME: &'static str = "PassThruType";
}

/// Declares a new opaque reference kind restricted to one managed class.
///
/// ```
/// use passthru::{OpaqueRef, PassThruKind, passthru_kind};
///
/// passthru_kind!(
///     /// Handles to `MyPassThru` instances.
///     pub MyPassThruType => "MyPassThru"
/// );
///
/// assert_eq!(MyPassThruType::NAME, "MyPassThruType");
/// assert_eq!(MyPassThruType::CLASS, Some("MyPassThru"));
/// ```
#[macro_export]
macro_rules! passthru_kind {
    ($(#[$meta:meta])* $vis:vis $name:ident => $class:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::PassThruKind for $name {
            const NAME: &'static str = stringify!($name);
            const CLASS: Option<&'static str> = Some($class);
        }
    };
}

/// An owned claim on a managed object.
///
/// `Clone` copies the handle: the new handle shares the claim bookkeeping and
/// refers to the same object. Dropping a handle releases it.
pub struct OpaqueRef<K: PassThruKind = AnyObject> {
    meminfo: Rc<MemInfo>,
    _kind: PhantomData<K>,
}

impl<K: PassThruKind> OpaqueRef<K> {
    /// Claims `value` for native code.
    ///
    /// Refuses values of the wrong class for restricted kinds, and fails with
    /// `MemoryError` if the tracker refuses the claim bookkeeping.
    pub(crate) fn acquire<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        if let Some(class) = K::CLASS {
            let found = value.type_name(cx.heap);
            if found != class {
                return Err(MarshalError::type_mismatch("unbox", class, found));
            }
        }
        let live = cx.nrt.live_claims();
        cx.heap.tracker_mut().on_claim(live)?;

        let ptr = value.public_id(cx.heap);
        let owned = value.clone_with_heap(cx.heap);
        let meminfo = cx.nrt.new_meminfo(owned, ptr);
        cx.tracer.on_acquire(K::NAME, ptr);
        Ok(Self {
            meminfo,
            _kind: PhantomData,
        })
    }

    /// Another handle to the same object, sharing this handle's claim.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Discards this handle; the claim is released with the last copy.
    pub fn release(self) {
        drop(self);
    }

    /// The referent's address; stable for as long as any claim is held.
    #[must_use]
    pub fn as_pointer(&self) -> usize {
        self.meminfo.ptr()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn identical(&self, other: &Self) -> bool {
        self.as_pointer() == other.as_pointer()
    }

    /// Identity test across kinds: handles of different kinds are never the same object.
    #[must_use]
    pub fn is<K2: PassThruKind>(&self, other: &OpaqueRef<K2>) -> bool {
        TypeId::of::<K>() == TypeId::of::<K2>() && self.as_pointer() == other.as_pointer()
    }

    /// A non-owning view of the referent. Valid only while a claim is held.
    #[must_use]
    pub fn raw(&self) -> RawObject {
        RawObject::new(self.as_pointer())
    }

    /// Pointer hash of the referent.
    #[must_use]
    pub fn hash(&self) -> i64 {
        hash_pointer(self.as_pointer())
    }

    pub(crate) fn managed(&self) -> &Value {
        self.meminfo.value()
    }
}

impl<K: PassThruKind> Clone for OpaqueRef<K> {
    fn clone(&self) -> Self {
        Self {
            meminfo: Rc::clone(&self.meminfo),
            _kind: PhantomData,
        }
    }
}

impl<K: PassThruKind> fmt::Debug for OpaqueRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", K::NAME, self.as_pointer())
    }
}

impl<K: PassThruKind> PartialEq for OpaqueRef<K> {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl<K: PassThruKind> Eq for OpaqueRef<K> {}

impl<K: PassThruKind> Hash for OpaqueRef<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.as_pointer());
    }
}

impl<K: PassThruKind> IdentityEq for OpaqueRef<K> {
    fn identity_eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl<K: PassThruKind> IdentityHash for OpaqueRef<K> {
    fn identity_hash(&self) -> i64 {
        self.hash()
    }
}

impl<K: PassThruKind> NativeType for OpaqueRef<K> {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed(K::NAME)
    }
}

impl<K: PassThruKind> FromManaged for OpaqueRef<K> {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        Self::acquire(value, cx)
    }
}

impl<K: PassThruKind> IntoManaged for OpaqueRef<K> {
    /// Returns the original object and releases this handle's claim.
    ///
    /// A handle claimed by another runtime is refused: its referent does not live
    /// in this heap. Its claim stays queued on the runtime that owns it.
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value> {
        if !cx.nrt.owns(&self.meminfo) {
            return Err(MarshalError::foreign_claim("box", K::NAME));
        }
        let obj = self.managed().clone_with_heap(cx.heap);
        drop(self);
        cx.collect_releases();
        Ok(obj)
    }
}

/// A borrowed, non-owning view of a managed object: just its address.
///
/// Holding a `RawObject` keeps nothing alive. It is what a handle container
/// records about the object it ferries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawObject {
    ptr: usize,
}

impl RawObject {
    pub(crate) fn new(ptr: usize) -> Self {
        Self { ptr }
    }

    /// The address as a native integer.
    #[must_use]
    pub fn as_int(self) -> usize {
        self.ptr
    }

    #[must_use]
    pub fn is(self, other: Self) -> bool {
        self.ptr == other.ptr
    }
}

impl NativeType for RawObject {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed("Opaque(PyObject)")
    }
}

impl FromManaged for RawObject {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        Ok(Self::new(value.public_id(cx.heap)))
    }
}
