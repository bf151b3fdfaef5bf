//! Conversions across the managed/native boundary.
//!
//! Entry marshal ([`FromManaged`]) turns a borrowed managed value into a native
//! value, taking whatever claims the native value needs. Exit marshal
//! ([`IntoManaged`]) consumes a native value and produces an owned managed
//! value, relinquishing the native claims as part of the conversion.
//!
//! Both sides run against a [`MarshalContext`], which borrows the managed heap,
//! the native runtime bookkeeping and the tracer for the duration of one call.

use std::borrow::Cow;

use crate::{
    exception::{MarshalError, MarshalResult},
    heap::{Heap, HeapData},
    nrt::NativeRuntime,
    resource::ResourceTracker,
    tracer::MarshalTracer,
    types::Tuple,
    value::Value,
};

/// Name of a native type, as shown in marshaling errors and traces.
pub trait NativeType {
    fn native_type() -> Cow<'static, str>;
}

/// Entry marshal: build a native value from a borrowed managed value.
///
/// On failure every claim taken so far must already be released (dropping the
/// partially built native values is enough).
pub trait FromManaged: NativeType + Sized {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self>;
}

/// Exit marshal: consume a native value and produce an owned managed value.
pub trait IntoManaged: NativeType {
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value>;
}

/// A native argument list, entry-marshaled from a slice of managed arguments.
///
/// Implemented for tuples of up to four [`FromManaged`] values.
pub trait FromArgs: NativeType + Sized {
    const ARITY: usize;

    fn from_args<T: ResourceTracker, Tr: MarshalTracer>(
        args: &[&Value],
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self>;
}

/// Borrowed state for one marshaling pass.
#[derive(Debug)]
pub struct MarshalContext<'a, T: ResourceTracker, Tr: MarshalTracer> {
    pub(crate) heap: &'a mut Heap<T>,
    pub(crate) nrt: &'a NativeRuntime,
    pub(crate) tracer: &'a mut Tr,
}

impl<'a, T: ResourceTracker, Tr: MarshalTracer> MarshalContext<'a, T, Tr> {
    pub(crate) fn new(heap: &'a mut Heap<T>, nrt: &'a NativeRuntime, tracer: &'a mut Tr) -> Self {
        Self { heap, nrt, tracer }
    }

    /// Entry-marshals `value` as `F`, tracing the conversion.
    pub fn unbox<F: FromManaged>(&mut self, value: &Value) -> MarshalResult<F> {
        self.tracer.on_unbox(&F::native_type());
        F::from_managed(value, self)
    }

    /// Exit-marshals `native`, tracing the conversion once it succeeded.
    pub fn box_value<R: IntoManaged>(&mut self, native: R) -> MarshalResult<Value> {
        let native_type = R::native_type();
        let value = native.into_managed(self)?;
        self.tracer.on_box(&native_type);
        Ok(value)
    }

    /// Managed type name of `value`, for error messages.
    #[must_use]
    pub fn type_name(&self, value: &Value) -> String {
        value.type_name(self.heap).to_owned()
    }

    /// Reads an attribute of a managed object. The result is owned by the caller
    /// and must be handed back through [`release`](Self::release).
    pub fn getattr(&mut self, obj: &Value, name: &str) -> MarshalResult<Value> {
        obj.py_getattr(name, self.heap)
    }

    /// Releases a managed value obtained during marshaling.
    pub fn release(&mut self, value: Value) {
        value.drop_with_heap(self.heap);
    }

    /// Hands every claim discarded by native code back to the managed heap.
    pub fn collect_releases(&mut self) {
        while self.nrt.has_pending() {
            let pending = self.nrt.take_pending();
            for release in &pending {
                self.tracer.on_release(release.ptr);
            }
            self.heap.release_all(pending.into_iter().map(|release| release.value));
        }
    }

    /// Records a failed entry marshal and releases whatever it had claimed.
    pub(crate) fn rollback(&mut self, native_type: &Cow<'static, str>, err: &MarshalError) {
        self.tracer.on_rollback(native_type, &err.to_string());
        self.collect_releases();
    }

    /// Allocates a managed object owned by the caller.
    pub(crate) fn allocate(&mut self, data: HeapData) -> MarshalResult<Value> {
        Ok(Value::Ref(self.heap.allocate(data)?))
    }

    /// Exit-marshals a sequence of native values into owned managed values.
    ///
    /// If one element fails, the values produced so far are released.
    pub(crate) fn box_all<R: IntoManaged>(&mut self, natives: impl IntoIterator<Item = R>) -> MarshalResult<Vec<Value>> {
        let natives = natives.into_iter();
        let mut out = Vec::with_capacity(natives.size_hint().0);
        for native in natives {
            match self.box_value(native) {
                Ok(value) => out.push(value),
                Err(err) => {
                    self.heap.release_all(out);
                    return Err(err);
                }
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Scalars
// ============================================================================

impl NativeType for i64 {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed("int64")
    }
}

impl FromManaged for i64 {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            other => Err(MarshalError::type_mismatch(
                "unbox",
                &Self::native_type(),
                &cx.type_name(other),
            )),
        }
    }
}

impl IntoManaged for i64 {
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        _cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value> {
        Ok(Value::Int(self))
    }
}

impl NativeType for bool {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed("bool")
    }
}

impl FromManaged for bool {
    fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(MarshalError::type_mismatch(
                "unbox",
                &Self::native_type(),
                &cx.type_name(other),
            )),
        }
    }
}

impl IntoManaged for bool {
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        _cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value> {
        Ok(Value::Bool(self))
    }
}

impl NativeType for () {
    fn native_type() -> Cow<'static, str> {
        Cow::Borrowed("none")
    }
}

impl IntoManaged for () {
    fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
        self,
        _cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Value> {
        Ok(Value::None)
    }
}

impl FromArgs for () {
    const ARITY: usize = 0;

    fn from_args<T: ResourceTracker, Tr: MarshalTracer>(
        args: &[&Value],
        _cx: &mut MarshalContext<'_, T, Tr>,
    ) -> MarshalResult<Self> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(MarshalError::arg_count(0, args.len()))
        }
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_tuple {
    ($arity:literal; $($ty:ident $var:ident $idx:tt),+) => {
        impl<$($ty: NativeType),+> NativeType for ($($ty,)+) {
            fn native_type() -> Cow<'static, str> {
                let names = [$($ty::native_type()),+];
                Cow::Owned(format!("Tuple({})", names.join(", ")))
            }
        }

        impl<$($ty: IntoManaged),+> IntoManaged for ($($ty,)+) {
            fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
                self,
                cx: &mut MarshalContext<'_, T, Tr>,
            ) -> MarshalResult<Value> {
                let ($($var,)+) = self;
                let mut items = Vec::with_capacity($arity);
                $(
                    match cx.box_value($var) {
                        Ok(value) => items.push(value),
                        Err(err) => {
                            cx.heap.release_all(items);
                            return Err(err);
                        }
                    }
                )+
                cx.allocate(HeapData::Tuple(Tuple::new(items)))
            }
        }

        impl<$($ty: FromManaged),+> FromArgs for ($($ty,)+) {
            const ARITY: usize = $arity;

            fn from_args<T: ResourceTracker, Tr: MarshalTracer>(
                args: &[&Value],
                cx: &mut MarshalContext<'_, T, Tr>,
            ) -> MarshalResult<Self> {
                if args.len() != $arity {
                    return Err(MarshalError::arg_count($arity, args.len()));
                }
                // left to right; a failure drops the arguments already marshaled
                Ok(($(cx.unbox::<$ty>(args[$idx])?,)+))
            }
        }
    };
}

impl_tuple!(1; A a 0);
impl_tuple!(2; A a 0, B b 1);
impl_tuple!(3; A a 0, B b 1, C c 2);
impl_tuple!(4; A a 0, B b 1, C c 2, D d 3);
