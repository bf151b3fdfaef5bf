//! Composite records: native structs assembled from a managed object's fields.
//!
//! A composite holds a claim on its managed *parent* plus the native values of
//! a fixed list of fields, read in declared order. If any field fails to
//! marshal, the fields read so far and the parent claim are dropped before the
//! error surfaces, so a failed entry marshal leaves no claim behind.
//!
//! The exit marshal returns the original parent object: it takes an extra
//! claim on the parent, boxes that claim (which relinquishes it), and finally
//! releases the record with all of its fields.

use std::{
    borrow::Cow,
    hash::{Hash, Hasher},
};

use crate::{
    exception::{MarshalError, MarshalResult},
    heap::HeapData,
    identity::{IdentityEq, IdentityHash},
    marshal::{FromManaged, IntoManaged, MarshalContext, NativeType},
    opaque::OpaqueRef,
    resource::ResourceTracker,
    sequence::TypedList,
    tracer::MarshalTracer,
    value::Value,
};

/// A native record mirroring a managed class instance.
pub trait Composite: Sized {
    /// Managed class whose instances this record is built from.
    const CLASS: &'static str;
    /// Native type name.
    const NATIVE_NAME: &'static str;
    /// Attribute names, in the order [`from_fields`](Self::from_fields) reads them.
    const FIELDS: &'static [&'static str];

    /// Builds the record. Each [`FieldReader::read`] call yields the next declared field.
    fn from_fields<T: ResourceTracker, Tr: MarshalTracer>(
        parent: OpaqueRef,
        fields: &mut FieldReader<'_, '_, T, Tr>,
    ) -> MarshalResult<Self>;

    /// Claim on the managed object this record was built from.
    fn parent(&self) -> &OpaqueRef;
}

/// Reads the declared fields of a composite, one after the other.
#[derive(Debug)]
pub struct FieldReader<'c, 'a, T: ResourceTracker, Tr: MarshalTracer> {
    cx: &'c mut MarshalContext<'a, T, Tr>,
    obj: &'c Value,
    fields: &'static [&'static str],
    next: usize,
}

impl<T: ResourceTracker, Tr: MarshalTracer> FieldReader<'_, '_, T, Tr> {
    /// Entry-marshals the next declared field as `F`.
    ///
    /// # Panics
    /// Panics if called more often than there are declared fields.
    pub fn read<F: FromManaged>(&mut self) -> MarshalResult<F> {
        let name = self.fields[self.next];
        self.next += 1;
        let attr = self.cx.getattr(self.obj, name)?;
        let result = self.cx.unbox::<F>(&attr);
        self.cx.release(attr);
        result
    }
}

/// Entry-marshals a managed instance of `C::CLASS` into `C`.
pub(crate) fn unbox_composite<C: Composite, T: ResourceTracker, Tr: MarshalTracer>(
    value: &Value,
    cx: &mut MarshalContext<'_, T, Tr>,
) -> MarshalResult<C> {
    let matches_class = matches!(
        value.heap_data(cx.heap),
        Some(HeapData::Instance(inst)) if inst.class_name() == C::CLASS
    );
    if !matches_class {
        return Err(MarshalError::type_mismatch("unbox", C::CLASS, &cx.type_name(value)));
    }

    let parent = OpaqueRef::acquire(value, cx)?;
    let mut reader = FieldReader {
        cx: &mut *cx,
        obj: value,
        fields: C::FIELDS,
        next: 0,
    };
    let record = C::from_fields(parent, &mut reader);
    if let Err(err) = &record {
        cx.rollback(&Cow::Borrowed(C::NATIVE_NAME), err);
    }
    record
}

/// Exit-marshals a composite back to its parent object.
pub(crate) fn box_composite<C: Composite, T: ResourceTracker, Tr: MarshalTracer>(
    record: C,
    cx: &mut MarshalContext<'_, T, Tr>,
) -> MarshalResult<Value> {
    let parent = record.parent().clone();
    let obj = parent.into_managed(cx)?;
    drop(record);
    cx.collect_releases();
    Ok(obj)
}

/// Implements the marshaling traits and identity semantics for a [`Composite`].
macro_rules! impl_composite_marshal {
    ($ty:ty) => {
        impl NativeType for $ty {
            fn native_type() -> Cow<'static, str> {
                Cow::Borrowed(<$ty as Composite>::NATIVE_NAME)
            }
        }

        impl FromManaged for $ty {
            fn from_managed<T: ResourceTracker, Tr: MarshalTracer>(
                value: &Value,
                cx: &mut MarshalContext<'_, T, Tr>,
            ) -> MarshalResult<Self> {
                unbox_composite(value, cx)
            }
        }

        impl IntoManaged for $ty {
            fn into_managed<T: ResourceTracker, Tr: MarshalTracer>(
                self,
                cx: &mut MarshalContext<'_, T, Tr>,
            ) -> MarshalResult<Value> {
                box_composite(self, cx)
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.parent().identical(other.parent())
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                Hash::hash(self.parent(), state);
            }
        }

        impl IdentityEq for $ty {
            fn identity_eq(&self, other: &Self) -> bool {
                self == other
            }
        }

        impl IdentityHash for $ty {
            fn identity_hash(&self) -> i64 {
                self.parent().identity_hash()
            }
        }
    };
}

/// The reference composite: an int, a handle, and a list of handles, plus its parent.
#[derive(Debug, Clone)]
pub struct PassThruComplex {
    parent: OpaqueRef,
    int_attr: i64,
    passthru_attr: OpaqueRef,
    list_attr: TypedList<OpaqueRef>,
}

impl PassThruComplex {
    #[must_use]
    pub fn int_attr(&self) -> i64 {
        self.int_attr
    }

    #[must_use]
    pub fn passthru_attr(&self) -> &OpaqueRef {
        &self.passthru_attr
    }

    #[must_use]
    pub fn list_attr(&self) -> &TypedList<OpaqueRef> {
        &self.list_attr
    }
}

impl Composite for PassThruComplex {
    const CLASS: &'static str = "PassThruComplex";
    const NATIVE_NAME: &'static str = "PassThruComplexType";
    const FIELDS: &'static [&'static str] = &["int_attr", "passthru_attr", "list_attr"];

    fn from_fields<T: ResourceTracker, Tr: MarshalTracer>(
        parent: OpaqueRef,
        fields: &mut FieldReader<'_, '_, T, Tr>,
    ) -> MarshalResult<Self> {
        Ok(Self {
            parent,
            int_attr: fields.read()?,
            passthru_attr: fields.read()?,
            list_attr: fields.read()?,
        })
    }

    fn parent(&self) -> &OpaqueRef {
        &self.parent
    }
}

impl_composite_marshal!(PassThruComplex);
