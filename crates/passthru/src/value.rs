use crate::{
    exception::{MarshalError, MarshalResult},
    heap::{Heap, HeapData, HeapId},
    py_hash::{hash_int, hash_pointer},
    resource::ResourceTracker,
    types::Type,
};

/// Base of the managed address space handed out as identities.
///
/// Identities are pointer-like: 16-byte aligned and offset from this base, so the
/// pointer hash (which rotates away the low four bits) sees realistic input.
const PUBLIC_ID_BASE: usize = 0x1000_0000;

/// Tag for identities derived from a heap slot.
pub(crate) const HEAP_ID_TAG: usize = 0;
/// Tag for the `None`/`True`/`False` singletons.
const SINGLETON_ID_TAG: usize = 1;
/// Tag for value-derived integer identities.
const INT_ID_TAG: usize = 2;

/// Builds an address-like identity from a payload and a two-bit kind tag.
#[inline]
pub(crate) fn address_from_payload(payload: usize, tag: usize) -> usize {
    let tagged = (payload << 2) | (tag & 0b11);
    PUBLIC_ID_BASE.wrapping_add(tagged << 4)
}

/// A managed value.
///
/// Small immediates (None, Bool, Int) are stored inline; everything else lives in
/// the heap arena and is referenced via `Ref(HeapId)`. A `Ref` owns exactly one
/// reference count on its heap entry.
///
/// NOTE: `Clone` is intentionally NOT derived. Use [`Runtime::clone_value`](crate::Runtime::clone_value)
/// (or `clone_with_heap` inside the crate) so the reference count is claimed, and release
/// values with [`Runtime::drop_value`](crate::Runtime::drop_value).
#[derive(Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Ref(HeapId),
    /// Sentinel value indicating this Value was properly released via `drop_with_heap`.
    /// Only exists when `ref-count-panic` feature is enabled.
    #[cfg(feature = "ref-count-panic")]
    Dereferenced,
}

/// Drop implementation that panics if a `Ref` variant is dropped without calling `drop_with_heap`.
#[cfg(feature = "ref-count-panic")]
impl Drop for Value {
    fn drop(&mut self) {
        if let Self::Ref(id) = self {
            panic!("Value::Ref({id:?}) dropped without calling drop_with_heap() - this is a reference counting bug");
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl Value {
    /// Returns the heap id if this value is a reference.
    #[must_use]
    pub fn ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn py_type(&self, heap: &Heap<impl ResourceTracker>) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Ref(id) => heap.get(*id).py_type(),
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot access Dereferenced object"),
        }
    }

    /// Type name as seen by managed code; class instances report their class name.
    pub(crate) fn type_name<'h>(&self, heap: &'h Heap<impl ResourceTracker>) -> &'h str {
        match self {
            Self::Ref(id) => heap.get(*id).type_name(),
            other => other.py_type(heap).into(),
        }
    }

    /// Returns the managed-visible identity of this value (the equivalent of `id()`).
    ///
    /// Heap values get their slot-derived address; immediates get a value-derived one,
    /// so two equal ints are the same object, as are two `None`s.
    pub(crate) fn public_id(&self, heap: &Heap<impl ResourceTracker>) -> usize {
        match self {
            Self::Ref(id) => heap.public_id_for_ref(*id),
            Self::None => address_from_payload(0, SINGLETON_ID_TAG),
            Self::Bool(false) => address_from_payload(1, SINGLETON_ID_TAG),
            Self::Bool(true) => address_from_payload(2, SINGLETON_ID_TAG),
            Self::Int(v) => address_from_payload(int_payload(*v), INT_ID_TAG),
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot get id of Dereferenced object"),
        }
    }

    /// Equivalent of the managed `is` operator.
    pub(crate) fn is(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> bool {
        self.public_id(heap) == other.public_id(heap)
    }

    /// Clones a value, claiming a reference for heap values.
    #[must_use]
    pub(crate) fn clone_with_heap(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        match self {
            Self::Ref(id) => {
                heap.inc_ref(*id);
                Self::Ref(*id)
            }
            other => other.clone_immediate(),
        }
    }

    /// Copies an immediate value.
    ///
    /// # Panics
    /// Panics for `Ref`: heap values must go through `clone_with_heap`.
    pub(crate) fn clone_immediate(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(v) => Self::Int(*v),
            Self::Ref(_) => panic!("Ref clones must go through clone_with_heap to maintain refcounts"),
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot clone Dereferenced object"),
        }
    }

    /// Drops a value, releasing its heap reference if applicable.
    #[cfg(not(feature = "ref-count-panic"))]
    #[inline]
    pub(crate) fn drop_with_heap(self, heap: &mut Heap<impl ResourceTracker>) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    /// With `ref-count-panic` enabled, `Ref` variants are replaced with `Dereferenced` and
    /// the original is forgotten to prevent the Drop impl from panicking.
    #[cfg(feature = "ref-count-panic")]
    pub(crate) fn drop_with_heap(mut self, heap: &mut Heap<impl ResourceTracker>) {
        let old = std::mem::replace(&mut self, Self::Dereferenced);
        if let Self::Ref(id) = &old {
            heap.dec_ref(*id);
            std::mem::forget(old);
        }
    }

    /// Returns the heap data behind this value, if it is a live reference.
    pub(crate) fn heap_data<'h>(&self, heap: &'h Heap<impl ResourceTracker>) -> Option<&'h HeapData> {
        self.ref_id().map(|id| heap.get(id))
    }

    /// Integer view of `int` and `bool` values.
    fn as_int_like(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Managed `==`. `operation` names the operator in errors; for `!=` the caller negates.
    ///
    /// Containers compare by the identity of what they wrap. A container compared
    /// with anything that is not a container has no implementation. Ints and bools
    /// compare by value; everything else by identity.
    pub(crate) fn py_eq(
        &self,
        other: &Self,
        operation: &'static str,
        heap: &Heap<impl ResourceTracker>,
    ) -> MarshalResult<bool> {
        match (self.heap_data(heap), other.heap_data(heap)) {
            (Some(HeapData::Container(lhs)), Some(HeapData::Container(rhs))) => {
                return Ok(lhs.wrapped().is(rhs.wrapped(), heap));
            }
            (Some(HeapData::Container(_)), _) | (_, Some(HeapData::Container(_))) => {
                return Err(MarshalError::unsupported_comparison(
                    operation,
                    self.type_name(heap),
                    other.type_name(heap),
                ));
            }
            _ => {}
        }
        if let (Some(lhs), Some(rhs)) = (self.as_int_like(), other.as_int_like()) {
            return Ok(lhs == rhs);
        }
        Ok(self.is(other, heap))
    }

    /// Managed `hash()`.
    ///
    /// A container hashes exactly like the native handle container: the pointer
    /// hash of the wrapped object's identity.
    pub(crate) fn py_hash(&self, heap: &Heap<impl ResourceTracker>) -> MarshalResult<i64> {
        if let Some(v) = self.as_int_like() {
            return Ok(hash_int(v));
        }
        match self.heap_data(heap) {
            Some(HeapData::Container(c)) => Ok(hash_pointer(c.wrapped().public_id(heap))),
            Some(data) if !data.py_type().is_hashable() => Err(MarshalError::unhashable(data.type_name())),
            _ => Ok(hash_pointer(self.public_id(heap))),
        }
    }

    /// Managed attribute read, returning a new reference owned by the caller.
    ///
    /// Class instances expose their attribute map; containers expose `wrapped`.
    pub(crate) fn py_getattr(&self, name: &str, heap: &Heap<impl ResourceTracker>) -> MarshalResult<Self> {
        let found = match self.heap_data(heap) {
            Some(HeapData::Instance(inst)) => inst.get_attr(name),
            Some(HeapData::Container(c)) if name == "wrapped" => Some(c.wrapped()),
            _ => None,
        };
        found
            .map(|v| v.clone_with_heap(heap))
            .ok_or_else(|| MarshalError::attribute(self.type_name(heap), name))
    }
}

/// Mixes an integer into an identity payload.
#[expect(clippy::cast_sign_loss, reason = "bit pattern reinterpretation")]
#[expect(clippy::cast_possible_truncation, reason = "identity payload only needs the low bits")]
fn int_payload(v: i64) -> usize {
    let mixed = (v as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    // keep the payload clear of the tag and alignment bits once shifted
    (mixed >> 8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    /// Identities are 16-byte aligned like real object addresses.
    #[test]
    fn identities_are_aligned() {
        let heap = Heap::new(0, NoLimitTracker);
        for value in [Value::None, Value::Bool(true), Value::Int(7), Value::Int(-1)] {
            assert_eq!(value.public_id(&heap) % 16, 0, "{value:?} identity not aligned");
        }
    }

    /// Immediates with the same value share identity; different values do not.
    #[test]
    fn immediate_identity_is_value_based() {
        let heap = Heap::new(0, NoLimitTracker);
        assert!(Value::Int(5).is(&Value::Int(5), &heap));
        assert!(!Value::Int(5).is(&Value::Int(6), &heap));
        assert!(!Value::None.is(&Value::Bool(false), &heap));
    }

    /// A reused slot hands out a fresh identity.
    #[test]
    fn reused_slot_gets_fresh_identity() {
        let mut heap = Heap::new(4, NoLimitTracker);
        let first = heap.allocate(HeapData::Object).unwrap();
        let first_id = heap.public_id_for_ref(first);
        heap.dec_ref(first);
        let second = heap.allocate(HeapData::Object).unwrap();
        assert_eq!(first.index(), second.index(), "slot should be reused");
        assert_ne!(first_id, heap.public_id_for_ref(second));
        heap.dec_ref(second);
    }
}
