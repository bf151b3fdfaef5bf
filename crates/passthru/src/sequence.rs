//! Native sequences of handles.
//!
//! A [`TypedList`] owns its elements: building one from a managed list claims
//! every element, cloning it claims every element again, and dropping it
//! releases each element's claim. Reading an element by index only borrows it.

use std::{borrow::Cow, ops::Index};

use crate::{
    exception::{MarshalError, MarshalResult},
    heap::HeapData,
    marshal::{FromManaged, IntoManaged, MarshalContext, NativeType},
    resource::ResourceTracker,
    tracer::MarshalTracer,
    types::List,
    value::Value,
};

/// A homogeneous native list, `ListType[T]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedList<T> {
    items: Vec<T>,
}

impl<T> TypedList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends `item`; the list takes over the claim `item` holds.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Borrows the element at `index` without taking a claim.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for TypedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for TypedList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> FromIterator<T> for TypedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for TypedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a TypedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: NativeType> NativeType for TypedList<T> {
    fn native_type() -> Cow<'static, str> {
        Cow::Owned(format!("ListType[{}]", T::native_type()))
    }
}

impl<T: FromManaged> FromManaged for TypedList<T> {
    fn from_managed<R: ResourceTracker, Tr: MarshalTracer>(
        value: &Value,
        cx: &mut MarshalContext<'_, R, Tr>,
    ) -> MarshalResult<Self> {
        let Some(HeapData::List(list)) = value.heap_data(cx.heap) else {
            return Err(MarshalError::type_mismatch(
                "unbox",
                "list",
                &cx.type_name(value),
            ));
        };
        // hold our own references to the elements while the heap is borrowed mutably
        let elements: Vec<Value> = list.as_slice().iter().map(|v| v.clone_with_heap(cx.heap)).collect();

        let mut items = Vec::with_capacity(elements.len());
        let mut failure = None;
        for element in &elements {
            match cx.unbox::<T>(element) {
                Ok(item) => items.push(item),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        cx.heap.release_all(elements);
        match failure {
            // dropping the partial list releases the claims already taken
            Some(err) => Err(err),
            None => Ok(Self { items }),
        }
    }
}

impl<T: IntoManaged> IntoManaged for TypedList<T> {
    /// Produces a fresh managed list whose elements are the original objects.
    fn into_managed<R: ResourceTracker, Tr: MarshalTracer>(
        self,
        cx: &mut MarshalContext<'_, R, Tr>,
    ) -> MarshalResult<Value> {
        let values = cx.box_all(self.items)?;
        cx.allocate(HeapData::List(List::new(values)))
    }
}
