use std::{cell::Cell, collections::BTreeMap, fmt, mem::ManuallyDrop};

use smallvec::SmallVec;

use crate::{
    resource::{ResourceError, ResourceTracker},
    types::{Container, Dict, Instance, List, Tuple, Type},
    value::{HEAP_ID_TAG, Value, address_from_payload},
};

/// Snapshot of managed heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order,
/// making snapshots suitable for display and comparison without sort overhead.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by `HeapData` variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// Difference between two heap snapshots.
///
/// Computed by [`HeapStats::diff`]. Positive deltas mean growth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    /// Change in live object count (`after - before`).
    pub live_objects_delta: isize,
    /// Change in total slot count.
    pub total_slots_delta: isize,
    /// Per-type deltas. Only includes types present in either snapshot.
    pub objects_by_type_delta: BTreeMap<&'static str, isize>,
}

impl HeapStats {
    /// Computes the difference between `self` ("before") and `other` ("after").
    ///
    /// # Example
    ///
    /// ```
    /// # use std::collections::BTreeMap;
    /// # use passthru::HeapStats;
    /// let before = HeapStats { live_objects: 2, free_slots: 0, total_slots: 2, objects_by_type: BTreeMap::new() };
    /// let after = HeapStats { live_objects: 5, free_slots: 1, total_slots: 6, objects_by_type: BTreeMap::new() };
    /// let diff = before.diff(&after);
    /// assert_eq!(diff.live_objects_delta, 3);
    /// ```
    #[must_use]
    pub fn diff(&self, other: &Self) -> HeapDiff {
        let mut objects_by_type_delta = BTreeMap::new();
        for (&type_name, &count) in &self.objects_by_type {
            let after_count = other.objects_by_type.get(type_name).copied().unwrap_or(0);
            objects_by_type_delta.insert(type_name, isize_delta(count, after_count));
        }
        for (&type_name, &count) in &other.objects_by_type {
            objects_by_type_delta
                .entry(type_name)
                .or_insert_with(|| isize_delta(0, count));
        }

        HeapDiff {
            live_objects_delta: isize_delta(self.live_objects, other.live_objects),
            total_slots_delta: isize_delta(self.total_slots, other.total_slots),
            objects_by_type_delta,
        }
    }
}

impl HeapDiff {
    /// Returns `true` when no live object count changed, overall or per type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_objects_delta == 0 && self.objects_by_type_delta.values().all(|&v| v == 0)
    }
}

impl fmt::Display for HeapDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "HeapDiff: no changes");
        }
        write!(
            f,
            "HeapDiff: {:+} live objects, {:+} slots",
            self.live_objects_delta, self.total_slots_delta
        )?;
        for (&type_name, &delta) in &self.objects_by_type_delta {
            if delta != 0 {
                write!(f, "\n  {type_name}: {delta:+}")?;
            }
        }
        Ok(())
    }
}

/// Computes `after - before` as `isize`, handling the `usize -> isize` conversion.
#[expect(clippy::cast_possible_wrap, reason = "slot counts stay far below isize::MAX")]
fn isize_delta(before: usize, after: usize) -> isize {
    (after as isize).wrapping_sub(before as isize)
}

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Every managed value that must live in the arena.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// A bare `object()`: identity only, no state. Native code can never box it.
    Object,
    Dict(Dict),
    List(List),
    Tuple(Tuple),
    Instance(Instance),
    Container(Container),
}

impl HeapData {
    pub fn py_type(&self) -> Type {
        match self {
            Self::Object => Type::Object,
            Self::Dict(_) => Type::Dict,
            Self::List(_) => Type::List,
            Self::Tuple(_) => Type::Tuple,
            Self::Instance(_) => Type::Instance,
            Self::Container(_) => Type::Container,
        }
    }

    /// Type name as seen by managed code; instances report their class.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Instance(inst) => inst.class_name(),
            other => other.py_type().into(),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Dict(_) => "Dict",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Instance(_) => "Instance",
            Self::Container(_) => "Container",
        }
    }

    /// Moves every owned child `Value` into `out` so the heap can release them.
    fn take_children(&mut self, out: &mut Vec<Value>) {
        match self {
            Self::Object => {}
            Self::Dict(d) => d.take_children(out),
            Self::List(l) => l.take_children(out),
            Self::Tuple(t) => t.take_children(out),
            Self::Instance(i) => i.take_children(out),
            Self::Container(c) => c.take_children(out),
        }
    }
}

/// One arena slot: the payload plus its reference count.
///
/// The count is a `Cell` so that claims can be taken through a shared borrow
/// of the heap; only freeing needs `&mut`.
#[derive(Debug)]
struct HeapValue {
    refcount: Cell<usize>,
    data: HeapData,
}

/// Reference-counted arena that backs all managed heap values.
///
/// Uses a free list to reuse slots from freed values. When a value is freed via
/// `dec_ref`, its slot ID is added to the free list and its generation counter
/// is bumped on reuse so identities stay distinct.
///
/// Generic over `T: ResourceTracker` to support different resource tracking strategies.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<Option<HeapValue>>,
    /// Per-slot generation counters for managed-visible identities.
    slot_id_generations: Vec<u32>,
    /// IDs of freed slots available for reuse. Populated by `dec_ref`, consumed by `allocate`.
    free_list: Vec<HeapId>,
    tracker: T,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            slot_id_generations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            tracker,
        }
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Allocates a new heap entry with a reference count of one, owned by the caller.
    ///
    /// If the tracker refuses the allocation, the references `data` owns are released
    /// before the error is returned.
    pub fn allocate(&mut self, mut data: HeapData) -> Result<HeapId, ResourceError> {
        if let Err(err) = self.tracker.on_allocate() {
            let mut children = Vec::new();
            data.take_children(&mut children);
            drop(data);
            children.drop_with_heap(self);
            return Err(err);
        }
        let new_entry = HeapValue {
            refcount: Cell::new(1),
            data,
        };

        let id = if let Some(id) = self.free_list.pop() {
            let index = id.index();
            self.slot_id_generations[index] = self.slot_id_generations[index].wrapping_add(1);
            self.entries[index] = Some(new_entry);
            id
        } else {
            let id = self.entries.len();
            self.slot_id_generations.push(0);
            self.entries.push(Some(new_entry));
            HeapId(id)
        };
        Ok(id)
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self.entry(id, "Heap::inc_ref");
        entry.refcount.set(entry.refcount.get() + 1);
    }

    /// Decrements the reference count and frees the value (plus children) once it hits zero.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn dec_ref(&mut self, id: HeapId) {
        let value = {
            let slot = self.entries.get_mut(id.index()).expect("Heap::dec_ref: slot missing");
            let entry = slot.as_mut().expect("Heap::dec_ref: object already freed");
            let count = entry.refcount.get();
            if count > 1 {
                entry.refcount.set(count - 1);
                return;
            }
            slot.take().expect("Heap::dec_ref: object already freed")
        };

        self.free_list.push(id);
        self.tracker.on_free();

        let mut data = value.data;
        let mut children = Vec::new();
        data.take_children(&mut children);
        drop(data);
        for child in children {
            child.drop_with_heap(self);
        }
    }

    fn entry(&self, id: HeapId, caller: &str) -> &HeapValue {
        self.entries
            .get(id.index())
            .unwrap_or_else(|| panic!("{caller}: slot missing"))
            .as_ref()
            .unwrap_or_else(|| panic!("{caller}: object already freed"))
    }

    /// Returns an immutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entry(id, "Heap::get").data
    }

    /// Returns a mutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self
            .entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
    }

    /// Gets the reference count for a heap value.
    ///
    /// # Panics
    /// Panics if the value ID is invalid or the value has already been freed.
    #[must_use]
    pub fn get_refcount(&self, id: HeapId) -> usize {
        self.entry(id, "Heap::get_refcount").refcount.get()
    }

    /// Returns the managed-visible identity (pointer-like address) for a live heap reference.
    ///
    /// This keeps identities stable for the lifetime of an object while ensuring
    /// fresh identities when freed slots are reused by later allocations.
    #[must_use]
    pub fn public_id_for_ref(&self, id: HeapId) -> usize {
        let generation = self
            .slot_id_generations
            .get(id.index())
            .copied()
            .expect("Heap::public_id_for_ref: slot generation missing");
        let generation = usize::try_from(generation).expect("u32 generation must fit usize");
        #[cfg(target_pointer_width = "64")]
        let payload = (generation << 32) | (id.index() & (u32::MAX as usize));
        #[cfg(not(target_pointer_width = "64"))]
        let payload = id.index().wrapping_mul(0x9E37_79B1_usize) ^ generation.rotate_left(13);
        address_from_payload(payload, HEAP_ID_TAG)
    }

    /// Returns a snapshot of the current heap state.
    pub fn heap_stats(&self) -> HeapStats {
        let mut live_objects: usize = 0;
        let mut free_slots: usize = 0;
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();

        for slot in &self.entries {
            match slot {
                Some(entry) => {
                    live_objects += 1;
                    *objects_by_type.entry(entry.data.variant_name()).or_insert(0) += 1;
                }
                None => free_slots += 1,
            }
        }

        HeapStats {
            live_objects,
            free_slots,
            total_slots: self.entries.len(),
            objects_by_type,
        }
    }

    /// Releases a batch of values, e.g. the pending releases drained from the native runtime.
    pub fn release_all(&mut self, values: impl IntoIterator<Item = Value>) {
        let batch: SmallVec<[Value; 8]> = values.into_iter().collect();
        for value in batch {
            value.drop_with_heap(self);
        }
    }
}

/// Drop implementation for Heap that forgets all contained values before dropping to
/// prevent panics when the `ref-count-panic` feature is enabled.
#[cfg(feature = "ref-count-panic")]
impl<T: ResourceTracker> Drop for Heap<T> {
    fn drop(&mut self) {
        let mut children = Vec::new();
        for entry in self.entries.iter_mut().flatten() {
            entry.data.take_children(&mut children);
        }
        for child in children {
            std::mem::forget(child);
        }
    }
}

/// Trait for types that require heap access for proper cleanup.
///
/// Rust's standard `Drop` trait cannot decrement heap reference counts because it has no
/// access to the `Heap`. This trait provides an explicit drop-with-heap method so that
/// ref-counted values (and containers of them) can properly decrement their counts when
/// they are no longer needed.
///
/// **All types implementing this trait must be cleaned up on every code path.** Prefer
/// [`defer_drop!`] or [`HeapGuard`] to guarantee cleanup automatically.
pub(crate) trait DropWithHeap<T: ResourceTracker> {
    /// Consume `self` and decrement reference counts for any heap-allocated values contained within.
    fn drop_with_heap(self, heap: &mut Heap<T>);
}

impl<T: ResourceTracker> DropWithHeap<T> for Value {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        Self::drop_with_heap(self, heap);
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Option<U> {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        if let Some(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Vec<U> {
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}

/// RAII guard that ensures a [`DropWithHeap`] value is cleaned up on every code path.
///
/// The guard's `Drop` impl calls [`DropWithHeap::drop_with_heap`] automatically, so
/// cleanup happens whether the scope exits normally or via `?`.
pub(crate) struct HeapGuard<'a, T: ResourceTracker, V: DropWithHeap<T>> {
    // manually dropped because it needs to be dropped by move.
    value: ManuallyDrop<V>,
    heap: &'a mut Heap<T>,
}

impl<'a, T: ResourceTracker, V: DropWithHeap<T>> HeapGuard<'a, T, V> {
    #[inline]
    pub fn new(value: V, heap: &'a mut Heap<T>) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            heap,
        }
    }

    /// Borrows the value (immutably) and heap (mutably) out of the guard.
    #[inline]
    pub fn as_parts(&mut self) -> (&V, &mut Heap<T>) {
        (&self.value, self.heap)
    }
}

impl<T: ResourceTracker, V: DropWithHeap<T>> Drop for HeapGuard<'_, T, V> {
    fn drop(&mut self) {
        // SAFETY: [DH] - value is never manually dropped until this point
        unsafe { ManuallyDrop::take(&mut self.value) }.drop_with_heap(self.heap);
    }
}

/// Ensures a [`DropWithHeap`] value is released on every exit path of the current scope.
///
/// Rebinds `$value` as `&V` and `$heap` as `&mut Heap<T>` via [`HeapGuard::as_parts`].
#[macro_export]
macro_rules! defer_drop {
    ($value:ident, $heap:ident) => {
        let mut _guard = $crate::heap::HeapGuard::new($value, $heap);
        #[allow(
            clippy::allow_attributes,
            reason = "the reborrowed parts may not both be used in every case, so allow unused vars to avoid warnings"
        )]
        #[allow(unused_variables)]
        let ($value, $heap) = _guard.as_parts();
    };
}
