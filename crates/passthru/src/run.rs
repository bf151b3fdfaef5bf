//! Public interface: the managed region, the native runtime, and the call boundary between them.

use crate::{
    composite::{Composite, PassThruComplex},
    exception::{ExcType, MarshalError, MarshalResult},
    heap::{DropWithHeap, Heap, HeapData, HeapStats},
    marshal::{FromArgs, IntoManaged, MarshalContext},
    nrt::{ClaimStats, NativeRuntime},
    resource::{NoLimitTracker, ResourceTracker},
    tracer::{MarshalTracer, NoopTracer},
    types::{Container, Dict, Instance, List, Tuple, Type},
    value::Value,
};

/// Initial number of heap slots reserved by a new runtime.
const INITIAL_HEAP_CAPACITY: usize = 16;

/// Owns the managed heap and the native claim bookkeeping, and runs native
/// functions against managed arguments.
///
/// Values handed out by a runtime own one reference each; give them back with
/// [`drop_value`](Self::drop_value).
///
/// # Example
/// ```
/// use passthru::{OpaqueRef, Runtime};
///
/// let mut rt = Runtime::new();
/// let obj = rt.new_object().unwrap();
/// let before = rt.refcount(&obj);
///
/// // forget(x): take a handle and drop it without doing anything
/// let out = rt.call(&[&obj], |(_x,): (OpaqueRef,)| ()).unwrap();
///
/// assert_eq!(rt.refcount(&obj), before);
/// assert_eq!(rt.claim_stats().live(), 0);
/// rt.drop_value(out);
/// rt.drop_value(obj);
/// ```
///
/// # Outstanding claims
/// A handle that escapes a call keeps its referent alive until the handle is
/// dropped and the runtime collects releases. Handles must not outlive their
/// runtime: a claim still held when the runtime is dropped is never paid back,
/// and returning a handle through a different runtime fails with `TypeError`.
/// Check [`claim_stats`](Self::claim_stats) before dropping a runtime that lent
/// handles out.
///
/// ```
/// use passthru::{OpaqueRef, Runtime};
///
/// let mut rt = Runtime::new();
/// let obj = rt.new_object().unwrap();
/// let mut stash = None;
/// let out = rt.call(&[&obj], |(x,): (OpaqueRef,)| stash = Some(x)).unwrap();
/// assert_eq!(rt.claim_stats().live(), 1);
///
/// drop(stash);
/// rt.collect_releases();
/// assert_eq!(rt.claim_stats().live(), 0);
/// assert_eq!(rt.refcount(&obj), Some(1));
/// rt.drop_value(out);
/// rt.drop_value(obj);
/// ```
#[derive(Debug)]
pub struct Runtime<T: ResourceTracker = NoLimitTracker, Tr: MarshalTracer = NoopTracer> {
    heap: Heap<T>,
    nrt: NativeRuntime,
    tracer: Tr,
}

impl Runtime {
    /// Creates a runtime with no resource limits and no tracing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(NoLimitTracker, NoopTracer)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ResourceTracker, Tr: MarshalTracer> Runtime<T, Tr> {
    pub fn with_tracker(tracker: T, tracer: Tr) -> Self {
        Self {
            heap: Heap::new(INITIAL_HEAP_CAPACITY, tracker),
            nrt: NativeRuntime::default(),
            tracer,
        }
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    fn context(&mut self) -> MarshalContext<'_, T, Tr> {
        MarshalContext::new(&mut self.heap, &self.nrt, &mut self.tracer)
    }

    // ========================================================================
    // Call boundary
    // ========================================================================

    /// Calls the native function `f` with managed arguments.
    ///
    /// Arguments are entry-marshaled left to right into `A`, `f` runs, and its
    /// result is exit-marshaled into a new managed value. Every claim native code
    /// discarded is handed back to the heap before this returns, on success and
    /// on failure alike.
    ///
    /// # Errors
    /// `TypeError` when the argument count or an argument's kind does not match,
    /// `AttributeError` when a composite field is missing, and `MemoryError` when
    /// the tracker refuses a claim or allocation.
    pub fn call<A, R>(&mut self, args: &[&Value], f: impl FnOnce(A) -> R) -> MarshalResult<Value>
    where
        A: FromArgs,
        R: IntoManaged,
    {
        let mut cx = self.context();
        let native_args = match A::from_args(args, &mut cx) {
            Ok(native_args) => native_args,
            Err(err) => {
                cx.rollback(&A::native_type(), &err);
                return Err(err);
            }
        };
        let result = cx.box_value(f(native_args));
        cx.collect_releases();
        result
    }

    /// Hands claims released outside a call (by handles that escaped one) back to the heap.
    pub fn collect_releases(&mut self) {
        self.context().collect_releases();
    }

    // ========================================================================
    // Managed objects
    // ========================================================================

    /// Allocates a plain `object()`.
    pub fn new_object(&mut self) -> MarshalResult<Value> {
        self.allocate(HeapData::Object)
    }

    pub fn new_dict<K: Into<String>>(&mut self, pairs: impl IntoIterator<Item = (K, Value)>) -> MarshalResult<Value> {
        let pairs = pairs.into_iter().map(|(k, v)| (k.into(), v));
        self.allocate(HeapData::Dict(Dict::from_pairs(pairs)))
    }

    /// Looks up `key`, returning a new reference.
    pub fn dict_get(&self, dict: &Value, key: &str) -> MarshalResult<Value> {
        match dict.heap_data(&self.heap) {
            Some(HeapData::Dict(d)) => d.get(key).map(|v| v.clone_with_heap(&self.heap)).ok_or_else(|| {
                MarshalError::new(ExcType::KeyError, "getitem", format!("'{key}'"))
            }),
            _ => Err(MarshalError::type_mismatch("getitem", "dict", dict.type_name(&self.heap))),
        }
    }

    /// Stores `value` under `key`; the dict takes over the reference.
    pub fn dict_set(&mut self, dict: &Value, key: impl Into<String>, value: Value) -> MarshalResult<()> {
        let Some(id) = dict.ref_id().filter(|_| matches!(dict.heap_data(&self.heap), Some(HeapData::Dict(_))))
        else {
            let err = MarshalError::type_mismatch("setitem", "dict", dict.type_name(&self.heap));
            value.drop_with_heap(&mut self.heap);
            return Err(err);
        };
        let displaced = match self.heap.get_mut(id) {
            HeapData::Dict(d) => d.set(key.into(), value),
            _ => unreachable!("checked above"),
        };
        displaced.drop_with_heap(&mut self.heap);
        Ok(())
    }

    /// Allocates a list that takes over the references in `items`.
    pub fn new_list(&mut self, items: Vec<Value>) -> MarshalResult<Value> {
        self.allocate(HeapData::List(List::new(items)))
    }

    /// `list[index]`, returning a new reference.
    pub fn list_get(&self, list: &Value, index: usize) -> MarshalResult<Value> {
        match list.heap_data(&self.heap) {
            Some(HeapData::List(l)) => self.item_at(l.as_slice(), index, "list"),
            _ => Err(MarshalError::type_mismatch("getitem", "list", list.type_name(&self.heap))),
        }
    }

    pub fn list_len(&self, list: &Value) -> MarshalResult<usize> {
        match list.heap_data(&self.heap) {
            Some(HeapData::List(l)) => Ok(l.as_slice().len()),
            _ => Err(MarshalError::type_mismatch("len", "list", list.type_name(&self.heap))),
        }
    }

    /// Allocates a tuple that takes over the references in `items`.
    pub fn new_tuple(&mut self, items: Vec<Value>) -> MarshalResult<Value> {
        self.allocate(HeapData::Tuple(Tuple::new(items)))
    }

    /// `tuple[index]`, returning a new reference.
    pub fn tuple_get(&self, tuple: &Value, index: usize) -> MarshalResult<Value> {
        match tuple.heap_data(&self.heap) {
            Some(HeapData::Tuple(t)) => self.item_at(t.as_slice(), index, "tuple"),
            _ => Err(MarshalError::type_mismatch("getitem", "tuple", tuple.type_name(&self.heap))),
        }
    }

    fn item_at(&self, items: &[Value], index: usize, kind: &str) -> MarshalResult<Value> {
        items
            .get(index)
            .map(|v| v.clone_with_heap(&self.heap))
            .ok_or_else(|| MarshalError::new(ExcType::IndexError, "getitem", format!("{kind} index out of range")))
    }

    /// Allocates an instance of `class_name` that takes over the attribute references.
    pub fn new_instance<K: Into<String>>(
        &mut self,
        class_name: &str,
        attrs: impl IntoIterator<Item = (K, Value)>,
    ) -> MarshalResult<Value> {
        let attrs = attrs.into_iter().map(|(k, v)| (k.into(), v));
        self.allocate(HeapData::Instance(Instance::new(class_name.to_owned(), attrs)))
    }

    /// `obj.name`, returning a new reference.
    pub fn getattr(&self, obj: &Value, name: &str) -> MarshalResult<Value> {
        obj.py_getattr(name, &self.heap)
    }

    /// `obj.name = value`; the instance takes over the reference.
    pub fn setattr(&mut self, obj: &Value, name: &str, value: Value) -> MarshalResult<()> {
        let Some(id) = obj
            .ref_id()
            .filter(|_| matches!(obj.heap_data(&self.heap), Some(HeapData::Instance(_))))
        else {
            let err = MarshalError::attribute(obj.type_name(&self.heap), name);
            value.drop_with_heap(&mut self.heap);
            return Err(err);
        };
        let displaced = match self.heap.get_mut(id) {
            HeapData::Instance(inst) => inst.set_attr(name.to_owned(), value),
            _ => unreachable!("checked above"),
        };
        displaced.drop_with_heap(&mut self.heap);
        Ok(())
    }

    /// `PassThruContainer(value)`: wraps `value`, taking over its reference.
    pub fn wrap(&mut self, value: Value) -> MarshalResult<Value> {
        self.allocate(HeapData::Container(Container::new(value)))
    }

    /// `container.wrapped`, returning a new reference.
    pub fn wrapped(&self, container: &Value) -> MarshalResult<Value> {
        match container.heap_data(&self.heap) {
            Some(HeapData::Container(_)) => container.py_getattr("wrapped", &self.heap),
            _ => Err(MarshalError::type_mismatch(
                "wrapped",
                "PassThruContainer",
                container.type_name(&self.heap),
            )),
        }
    }

    /// Constructs a managed `PassThruComplex` instance.
    ///
    /// `list_attr` must be a list. The instance also carries an attribute that no
    /// native type can represent, which native code never reads.
    pub fn new_passthru_complex(
        &mut self,
        int_attr: i64,
        passthru_attr: Value,
        list_attr: Value,
    ) -> MarshalResult<Value> {
        if !matches!(list_attr.heap_data(&self.heap), Some(HeapData::List(_))) {
            let err = MarshalError::type_mismatch("PassThruComplex", "list", list_attr.type_name(&self.heap));
            passthru_attr.drop_with_heap(&mut self.heap);
            list_attr.drop_with_heap(&mut self.heap);
            return Err(err);
        }
        let something_not_boxable = match self.new_object() {
            Ok(obj) => obj,
            Err(err) => {
                passthru_attr.drop_with_heap(&mut self.heap);
                list_attr.drop_with_heap(&mut self.heap);
                return Err(err);
            }
        };
        self.new_instance(
            PassThruComplex::CLASS,
            [
                ("int_attr", Value::Int(int_attr)),
                ("passthru_attr", passthru_attr),
                ("list_attr", list_attr),
                ("something_not_boxable", something_not_boxable),
            ],
        )
    }

    // ========================================================================
    // Managed operators
    // ========================================================================

    /// Managed `a == b`.
    ///
    /// # Errors
    /// `NotImplementedError` when exactly one side is a `PassThruContainer`.
    pub fn eq(&self, a: &Value, b: &Value) -> MarshalResult<bool> {
        a.py_eq(b, "eq", &self.heap)
    }

    /// Managed `a != b`.
    pub fn ne(&self, a: &Value, b: &Value) -> MarshalResult<bool> {
        a.py_eq(b, "ne", &self.heap).map(|eq| !eq)
    }

    /// Managed `hash(value)`.
    ///
    /// # Errors
    /// `TypeError` for unhashable values (dicts and lists).
    pub fn hash(&self, value: &Value) -> MarshalResult<i64> {
        value.py_hash(&self.heap)
    }

    /// Managed `a is b`.
    #[must_use]
    pub fn is(&self, a: &Value, b: &Value) -> bool {
        a.is(b, &self.heap)
    }

    /// Managed `id(value)`: the address native code sees for this object.
    #[must_use]
    pub fn id(&self, value: &Value) -> usize {
        value.public_id(&self.heap)
    }

    /// Builtin type of `value`; all class instances are [`Type::Instance`].
    #[must_use]
    pub fn py_type(&self, value: &Value) -> Type {
        value.py_type(&self.heap)
    }

    /// Type name as managed code reports it; instances report their class name.
    #[must_use]
    pub fn type_name(&self, value: &Value) -> String {
        value.type_name(&self.heap).to_owned()
    }

    // ========================================================================
    // Reference management and statistics
    // ========================================================================

    /// Reference count of a heap object; `None` for immediates.
    #[must_use]
    pub fn refcount(&self, value: &Value) -> Option<usize> {
        value.ref_id().map(|id| self.heap.get_refcount(id))
    }

    /// A new reference to the same value.
    #[must_use]
    pub fn clone_value(&self, value: &Value) -> Value {
        value.clone_with_heap(&self.heap)
    }

    /// Gives a reference back to the heap.
    pub fn drop_value(&mut self, value: Value) {
        value.drop_with_heap(&mut self.heap);
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.heap_stats()
    }

    #[must_use]
    pub fn claim_stats(&self) -> ClaimStats {
        self.nrt.stats()
    }

    fn allocate(&mut self, data: HeapData) -> MarshalResult<Value> {
        Ok(Value::Ref(self.heap.allocate(data)?))
    }
}

impl<T: ResourceTracker, Tr: MarshalTracer> Drop for Runtime<T, Tr> {
    fn drop(&mut self) {
        self.collect_releases();
        debug_assert!(
            self.nrt.live_claims() == 0 || std::thread::panicking(),
            "runtime dropped with {} native claims outstanding",
            self.nrt.live_claims()
        );
    }
}
