//! Native runtime: bookkeeping for claims held by native code.
//!
//! Every opaque reference that enters native code is backed by one [`MemInfo`]:
//! a small allocation owning exactly one managed reference to the referent plus
//! its raw address. Native copies share the `MemInfo` through an `Rc`, so copying
//! and discarding handles never touches the managed heap. When the last copy is
//! discarded the `MemInfo` is freed and its managed reference is queued; the call
//! boundary hands the queue back to the heap before control returns to managed code.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::value::Value;

/// Counters for claim bookkeeping allocations.
///
/// A native call that keeps nothing alive leaves `alloc - free` unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClaimStats {
    /// Number of `MemInfo` allocations made so far.
    pub alloc: usize,
    /// Number of `MemInfo` allocations freed so far.
    pub free: usize,
}

impl ClaimStats {
    /// Claims currently outstanding.
    #[must_use]
    pub fn live(&self) -> usize {
        self.alloc.saturating_sub(self.free)
    }
}

/// A managed reference waiting to be handed back to the heap.
#[derive(Debug)]
pub(crate) struct PendingRelease {
    pub value: Value,
    pub ptr: usize,
}

#[derive(Debug, Default)]
struct NrtState {
    alloc: Cell<usize>,
    free: Cell<usize>,
    pending: RefCell<Vec<PendingRelease>>,
}

/// Shared handle to the native runtime state.
#[derive(Debug, Clone, Default)]
pub(crate) struct NativeRuntime(Rc<NrtState>);

impl NativeRuntime {
    pub fn stats(&self) -> ClaimStats {
        ClaimStats {
            alloc: self.0.alloc.get(),
            free: self.0.free.get(),
        }
    }

    pub fn live_claims(&self) -> usize {
        self.stats().live()
    }

    /// Allocates bookkeeping for one claim.
    ///
    /// `value` must already own the managed reference this claim stands for.
    pub fn new_meminfo(&self, value: Value, ptr: usize) -> Rc<MemInfo> {
        self.0.alloc.set(self.0.alloc.get() + 1);
        Rc::new(MemInfo {
            value: Some(value),
            ptr,
            state: Rc::clone(&self.0),
        })
    }

    /// Takes every queued release. The caller must release each value through the heap.
    pub fn take_pending(&self) -> Vec<PendingRelease> {
        std::mem::take(&mut *self.0.pending.borrow_mut())
    }

    pub fn has_pending(&self) -> bool {
        !self.0.pending.borrow().is_empty()
    }

    /// Whether `meminfo` was allocated by this runtime.
    pub fn owns(&self, meminfo: &MemInfo) -> bool {
        Rc::ptr_eq(&meminfo.state, &self.0)
    }
}

/// Claim bookkeeping for one opaque reference.
#[derive(Debug)]
pub(crate) struct MemInfo {
    /// Owned managed reference; only `None` while being dropped.
    value: Option<Value>,
    ptr: usize,
    state: Rc<NrtState>,
}

impl MemInfo {
    /// Raw address of the referent.
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// The managed value this claim keeps alive.
    pub fn value(&self) -> &Value {
        self.value.as_ref().expect("MemInfo::value: claim already released")
    }
}

impl Drop for MemInfo {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.state.pending.borrow_mut().push(PendingRelease { value, ptr: self.ptr });
        }
        self.state.free.set(self.state.free.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The last copy of a claim queues its release; earlier copies do not.
    #[test]
    fn last_drop_queues_release() {
        let nrt = NativeRuntime::default();
        let meminfo = nrt.new_meminfo(Value::Int(3), 0x1000_0020);
        let copy = Rc::clone(&meminfo);
        assert_eq!(nrt.stats(), ClaimStats { alloc: 1, free: 0 });

        drop(meminfo);
        assert!(!nrt.has_pending());

        drop(copy);
        assert_eq!(nrt.stats().live(), 0);
        let pending = nrt.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ptr, 0x1000_0020);
        assert!(!nrt.has_pending());
    }

    /// A claim belongs only to the runtime that allocated it.
    #[test]
    fn claims_belong_to_their_runtime() {
        let nrt = NativeRuntime::default();
        let other = NativeRuntime::default();
        let meminfo = nrt.new_meminfo(Value::None, 0x1000_0010);

        assert!(nrt.owns(&meminfo));
        assert!(nrt.clone().owns(&meminfo), "clones share the runtime state");
        assert!(!other.owns(&meminfo));

        drop(meminfo);
        assert!(!other.has_pending());
        assert_eq!(nrt.take_pending().len(), 1);
    }
}
