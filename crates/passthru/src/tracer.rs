//! Marshaling trace infrastructure.
//!
//! The [`MarshalTracer`] trait defines hook points at the call boundary: entry and
//! exit marshals, claims taken, claims released, and rollbacks after a failed
//! entry marshal. The runtime carries the tracer as a type parameter, so with
//! [`NoopTracer`] every hook compiles away.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable marshaling log to stderr |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |
//!
//! ```
//! use passthru::{RecordingTracer, Runtime, NoLimitTracker, TraceEvent};
//!
//! let mut rt = Runtime::with_tracker(NoLimitTracker, RecordingTracer::new());
//! let obj = rt.new_object().unwrap();
//! let container = rt.wrap(obj).unwrap();
//! let out = rt.call(&[&container], |(c,): (passthru::PassThruContainer,)| c).unwrap();
//! assert!(rt.tracer().events().iter().any(|e| matches!(e, TraceEvent::Acquire { .. })));
//! rt.drop_value(out);
//! rt.drop_value(container);
//! ```

use std::borrow::Cow;

/// Trace event emitted at the marshaling boundary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum TraceEvent {
    /// A managed value is about to be entry-marshaled as the given native type.
    Unbox { native_type: Cow<'static, str> },
    /// A native value was exit-marshaled back into managed form.
    Box { native_type: Cow<'static, str> },
    /// A new claim was taken on the referent at `ptr`.
    Acquire { kind: &'static str, ptr: usize },
    /// A claim on the referent at `ptr` was released to the managed heap.
    Release { ptr: usize },
    /// An entry marshal failed and its partial claims were discarded.
    Rollback { native_type: Cow<'static, str>, error: String },
}

/// Trait for marshaling tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions.
pub trait MarshalTracer: std::fmt::Debug {
    /// Called before a managed value is converted to its native representation.
    #[inline(always)]
    fn on_unbox(&mut self, _native_type: &Cow<'static, str>) {}

    /// Called after a native value was converted back to a managed value.
    #[inline(always)]
    fn on_box(&mut self, _native_type: &Cow<'static, str>) {}

    /// Called when claim bookkeeping for a new opaque reference is allocated.
    #[inline(always)]
    fn on_acquire(&mut self, _kind: &'static str, _ptr: usize) {}

    /// Called when a claim is handed back to the managed heap.
    #[inline(always)]
    fn on_release(&mut self, _ptr: usize) {}

    /// Called when an entry marshal failed part-way and was rolled back.
    #[inline(always)]
    fn on_rollback(&mut self, _native_type: &Cow<'static, str>, _error: &str) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl MarshalTracer for NoopTracer {}

/// Tracer that prints a human-readable marshaling log to stderr.
///
/// ```text
/// unbox   PassThruContainerType
///   +claim PassThruType 0x10000400
/// box     PassThruContainerType
///   -claim 0x10000400
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Number of lines printed so far.
    lines: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of log lines written.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.lines
    }
}

impl MarshalTracer for StderrTracer {
    fn on_unbox(&mut self, native_type: &Cow<'static, str>) {
        self.lines += 1;
        eprintln!("unbox   {native_type}");
    }

    fn on_box(&mut self, native_type: &Cow<'static, str>) {
        self.lines += 1;
        eprintln!("box     {native_type}");
    }

    fn on_acquire(&mut self, kind: &'static str, ptr: usize) {
        self.lines += 1;
        eprintln!("  +claim {kind} {ptr:#x}");
    }

    fn on_release(&mut self, ptr: usize) {
        self.lines += 1;
        eprintln!("  -claim {ptr:#x}");
    }

    fn on_rollback(&mut self, native_type: &Cow<'static, str>, error: &str) {
        self.lines += 1;
        eprintln!("rollback {native_type}: {error}");
    }
}

/// Tracer that records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Removes and returns all recorded events.
    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl MarshalTracer for RecordingTracer {
    fn on_unbox(&mut self, native_type: &Cow<'static, str>) {
        self.events.push(TraceEvent::Unbox {
            native_type: native_type.clone(),
        });
    }

    fn on_box(&mut self, native_type: &Cow<'static, str>) {
        self.events.push(TraceEvent::Box {
            native_type: native_type.clone(),
        });
    }

    fn on_acquire(&mut self, kind: &'static str, ptr: usize) {
        self.events.push(TraceEvent::Acquire { kind, ptr });
    }

    fn on_release(&mut self, ptr: usize) {
        self.events.push(TraceEvent::Release { ptr });
    }

    fn on_rollback(&mut self, native_type: &Cow<'static, str>, error: &str) {
        self.events.push(TraceEvent::Rollback {
            native_type: native_type.clone(),
            error: error.to_owned(),
        });
    }
}
