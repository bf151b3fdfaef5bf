#![doc = include_str!("../../../README.md")]
// first to include defer_drop macro
mod heap;

mod composite;
mod container;
mod exception;
pub mod identity;
mod marshal;
mod nrt;
mod opaque;
mod py_hash;
mod resource;
mod run;
mod sequence;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    composite::{Composite, FieldReader, PassThruComplex},
    container::PassThruContainer,
    exception::{ExcType, MarshalError, MarshalResult},
    heap::{HeapDiff, HeapId, HeapStats},
    identity::{IdentityEq, IdentityHash},
    marshal::{FromArgs, FromManaged, IntoManaged, MarshalContext, NativeType},
    nrt::ClaimStats,
    opaque::{AnyObject, OpaqueRef, PassThruKind, RawObject},
    py_hash::{HASH_ERROR_SENTINEL, HASH_SENTINEL_SUBSTITUTE, hash_int, hash_pointer},
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    run::Runtime,
    sequence::TypedList,
    tracer::{MarshalTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    types::Type,
    value::Value,
};
