//! Shared harness for the integration tests.

use passthru::{MarshalTracer, ResourceTracker, Runtime, Value};
use pretty_assertions::assert_eq;

/// Runs `f` and asserts it leaves the reference count of every `tracked` value
/// and the number of outstanding native claims exactly as they were.
pub fn check_allocations<T: ResourceTracker, Tr: MarshalTracer, R>(
    rt: &mut Runtime<T, Tr>,
    tracked: &[&Value],
    f: impl FnOnce(&mut Runtime<T, Tr>) -> R,
) -> R {
    let refcounts_before: Vec<Option<usize>> = tracked.iter().map(|v| rt.refcount(v)).collect();
    let claims_before = rt.claim_stats().live();

    let out = f(rt);

    let refcounts_after: Vec<Option<usize>> = tracked.iter().map(|v| rt.refcount(v)).collect();
    assert_eq!(refcounts_after, refcounts_before, "reference counts changed");
    assert_eq!(rt.claim_stats().live(), claims_before, "native claims leaked");
    out
}
