//! Tests for `PassThruContainer`: entry/exit marshaling, identity equality and
//! pointer hashing, on both sides of the boundary.

mod common;

use std::collections::HashSet;

use common::check_allocations;
use passthru::{ExcType, IdentityHash, PassThruContainer, Runtime, TypedList, Value, hash_pointer, identity};
use pretty_assertions::assert_eq;

/// Allocates `object()` and a container wrapping it; returns `(obj, container)`.
fn wrapped_object(rt: &mut Runtime) -> (Value, Value) {
    let obj = rt.new_object().unwrap();
    let inner = rt.clone_value(&obj);
    let container = rt.wrap(inner).unwrap();
    (obj, container)
}

fn cleanup(rt: &mut Runtime, values: impl IntoIterator<Item = Value>) {
    for value in values {
        rt.drop_value(value);
    }
}

// =============================================================================
// 1. Marshaling
// =============================================================================

/// Passing a container through native code returns the very same container.
#[test]
fn identity_returns_same_container() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);

    check_allocations(&mut rt, &[&obj, &container], |rt| {
        let out = rt.call(&[&container], |(c,): (PassThruContainer,)| c).unwrap();
        assert!(rt.is(&out, &container), "identity must return the original container");
        rt.drop_value(out);
    });

    cleanup(&mut rt, [obj, container]);
}

/// Receiving a container and dropping it leaves every count unchanged.
#[test]
fn forget_releases_container() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);

    check_allocations(&mut rt, &[&obj, &container], |rt| {
        let out = rt.call(&[&container], |(_c,): (PassThruContainer,)| ()).unwrap();
        assert!(matches!(out, Value::None));
    });

    cleanup(&mut rt, [obj, container]);
}

/// The native `wrapped_obj` is the address managed code sees as `id(c.wrapped)`.
#[test]
fn wrapped_obj_is_wrapped_identity() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);
    let expected = i64::try_from(rt.id(&obj)).unwrap();

    let out = rt
        .call(&[&container], |(c,): (PassThruContainer,)| {
            i64::try_from(c.wrapped_obj().as_int()).unwrap()
        })
        .unwrap();
    assert!(matches!(out, Value::Int(ptr) if ptr == expected));

    cleanup(&mut rt, [obj, container]);
}

/// A value other than a container is rejected and nothing is claimed.
#[test]
fn non_container_is_rejected() {
    let mut rt = Runtime::new();
    let obj = rt.new_object().unwrap();

    let err = check_allocations(&mut rt, &[&obj], |rt| {
        rt.call(&[&obj], |(c,): (PassThruContainer,)| c).unwrap_err()
    });
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.message(), "unbox: expected PassThruContainer, got object");

    rt.drop_value(obj);
}

/// Supplying the wrong number of arguments is a `TypeError`.
#[test]
fn argument_count_mismatch() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);

    let err = check_allocations(&mut rt, &[&obj, &container], |rt| {
        rt.call(&[&container, &container], |(c,): (PassThruContainer,)| c)
            .unwrap_err()
    });
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.operation(), "call");

    cleanup(&mut rt, [obj, container]);
}

// =============================================================================
// 2. Equality
// =============================================================================

/// Two containers wrapping the same object are equal natively and in managed code.
#[test]
fn eq_same_wrapped_object() {
    let mut rt = Runtime::new();
    let (obj, a) = wrapped_object(&mut rt);
    let inner = rt.clone_value(&obj);
    let b = rt.wrap(inner).unwrap();

    let out = check_allocations(&mut rt, &[&obj, &a, &b], |rt| {
        rt.call(&[&a, &b], |(a, b): (PassThruContainer, PassThruContainer)| {
            (identity::eq(&a, &b), identity::ne(&a, &b))
        })
        .unwrap()
    });
    let eq = rt.tuple_get(&out, 0).unwrap();
    let ne = rt.tuple_get(&out, 1).unwrap();
    assert!(matches!(eq, Value::Bool(true)));
    assert!(matches!(ne, Value::Bool(false)));
    assert!(rt.eq(&a, &b).unwrap());
    assert!(!rt.ne(&a, &b).unwrap());
    assert!(!rt.is(&a, &b), "distinct containers are still distinct objects");

    cleanup(&mut rt, [out, obj, a, b]);
}

/// Containers wrapping different objects are unequal.
#[test]
fn eq_different_wrapped_objects() {
    let mut rt = Runtime::new();
    let (x, a) = wrapped_object(&mut rt);
    let (y, b) = wrapped_object(&mut rt);

    let out = rt
        .call(&[&a, &b], |(a, b): (PassThruContainer, PassThruContainer)| a == b)
        .unwrap();
    assert!(matches!(out, Value::Bool(false)));
    assert!(!rt.eq(&a, &b).unwrap());
    assert!(rt.ne(&a, &b).unwrap());

    cleanup(&mut rt, [x, a, y, b]);
}

/// Small ints share identity, so containers wrapping equal ints compare equal.
#[test]
fn eq_wrapped_equal_ints() {
    let mut rt = Runtime::new();
    let a = rt.wrap(Value::Int(1)).unwrap();
    let b = rt.wrap(Value::Int(1)).unwrap();
    let c = rt.wrap(Value::Int(2)).unwrap();

    assert!(rt.eq(&a, &b).unwrap());
    assert!(!rt.eq(&a, &c).unwrap());

    cleanup(&mut rt, [a, b, c]);
}

/// Comparing a container with anything that is not a container has no implementation.
#[test]
fn eq_with_non_container_is_not_implemented() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);

    let err = rt.eq(&container, &Value::Int(1)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::NotImplementedError);
    assert_eq!(err.message(), "no implementation of eq(PassThruContainer, int)");

    let err = rt.eq(&Value::Int(1), &container).unwrap_err();
    assert_eq!(err.message(), "no implementation of eq(int, PassThruContainer)");

    let err = rt.ne(&container, &obj).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::NotImplementedError);
    assert_eq!(err.message(), "no implementation of ne(PassThruContainer, object)");

    cleanup(&mut rt, [obj, container]);
}

// =============================================================================
// 3. Hashing
// =============================================================================

/// Native and managed hashes agree and equal the pointer hash of the wrapped object.
#[test]
fn hash_matches_pointer_hash() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);
    let expected = hash_pointer(rt.id(&obj));

    let out = check_allocations(&mut rt, &[&obj, &container], |rt| {
        rt.call(&[&container], |(c,): (PassThruContainer,)| {
            assert_eq!(c.identity_hash(), c.hash());
            identity::hash(&c)
        })
        .unwrap()
    });
    assert!(matches!(out, Value::Int(h) if h == expected));
    assert_eq!(rt.hash(&container).unwrap(), expected);

    cleanup(&mut rt, [obj, container]);
}

/// Hash and equality agree, so native hash sets deduplicate containers by wrapped object.
#[test]
fn containers_deduplicate_in_hash_set() {
    let mut rt = Runtime::new();
    let (x, a) = wrapped_object(&mut rt);
    let inner = rt.clone_value(&x);
    let b = rt.wrap(inner).unwrap();
    let (y, c) = wrapped_object(&mut rt);

    let out = rt
        .call(
            &[&a, &b, &c],
            |(a, b, c): (PassThruContainer, PassThruContainer, PassThruContainer)| {
                let set: HashSet<PassThruContainer> = [a, b, c].into_iter().collect();
                i64::try_from(set.len()).unwrap()
            },
        )
        .unwrap();
    assert!(matches!(out, Value::Int(2)));

    cleanup(&mut rt, [x, a, b, y, c]);
}

/// A container may wrap an unhashable value; its hash is still the wrapped identity.
#[test]
fn hash_of_container_wrapping_list() {
    let mut rt = Runtime::new();
    let list = rt.new_list(vec![Value::Int(1)]).unwrap();
    let inner = rt.clone_value(&list);
    let container = rt.wrap(inner).unwrap();

    assert_eq!(rt.hash(&list).unwrap_err().exc_type(), ExcType::TypeError);
    assert_eq!(rt.hash(&container).unwrap(), hash_pointer(rt.id(&list)));

    cleanup(&mut rt, [list, container]);
}

// =============================================================================
// 4. Managed accessors
// =============================================================================

/// `wrapped` hands back the object the container was built with.
#[test]
fn wrapped_returns_original_object() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);

    let wrapped = rt.wrapped(&container).unwrap();
    assert!(rt.is(&wrapped, &obj));
    assert_eq!(rt.type_name(&container), "PassThruContainer");
    rt.drop_value(wrapped);

    let err = rt.wrapped(&obj).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);

    cleanup(&mut rt, [obj, container]);
}

/// Releasing the last reference to a container releases what it wraps.
#[test]
fn dropping_container_releases_wrapped() {
    let mut rt = Runtime::new();
    let (obj, container) = wrapped_object(&mut rt);
    assert_eq!(rt.refcount(&obj), Some(2));

    rt.drop_value(container);
    assert_eq!(rt.refcount(&obj), Some(1));

    rt.drop_value(obj);
    assert_eq!(rt.heap_stats().live_objects, 0);
}

/// A dict ferried through native code is the same dict: writes through the
/// returned container's `wrapped` are visible through the original reference.
#[test]
fn wrapped_dict_mutation_is_visible() {
    let mut rt = Runtime::new();
    let dict = rt.new_dict([("a", Value::from(1_i64))]).unwrap();
    let inner = rt.clone_value(&dict);
    let container = rt.wrap(inner).unwrap();

    let out = rt.call(&[&container], |(c,): (PassThruContainer,)| c).unwrap();
    let wrapped = rt.wrapped(&out).unwrap();
    assert!(rt.is(&wrapped, &dict));
    rt.dict_set(&wrapped, "a", Value::from(2_i64)).unwrap();
    rt.dict_set(&wrapped, "b", Value::from(true)).unwrap();

    let a = rt.dict_get(&dict, "a").unwrap();
    let b = rt.dict_get(&dict, "b").unwrap();
    assert!(matches!(a, Value::Int(2)));
    assert!(matches!(b, Value::Bool(true)));

    // overwriting a heap value releases it
    let obj = rt.new_object().unwrap();
    let stored = rt.clone_value(&obj);
    rt.dict_set(&dict, "c", stored).unwrap();
    assert_eq!(rt.refcount(&obj), Some(2));
    rt.dict_set(&dict, "c", Value::None).unwrap();
    assert_eq!(rt.refcount(&obj), Some(1));

    let err = rt.dict_set(&container, "d", Value::None).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.message(), "setitem: expected dict, got PassThruContainer");

    cleanup(&mut rt, [a, b, obj, wrapped, out, dict, container]);
}

// =============================================================================
// 5. Lists of containers
// =============================================================================

/// `[wrap(x), wrap(x), wrap(y)]`; returns `[x, y, c0, c1, c2]` and the list.
fn list_of_containers(rt: &mut Runtime) -> (Vec<Value>, Value) {
    let (x, c0) = wrapped_object(rt);
    let inner = rt.clone_value(&x);
    let c1 = rt.wrap(inner).unwrap();
    let (y, c2) = wrapped_object(rt);
    let items = vec![rt.clone_value(&c0), rt.clone_value(&c1), rt.clone_value(&c2)];
    let list = rt.new_list(items).unwrap();
    (vec![x, y, c0, c1, c2], list)
}

/// Returning a list of containers yields the original containers by position.
#[test]
fn list_of_containers_identity() {
    let mut rt = Runtime::new();
    let (owned, list) = list_of_containers(&mut rt);
    let tracked: Vec<&Value> = owned.iter().chain([&list]).collect();

    check_allocations(&mut rt, &tracked, |rt| {
        let out = rt
            .call(&[&list], |(l,): (TypedList<PassThruContainer>,)| l)
            .unwrap();
        assert_eq!(rt.list_len(&out).unwrap(), 3);
        for (i, container) in owned[2..].iter().enumerate() {
            let item = rt.list_get(&out, i).unwrap();
            assert!(rt.is(&item, container), "element {i} is not the original container");
            rt.drop_value(item);
        }
        rt.drop_value(out);
    });

    cleanup(&mut rt, owned.into_iter().chain([list]));
}

/// Receiving a list of containers and dropping it releases one claim per element.
#[test]
fn list_of_containers_forget() {
    let mut rt = Runtime::new();
    let (owned, list) = list_of_containers(&mut rt);
    let tracked: Vec<&Value> = owned.iter().chain([&list]).collect();

    check_allocations(&mut rt, &tracked, |rt| {
        let out = rt
            .call(&[&list], |(l,): (TypedList<PassThruContainer>,)| l.is_empty())
            .unwrap();
        assert!(matches!(out, Value::Bool(false)));
    });
    assert_eq!(rt.claim_stats().alloc, 3);

    cleanup(&mut rt, owned.into_iter().chain([list]));
}

/// List elements compare and hash by what they wrap, matching managed `==` and `hash`.
#[test]
fn list_of_containers_elements_compare_by_wrapped() {
    let mut rt = Runtime::new();
    let (owned, list) = list_of_containers(&mut rt);
    let managed_hash = rt.hash(&owned[2]).unwrap();
    assert_eq!(rt.hash(&owned[3]).unwrap(), managed_hash);
    assert!(rt.eq(&owned[2], &owned[3]).unwrap());

    let out = rt
        .call(&[&list], |(l,): (TypedList<PassThruContainer>,)| {
            (l[0] == l[1], identity::ne(&l[0], &l[2]), l[1].hash())
        })
        .unwrap();
    let flags: Vec<Value> = (0..3).map(|i| rt.tuple_get(&out, i).unwrap()).collect();
    assert!(matches!(&flags[..], [Value::Bool(true), Value::Bool(true), Value::Int(h)] if *h == managed_hash));

    cleanup(&mut rt, flags.into_iter().chain([out, list]).chain(owned));
}
