//! Identity-based equality and hashing for native types that embed an opaque reference.
//!
//! These are capabilities: a type gets them by implementing the traits, and the
//! generic entry points only accept two operands of the same type. Comparing a
//! handle container with an integer is therefore a compile error rather than a
//! runtime `false`:
//!
//! ```compile_fail
//! use passthru::{PassThruContainer, identity};
//!
//! fn compare(c: &PassThruContainer) -> bool {
//!     identity::eq(c, &1_i64)
//! }
//! ```

/// Equality by pointer identity of the embedded referent.
pub trait IdentityEq {
    fn identity_eq(&self, other: &Self) -> bool;

    fn identity_ne(&self, other: &Self) -> bool {
        !self.identity_eq(other)
    }
}

/// Hashing by pointer identity, with the host's sentinel convention (never `-1`).
pub trait IdentityHash {
    fn identity_hash(&self) -> i64;
}

/// `lhs == rhs` for identity-comparable native values.
#[must_use]
pub fn eq<V: IdentityEq + ?Sized>(lhs: &V, rhs: &V) -> bool {
    lhs.identity_eq(rhs)
}

/// `lhs != rhs` for identity-comparable native values.
#[must_use]
pub fn ne<V: IdentityEq + ?Sized>(lhs: &V, rhs: &V) -> bool {
    lhs.identity_ne(rhs)
}

/// `hash(value)` for identity-hashable native values.
#[must_use]
pub fn hash<V: IdentityHash + ?Sized>(value: &V) -> i64 {
    value.identity_hash()
}
