//! Hash helpers shared by the managed and native sides.
//!
//! Native hash functions follow the host convention that `-1` is reserved as the
//! "hash computation failed" sentinel: a successful hash that lands on `-1` is
//! remapped to `-2`. Managed and native code must agree bit-for-bit, so both go
//! through these functions.

/// Reserved hash value signalling a failed hash computation.
pub const HASH_ERROR_SENTINEL: i64 = -1;

/// Value substituted when a successful hash would collide with the sentinel.
pub const HASH_SENTINEL_SUBSTITUTE: i64 = -2;

/// Hashes a raw object address the way the host hashes plain objects.
///
/// The low four bits of an object address are always zero because of allocation
/// alignment, so they are rotated to the top: `(p >> 4) | (p << (width - 4))`.
/// The result is reinterpreted as the signed native hash width.
#[must_use]
#[expect(clippy::cast_possible_wrap, reason = "hash is the bit pattern reinterpreted as signed")]
pub fn hash_pointer(ptr: usize) -> i64 {
    let rotated = ptr.rotate_right(4);
    let as_int = rotated as isize as i64;
    remap_sentinel(as_int)
}

/// Hashes a managed integer. Small ints hash to themselves, except the sentinel.
#[must_use]
pub fn hash_int(value: i64) -> i64 {
    remap_sentinel(value)
}

#[inline]
fn remap_sentinel(hash: i64) -> i64 {
    if hash == HASH_ERROR_SENTINEL {
        HASH_SENTINEL_SUBSTITUTE
    } else {
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_low_nibble_to_top() {
        let ptr: usize = 0x1234_5670;
        assert_eq!(hash_pointer(ptr), 0x0123_4567);

        let with_low_bits: usize = 0x1;
        let expected = (1usize << (usize::BITS - 4)) as isize as i64;
        assert_eq!(hash_pointer(with_low_bits), expected);
    }

    /// An all-ones address would hash to the sentinel and must be remapped.
    #[test]
    fn sentinel_is_never_produced() {
        assert_eq!(hash_pointer(usize::MAX), HASH_SENTINEL_SUBSTITUTE);
        assert_eq!(hash_int(-1), HASH_SENTINEL_SUBSTITUTE);
        assert_eq!(hash_int(-2), -2);
        assert_eq!(hash_int(42), 42);
    }

    #[test]
    fn hash_is_stable() {
        let ptr = 0x1dea_dbe0_usize;
        assert_eq!(hash_pointer(ptr), hash_pointer(ptr));
    }
}
