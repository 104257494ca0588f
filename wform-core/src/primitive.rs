//! Functions to construct [`Integer`]s and [`Float`]s from various types.

use rug::{Assign, Float, Integer};
use std::hash::{Hash, Hasher};

/// The number of bits of precision to use for float constants.
pub const PRECISION: u32 = 1 << 9;

/// Creates an [`Integer`] with the given value.
pub fn int<T>(n: T) -> Integer
where
    Integer: From<T>,
{
    Integer::from(n)
}

/// Creates a [`Float`] with the given value.
pub fn float<T>(n: T) -> Float
where
    Float: Assign<T>,
{
    Float::with_val(PRECISION, n)
}

/// Hashes a [`Float`] by value. `0.0` and `-0.0` compare equal, so they must hash the same.
pub(crate) fn hash_float<H: Hasher>(f: &Float, state: &mut H) {
    if f.is_zero() {
        0u8.hash(state);
    } else {
        f.to_string_radix(16, None).hash(state);
    }
}
