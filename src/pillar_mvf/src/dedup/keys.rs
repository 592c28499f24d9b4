//! Composite cell keys packed into sortable integers.
//!
//! A key is the tuple `(batch, c0, c1, c2)`. Each field gets 16 bits, most
//! significant field first, so ordering the packed `u64` values is the same
//! as ordering the tuples lexicographically.

use crate::error::{MvfError, Result};

/// `(batch, c0, c1, c2)`; `c2` is zero for two-axis keys.
pub type CellKey = [u32; 4];

/// Bits per key field.
pub const FIELD_BITS: u32 = 16;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;

/// Pack a key into a `u64`, most significant field first.
#[inline]
pub fn pack_key(key: &CellKey) -> Result<u64> {
    let mut packed = 0u64;
    for (field, &value) in key.iter().enumerate() {
        let value = value as u64;
        if value > FIELD_MASK {
            return Err(MvfError::KeyOverflow {
                field,
                value,
                bits: FIELD_BITS,
            });
        }
        packed = (packed << FIELD_BITS) | value;
    }
    Ok(packed)
}

/// Inverse of [`pack_key`].
#[inline]
pub fn unpack_key(packed: u64) -> CellKey {
    [
        ((packed >> (3 * FIELD_BITS)) & FIELD_MASK) as u32,
        ((packed >> (2 * FIELD_BITS)) & FIELD_MASK) as u32,
        ((packed >> FIELD_BITS) & FIELD_MASK) as u32,
        (packed & FIELD_MASK) as u32,
    ]
}
