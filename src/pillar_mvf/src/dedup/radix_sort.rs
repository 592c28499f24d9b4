//! Stable LSD radix sort of packed cell keys.
//!
//! Sorting brings points of the same cell next to each other so cells can be
//! found as contiguous segments. The sort is stable: points of one cell keep
//! their input order.

/// Radix (number of possible values per digit).
/// 8-bit radix = 256 values per digit.
const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;

/// Number of passes for 64-bit keys.
const NUM_PASSES: u32 = 64 / RADIX_BITS;

/// Keys and values after sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadixSortResult {
    /// Sorted keys.
    pub keys: Vec<u64>,
    /// Values reordered alongside the keys.
    pub values: Vec<u32>,
}

/// Sort `(key, value)` pairs by key.
///
/// Passes whose digit is identical for every key are skipped; with packed
/// cell keys the high bytes are often constant.
pub fn radix_sort_by_key(keys: &[u64], values: &[u32]) -> RadixSortResult {
    debug_assert_eq!(keys.len(), values.len());
    let n = keys.len();
    if n == 0 {
        return RadixSortResult {
            keys: Vec::new(),
            values: Vec::new(),
        };
    }

    let mut keys_a = keys.to_vec();
    let mut values_a = values.to_vec();
    let mut keys_b = vec![0u64; n];
    let mut values_b = vec![0u32; n];

    for pass in 0..NUM_PASSES {
        let shift = pass * RADIX_BITS;
        let digit_of = |k: u64| ((k >> shift) & (RADIX as u64 - 1)) as usize;

        // Count histogram
        let mut hist = [0usize; RADIX];
        for &k in &keys_a {
            hist[digit_of(k)] += 1;
        }
        if hist.iter().any(|&h| h == n) {
            continue;
        }

        // Prefix sum
        let mut sum = 0;
        let mut offsets = [0usize; RADIX];
        for (offset, &count) in offsets.iter_mut().zip(hist.iter()) {
            *offset = sum;
            sum += count;
        }

        // Scatter
        for i in 0..n {
            let digit = digit_of(keys_a[i]);
            let dest = offsets[digit];
            offsets[digit] += 1;
            keys_b[dest] = keys_a[i];
            values_b[dest] = values_a[i];
        }

        std::mem::swap(&mut keys_a, &mut keys_b);
        std::mem::swap(&mut values_a, &mut values_b);
    }

    RadixSortResult {
        keys: keys_a,
        values: values_a,
    }
}
