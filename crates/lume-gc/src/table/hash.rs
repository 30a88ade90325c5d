//! Main-position hashing and rehash sizing.

use crate::value::Value;

/// Largest power of two an array part or hash part may use.
pub const MAXBITS: usize = 26;
/// Largest array part.
pub const MAXASIZE: usize = 1 << MAXBITS;

/// `ceil(log2(x))` for `x >= 1`.
#[must_use]
pub const fn ceil_log2(x: usize) -> usize {
    debug_assert!(x >= 1);
    (usize::BITS - (x - 1).leading_zeros()) as usize
}

/// The key as an array index, if it is an integral number that fits in an
/// `i32`. The result may still be out of the array's range.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn array_index(key: &Value) -> Option<i32> {
    match *key {
        Value::Number(n) => {
            let k = n as i32;
            (f64::from(k) == n).then_some(k)
        }
        _ => None,
    }
}

// Power-of-two sizes take the low bits; odd moduli spread pointer-like keys
// whose low bits are poorly distributed.
#[allow(clippy::cast_possible_truncation)]
const fn hash_pow2(h: u32, size: usize) -> usize {
    (h as usize) & (size - 1)
}

#[allow(clippy::cast_possible_truncation)]
const fn hash_mod(h: u32, size: usize) -> usize {
    (h % ((size as u32 - 1) | 1)) as usize
}

#[allow(clippy::cast_possible_truncation)]
fn hash_number(n: f64, size: usize) -> usize {
    // Both zeros land on node 0, so 0.0 and -0.0 find each other.
    if n == 0.0 {
        return 0;
    }
    let bits = n.to_bits();
    let folded = (bits as u32).wrapping_add((bits >> 32) as u32);
    hash_mod(folded, size)
}

/// Index of `key`'s main position in a hash part of `size` nodes.
///
/// `size` is a power of two; an empty hash part counts as one node.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn main_position(key: &Value, size: usize) -> usize {
    debug_assert!(size.is_power_of_two());
    match *key {
        Value::Number(n) => hash_number(n, size),
        Value::String(s) => hash_pow2(s.hash(), size),
        Value::Boolean(b) => hash_pow2(u32::from(b), size),
        Value::LightUserdata(p) => hash_mod(p as u32, size),
        Value::Table(r) | Value::Function(r) | Value::Userdata(r) | Value::Thread(r) => {
            hash_mod(r.index(), size)
        }
        Value::Nil => 0,
    }
}

/// Record `key` in the histogram if it is an array candidate.
/// Returns 1 if counted.
pub fn count_int(key: &Value, nums: &mut [usize; MAXBITS + 1]) -> usize {
    match array_index(key) {
        #[allow(clippy::cast_sign_loss)]
        Some(k) if k > 0 && (k as usize) <= MAXASIZE => {
            nums[ceil_log2(k as usize)] += 1;
            1
        }
        _ => 0,
    }
}

/// Pick the array size: the largest power of two `n` such that more than
/// `n / 2` of the slots `1..=n` would be used.
///
/// `nums[i]` holds the number of integer keys in `(2^(i-1), 2^i]` and
/// `narray` the total count of integer keys. Returns `(n, keys in 1..=n)`.
#[must_use]
pub fn compute_sizes(nums: &[usize; MAXBITS + 1], narray: usize) -> (usize, usize) {
    let mut a = 0;
    let mut na = 0;
    let mut n = 0;
    let mut twotoi = 1usize;
    let mut i = 0;
    while i <= MAXBITS && twotoi / 2 < narray {
        if nums[i] > 0 {
            a += nums[i];
            if a > twotoi / 2 {
                n = twotoi;
                na = a;
            }
        }
        i += 1;
        twotoi *= 2;
    }
    debug_assert!(n == 0 || n / 2 < na);
    (n, na)
}
