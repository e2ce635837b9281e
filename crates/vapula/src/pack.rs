//! Nibble packing for 4-bit codes.
//!
//! Two 4-bit codes per byte: the even element index occupies the low
//! nibble, the odd index the high nibble. For an odd element count the
//! final high nibble is left zero and never read back.

/// Packed byte length for `n` elements of `bits`-wide codes.
pub fn packed_len(n: usize, bits: usize) -> usize {
    debug_assert!(bits == 4 || bits == 8);
    match bits {
        8 => n,
        _ => n.div_ceil(2),
    }
}

/// Read the 4-bit code at element index `idx`.
#[inline]
pub fn nibble_at(packed: &[u8], idx: usize) -> u8 {
    let byte = packed[idx / 2];
    if idx % 2 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

/// Write the 4-bit code at element index `idx`, preserving its neighbor.
#[inline]
pub fn set_nibble(packed: &mut [u8], idx: usize, code: u8) {
    let byte = &mut packed[idx / 2];
    if idx % 2 == 0 {
        *byte = (*byte & 0xF0) | (code & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | (code << 4);
    }
}

/// Pack a slice of 4-bit codes (one per byte) into nibble-packed bytes.
pub fn pack_nibbles(codes: &[u8]) -> Vec<u8> {
    let mut packed = vec![0u8; packed_len(codes.len(), 4)];
    for (i, &code) in codes.iter().enumerate() {
        set_nibble(&mut packed, i, code);
    }
    packed
}

/// Unpack `n` nibble-packed codes into one byte each.
pub fn unpack_nibbles(packed: &[u8], n: usize) -> Vec<u8> {
    (0..n).map(|i| nibble_at(packed, i)).collect()
}
