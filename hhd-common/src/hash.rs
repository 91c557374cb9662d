//! The two independent hash functions behind the detector's probes.
//!
//! Both read multi-byte words little-endian, which is what the kernel
//! versions do on x86 and on `bpfel`, so host and XDP hashes agree.

// =============================================================================
// JHASH
// =============================================================================

/// Golden-ratio initial value used by the kernel `jhash`.
pub const JHASH_INITVAL: u32 = 0xdead_beef;

#[inline(always)]
fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline(always)]
fn jhash_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline(always)]
fn jhash_final(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Bob Jenkins' lookup3 hash as exposed by the kernel's `jhash()`.
#[inline(always)]
pub fn jhash(key: &[u8], initval: u32) -> u32 {
    let mut a = JHASH_INITVAL
        .wrapping_add(key.len() as u32)
        .wrapping_add(initval);
    let mut b = a;
    let mut c = a;

    let mut k = key;
    while k.len() > 12 {
        a = a.wrapping_add(le32(&k[0..4]));
        b = b.wrapping_add(le32(&k[4..8]));
        c = c.wrapping_add(le32(&k[8..12]));
        jhash_mix(&mut a, &mut b, &mut c);
        k = &k[12..];
    }

    if k.is_empty() {
        return c;
    }

    // The byte-wise tail adds never overlap, so a zero-padded word load is
    // the same sum.
    let mut tail = [0u8; 12];
    tail[..k.len()].copy_from_slice(k);
    a = a.wrapping_add(le32(&tail[0..4]));
    b = b.wrapping_add(le32(&tail[4..8]));
    c = c.wrapping_add(le32(&tail[8..12]));
    jhash_final(&mut a, &mut b, &mut c);

    c
}

// =============================================================================
// FASTHASH
// =============================================================================

const FASTHASH_M: u64 = 0x8803_55f2_1e6d_1965;

#[inline(always)]
fn fasthash_mix(mut h: u64) -> u64 {
    h ^= h >> 23;
    h = h.wrapping_mul(0x2127_599b_f432_5c37);
    h ^= h >> 47;
    h
}

/// Zilong Tan's fasthash64.
#[inline(always)]
pub fn fasthash64(buf: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (buf.len() as u64).wrapping_mul(FASTHASH_M);

    let mut chunks = buf.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        h ^= fasthash_mix(u64::from_le_bytes(word));
        h = h.wrapping_mul(FASTHASH_M);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut word = [0u8; 8];
        word[..rest.len()].copy_from_slice(rest);
        h ^= fasthash_mix(u64::from_le_bytes(word));
        h = h.wrapping_mul(FASTHASH_M);
    }

    fasthash_mix(h)
}

/// fasthash64 folded to 32 bits.
#[inline(always)]
pub fn fasthash32(buf: &[u8], seed: u32) -> u32 {
    let h = fasthash64(buf, u64::from(seed));
    h.wrapping_sub(h >> 32) as u32
}
