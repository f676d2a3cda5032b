#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro128StarStar;

use super::*;

/// Straightforward unpacked 4x4 Hadamard-abs-sum, unshifted.
fn hadamard_abs_sum_4x4(src: &[u8], sp: usize, ref_: &[u8], rp: usize) -> u32 {
    let mut d = [[0i32; 4]; 4];
    for y in 0..4 {
        for x in 0..4 {
            d[y][x] = i32::from(src[y * sp + x]) - i32::from(ref_[y * rp + x]);
        }
    }
    let mut rows = [[0i32; 4]; 4];
    for y in 0..4 {
        let r = d[y];
        let (a0, a1, a2, a3) = (r[0] + r[1], r[0] - r[1], r[2] + r[3], r[2] - r[3]);
        rows[y] = [a0 + a2, a1 + a3, a0 - a2, a1 - a3];
    }
    let mut sum = 0u32;
    for x in 0..4 {
        let c: Vec<i32> = (0..4).map(|y| rows[y][x]).collect();
        let (a0, a1, a2, a3) = (c[0] + c[1], c[0] - c[1], c[2] + c[3], c[2] - c[3]);
        sum += (a0 + a2).unsigned_abs()
            + (a1 + a3).unsigned_abs()
            + (a0 - a2).unsigned_abs()
            + (a1 - a3).unsigned_abs();
    }
    sum
}

#[test]
fn zero_difference_scores_zero() {
    let data = vec![99u8; 16 * 16];
    let pitch = NonZeroUsize::new(16).unwrap();
    for size in [
        BlockSize::B16x16,
        BlockSize::B16x8,
        BlockSize::B8x16,
        BlockSize::B8x8,
        BlockSize::B8x4,
        BlockSize::B4x8,
        BlockSize::B4x4,
    ] {
        assert_eq!(get_satd(size, &data, pitch, &data, pitch), 0);
    }
}

#[test]
fn constant_offset_concentrates_in_dc() {
    // A flat difference of c puts all energy into the DC coefficient:
    // 16c per 4x4 transform, halved by the kernel's final shift.
    let src = vec![60u8; 16 * 4];
    let ref_ = vec![50u8; 16 * 4];
    let pitch = NonZeroUsize::new(16).unwrap();
    assert_eq!(get_satd(BlockSize::B4x4, &src, pitch, &ref_, pitch), 80);
    assert_eq!(get_satd(BlockSize::B8x4, &src, pitch, &ref_, pitch), 160);
}

#[test]
fn packed_kernel_matches_unpacked_reference() {
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let sp = 24;
    let rp = 16;
    let mut src = vec![0u8; sp * 8];
    let mut ref_ = vec![0u8; rp * 8];
    for _ in 0..50 {
        for p in src.iter_mut() {
            *p = rng.random();
        }
        for p in ref_.iter_mut() {
            *p = rng.random();
        }
        // An 8x4 tile folds its two 4x4 transforms before the shift.
        let expected = (hadamard_abs_sum_4x4(&src, sp, &ref_, rp)
            + hadamard_abs_sum_4x4(&src[4..], sp, &ref_[4..], rp))
            >> 1;
        let got = get_satd(
            BlockSize::B8x4,
            &src,
            NonZeroUsize::new(sp).unwrap(),
            &ref_,
            NonZeroUsize::new(rp).unwrap(),
        );
        assert_eq!(got, expected);
    }
}

#[test]
fn wide_sizes_tile_the_kernel() {
    let mut rng = Xoshiro128StarStar::from_seed(*b"0123456789abcdef");
    let pitch = NonZeroUsize::new(16).unwrap();
    let mut src = vec![0u8; 16 * 16];
    let mut ref_ = vec![0u8; 16 * 16];
    for p in src.iter_mut() {
        *p = rng.random();
    }
    for p in ref_.iter_mut() {
        *p = rng.random();
    }

    let mut tiles = 0;
    for y in (0..16).step_by(4) {
        for x in (0..16).step_by(8) {
            tiles += get_satd(
                BlockSize::B8x4,
                &src[y * 16 + x..],
                pitch,
                &ref_[y * 16 + x..],
                pitch,
            );
        }
    }
    assert_eq!(get_satd(BlockSize::B16x16, &src, pitch, &ref_, pitch), tiles);
}

#[test]
fn single_pixel_impulse_spreads_evenly() {
    // SATD of a single differing pixel: the impulse spreads evenly, so
    // all 16 coefficients are |c| and the result is 8|c|.
    let mut src = vec![0u8; 16 * 4];
    let ref_ = vec![0u8; 16 * 4];
    src[0] = 3;
    let pitch = NonZeroUsize::new(16).unwrap();
    assert_eq!(get_satd(BlockSize::B4x4, &src, pitch, &ref_, pitch), 24);
}
