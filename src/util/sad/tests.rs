#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use quickcheck_macros::quickcheck;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro128StarStar;

use super::*;

const SIZES: [BlockSize; 7] = [
    BlockSize::B16x16,
    BlockSize::B16x8,
    BlockSize::B8x16,
    BlockSize::B8x8,
    BlockSize::B8x4,
    BlockSize::B4x8,
    BlockSize::B4x4,
];

fn naive_sad(size: BlockSize, src: &[u8], sp: usize, ref_: &[u8], rp: usize) -> u32 {
    let mut sum = 0u32;
    for y in 0..size.height() {
        for x in 0..size.width() {
            let a = i32::from(src[y * sp + x]);
            let b = i32::from(ref_[y * rp + x]);
            sum += a.abs_diff(b);
        }
    }
    sum
}

#[test]
fn identical_blocks_have_zero_sad() {
    let data = vec![173u8; 24 * 16];
    let pitch = NonZeroUsize::new(24).unwrap();
    for size in SIZES {
        assert_eq!(get_sad(size, &data, pitch, &data, pitch), 0);
    }
}

#[test]
fn matches_naive_reference_on_random_data() {
    let mut rng = Xoshiro128StarStar::from_seed(*b"deadbeeflolcakes");
    let sp = 32;
    let rp = 24;
    let mut src = vec![0u8; sp * 16];
    let mut ref_ = vec![0u8; rp * 16];
    for _ in 0..20 {
        for p in src.iter_mut() {
            *p = rng.random();
        }
        for p in ref_.iter_mut() {
            *p = rng.random();
        }
        for size in SIZES {
            assert_eq!(
                get_sad(
                    size,
                    &src,
                    NonZeroUsize::new(sp).unwrap(),
                    &ref_,
                    NonZeroUsize::new(rp).unwrap()
                ),
                naive_sad(size, &src, sp, &ref_, rp),
                "size {size:?}"
            );
        }
    }
}

#[test]
fn dispatch_agrees_with_scalar() {
    let mut rng = Xoshiro128StarStar::from_seed(*b"0123456789abcdef");
    let pitch = NonZeroUsize::new(16).unwrap();
    let mut src = vec![0u8; 16 * 16];
    let mut ref_ = vec![0u8; 16 * 16];
    for _ in 0..50 {
        for p in src.iter_mut() {
            *p = rng.random();
        }
        for p in ref_.iter_mut() {
            *p = rng.random();
        }
        for size in SIZES {
            assert_eq!(
                get_sad(size, &src, pitch, &ref_, pitch),
                get_sad_rust(size, &src, pitch, &ref_, pitch),
            );
        }
    }
}

#[quickcheck]
fn sad_is_symmetric(seed: u64) -> bool {
    let mut rng = Xoshiro128StarStar::seed_from_u64(seed);
    let pitch = NonZeroUsize::new(16).unwrap();
    let src: Vec<u8> = (0..16 * 16).map(|_| rng.random()).collect();
    let ref_: Vec<u8> = (0..16 * 16).map(|_| rng.random()).collect();
    get_sad(BlockSize::B16x16, &src, pitch, &ref_, pitch)
        == get_sad(BlockSize::B16x16, &ref_, pitch, &src, pitch)
}
